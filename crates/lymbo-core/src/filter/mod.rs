//! Filter evaluator (component D).
//!
//! A Boolean expression language over "is this word a substring of the
//! test's display name?" (§4.4). Grounded on
//! `typst-test-lib/src/test_set/parse.rs`'s pest-based approach, scaled
//! down: the grammar itself encodes `not > and > or` precedence, so no
//! Pratt parser is needed for this simpler language.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::error::FilterError;

/// The pest-generated filter grammar parser.
#[derive(Parser)]
#[grammar = "filter/grammar.pest"]
struct FilterParser;

/// A parsed filter expression (§4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A word token, matched as a substring of the display name.
    Word(String),

    /// Logical negation.
    Not(Box<Expr>),

    /// Logical conjunction.
    And(Box<Expr>, Box<Expr>),

    /// Logical disjunction.
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses a filter expression.
    ///
    /// # Errors
    /// Returns [`FilterError::Syntax`] on malformed input; per §4.4 this is
    /// terminal and collection should abort.
    pub fn parse(input: &str) -> Result<Self, FilterError> {
        let mut pairs = FilterParser::parse(Rule::main, input)
            .map_err(|e| FilterError::Syntax(Box::new(e)))?;

        let main = pairs.next().expect("main always produces one pair");
        let or_expr = main.into_inner().next().expect("main always contains or_expr");

        Ok(parse_or(or_expr))
    }

    /// Evaluates this expression against a test's display name, matching
    /// each word as a plain substring.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Expr::Word(word) => name.contains(word.as_str()),
            Expr::Not(inner) => !inner.matches(name),
            Expr::And(lhs, rhs) => lhs.matches(name) && rhs.matches(name),
            Expr::Or(lhs, rhs) => lhs.matches(name) || rhs.matches(name),
        }
    }

    /// Returns every word token appearing in this expression, the
    /// complementary operation §4.4 names for fast pre-screening.
    pub fn words(&self) -> Vec<&str> {
        let mut words = Vec::new();
        self.collect_words(&mut words);
        words
    }

    fn collect_words<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Word(word) => out.push(word.as_str()),
            Expr::Not(inner) => inner.collect_words(out),
            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.collect_words(out);
                rhs.collect_words(out);
            }
        }
    }
}

fn parse_or(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let mut expr = parse_and(inner.next().expect("or_expr always has one and_expr"));

    while let Some(op) = inner.next() {
        debug_assert_eq!(op.as_rule(), Rule::or_op);
        let rhs = parse_and(inner.next().expect("or_op is always followed by and_expr"));
        expr = Expr::Or(Box::new(expr), Box::new(rhs));
    }

    expr
}

fn parse_and(pair: Pair<Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let mut expr = parse_not(inner.next().expect("and_expr always has one not_expr"));

    while let Some(op) = inner.next() {
        debug_assert_eq!(op.as_rule(), Rule::and_op);
        let rhs = parse_not(inner.next().expect("and_op is always followed by not_expr"));
        expr = Expr::And(Box::new(expr), Box::new(rhs));
    }

    expr
}

fn parse_not(pair: Pair<Rule>) -> Expr {
    let mut negations = 0usize;
    let mut primary = None;

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::not_op => negations += 1,
            Rule::group | Rule::word => primary = Some(part),
            rule => unreachable!("unexpected rule in not_expr: {rule:?}"),
        }
    }

    let mut expr = parse_primary(primary.expect("not_expr always ends in a primary"));
    for _ in 0..negations {
        expr = Expr::Not(Box::new(expr));
    }

    expr
}

fn parse_primary(pair: Pair<Rule>) -> Expr {
    match pair.as_rule() {
        Rule::word => Expr::Word(pair.as_str().to_owned()),
        Rule::group => parse_or(pair.into_inner().next().expect("group always wraps an or_expr")),
        rule => unreachable!("unexpected rule in primary position: {rule:?}"),
    }
}
