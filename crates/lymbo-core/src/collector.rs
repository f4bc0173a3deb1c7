//! Test collector (ambient — supplements §6, see SPEC_FULL.md §2).
//!
//! The in-process analogue of the out-of-scope source-file parser: a
//! `TestSource` yields a stream of candidate test entries with decorator
//! metadata, exactly the contract `spec.md` leaves to an external
//! collaborator. `lymbo_macros::test` registers one `CandidateTest` per
//! attribute at compile time via `inventory::submit!`; `StaticTestSource`
//! collects everything `inventory` knows about into that stream.

use std::collections::BTreeMap;

use crate::identity::Location;
use crate::model::{Expected, TestBody, Value};
use crate::params::Arg;
use crate::plan::{Candidate, GroupBy, TestItem, TestPlan};

/// One compile-time-registered test declaration, submitted by
/// `#[lymbo::test]` (SPEC_FULL.md §2).
pub struct CandidateTest {
    /// The source file this test is declared in, as given to the macro
    /// (typically `file!()`).
    pub path: &'static str,

    /// The enclosing type name, if the test is a method.
    pub class: Option<&'static str>,

    /// The function's name.
    pub function: &'static str,

    /// Whether this test's body is declared `async`.
    pub asynchronous: bool,

    /// Positional argument declarations (may contain expansion markers).
    pub positional: fn() -> Vec<Arg>,

    /// Keyword argument declarations (may contain expansion markers).
    pub keyword: fn() -> Vec<(String, Arg)>,

    /// The declared `expected(...)` assertion, if any.
    pub expected: fn() -> Option<Expected>,

    /// The registered function body.
    pub body: fn() -> TestBody,
}

inventory::collect!(CandidateTest);

/// A source of candidate tests — the contract the out-of-scope collector
/// is specified to satisfy (§1 "Out of scope").
pub trait TestSource {
    /// Returns every candidate this source knows about, in a stable order.
    fn candidates(&self) -> Vec<&'static CandidateTest>;
}

/// The reference `TestSource`: every test registered anywhere in the
/// current binary via `#[lymbo::test]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticTestSource;

impl TestSource for StaticTestSource {
    fn candidates(&self) -> Vec<&'static CandidateTest> {
        inventory::iter::<CandidateTest>.into_iter().collect()
    }
}

/// Expands every candidate from `source` into concrete [`TestItem`]s
/// (applying §4.3's Cartesian product), optionally keeping only those
/// whose display name matches `filter`, and assembles the result into a
/// [`TestPlan`] under `group_by` (§4.5).
#[tracing::instrument(level = "debug", skip(source, filter))]
pub fn collect(source: &dyn TestSource, group_by: GroupBy, filter: Option<&crate::filter::Expr>) -> TestPlan {
    let mut entries = Vec::new();

    for candidate in source.candidates() {
        let location = Location::new(candidate.path, candidate.class.map(str::to_owned), candidate.function);

        let positional = (candidate.positional)();
        let keyword = (candidate.keyword)();
        let tuples = crate::params::expand(&positional, &keyword);

        for parameters in tuples {
            let item = TestItem::new(
                location.clone(),
                candidate.asynchronous,
                (candidate.body)(),
                parameters.positional,
                parameters.keyword,
                (candidate.expected)(),
            );

            if let Some(filter) = filter {
                if !filter.matches(&item.display_name()) {
                    continue;
                }
            }

            let candidate_keys = Candidate {
                module_key: location.module_key(),
                class_key: location.class_key(),
                function_key: location.function_key(),
            };
            entries.push((item, candidate_keys));
        }
    }

    TestPlan::build(entries, group_by)
}

/// Declares a compile-time-registered positional argument list with no
/// expansion, a convenience used by the macro's expansion for plain
/// literal `args(...)` calls.
pub fn literal_args(values: Vec<Value>) -> Vec<Arg> {
    values.into_iter().map(Arg::Literal).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Vec<&'static CandidateTest>);

    impl TestSource for FixedSource {
        fn candidates(&self) -> Vec<&'static CandidateTest> {
            self.0.clone()
        }
    }

    fn noop_body() -> TestBody {
        std::sync::Arc::new(|_, _, _| Ok(Value::Unit))
    }

    #[test]
    fn test_collect_expands_parameters() {
        // S1: args(n=expand(1, 4, 9, 116)) -> four items.
        static CANDIDATE: CandidateTest = CandidateTest {
            path: "tests/seed.py",
            class: None,
            function: "by_four",
            asynchronous: false,
            positional: || Vec::new(),
            keyword: || {
                vec![(
                    "n".to_owned(),
                    Arg::Expansion(vec![Value::Int(1), Value::Int(4), Value::Int(9), Value::Int(116)]),
                )]
            },
            expected: || None,
            body: noop_body,
        };

        let source = FixedSource(vec![&CANDIDATE]);
        let plan = collect(&source, GroupBy::None, None);

        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_collect_applies_filter() {
        static A: CandidateTest = CandidateTest {
            path: "tests/seed.py",
            class: None,
            function: "first",
            asynchronous: false,
            positional: Vec::new,
            keyword: Vec::new,
            expected: || None,
            body: noop_body,
        };
        static B: CandidateTest = CandidateTest {
            path: "tests/seed.py",
            class: None,
            function: "second",
            asynchronous: false,
            positional: Vec::new,
            keyword: Vec::new,
            expected: || None,
            body: noop_body,
        };

        let source = FixedSource(vec![&A, &B]);
        let filter = crate::filter::Expr::parse("second").unwrap();
        let plan = collect(&source, GroupBy::None, Some(&filter));

        assert_eq!(plan.len(), 1);
    }
}
