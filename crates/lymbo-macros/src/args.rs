//! Parses a single `#[lymbo_macros::test(...)]` case's `args(...)` and
//! `expected(...)` clauses (SPEC_FULL.md §2; `spec.md` §6 "Test declaration
//! surface").
//!
//! Grounded on `spectacular-macros`'s hand-rolled `Parse` impls
//! (`SuiteBlock`, `TestSuiteArgs`): a small keyword-driven grammar walked
//! token by token rather than reached for with a parser-combinator crate.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Ident, Lit, LitStr, Token};

/// A single declared value or `expand(v1, v2, ...)` marker (§4.3).
pub enum ArgSpec {
    Literal(ValueLit),
    Expansion(Vec<ValueLit>),
}

impl ArgSpec {
    /// The `lymbo_core::params::Arg` construction expression for this spec.
    pub fn to_arg_tokens(&self) -> TokenStream {
        match self {
            ArgSpec::Literal(v) => {
                let v = v.to_value_tokens();
                quote! { ::lymbo_core::params::Arg::Literal(#v) }
            }
            ArgSpec::Expansion(values) => {
                let values = values.iter().map(ValueLit::to_value_tokens);
                quote! { ::lymbo_core::params::Arg::Expansion(vec![#(#values),*]) }
            }
        }
    }
}

impl Parse for ArgSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(Ident) && input.peek2(syn::token::Paren) {
            let fork = input.fork();
            let ident: Ident = fork.parse()?;
            if ident == "expand" {
                input.parse::<Ident>()?;
                let content;
                syn::parenthesized!(content in input);
                let values = Punctuated::<ValueLit, Token![,]>::parse_terminated(&content)?;
                return Ok(ArgSpec::Expansion(values.into_iter().collect()));
            }
        }
        Ok(ArgSpec::Literal(input.parse()?))
    }
}

/// A literal value usable in `args(...)`/`expected(...)` (§4.1's `Value`
/// shape, minus `List`: declaring a literal list is rare enough in a
/// compile-time test declaration that it isn't worth the grammar).
pub enum ValueLit {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ValueLit {
    pub fn to_value_tokens(&self) -> TokenStream {
        match self {
            ValueLit::Bool(b) => quote! { ::lymbo_core::model::Value::Bool(#b) },
            ValueLit::Int(i) => quote! { ::lymbo_core::model::Value::Int(#i) },
            ValueLit::Float(f) => quote! { ::lymbo_core::model::Value::Float(#f) },
            ValueLit::Str(s) => quote! { ::lymbo_core::model::Value::Str(#s.to_owned()) },
        }
    }
}

impl Parse for ValueLit {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        match input.parse::<Lit>()? {
            Lit::Bool(b) => Ok(ValueLit::Bool(b.value)),
            Lit::Int(i) => Ok(ValueLit::Int(i.base10_parse()?)),
            Lit::Float(f) => Ok(ValueLit::Float(f.base10_parse()?)),
            Lit::Str(s) => Ok(ValueLit::Str(s.value())),
            other => Err(syn::Error::new_spanned(other, "expected a bool, integer, float or string literal")),
        }
    }
}

/// One `args(...)` entry: positional, or `name = ...` keyword.
enum ArgItem {
    Positional(ArgSpec),
    Keyword(Ident, ArgSpec),
}

impl Parse for ArgItem {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(Ident) && input.peek2(Token![=]) {
            let name: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            Ok(ArgItem::Keyword(name, input.parse()?))
        } else {
            Ok(ArgItem::Positional(input.parse()?))
        }
    }
}

/// The declared `expected(...)` assertion (§4.8 step 5).
///
/// `expected(4.5)` is a value-equality check; `expected(type = Float)`,
/// `expected(exception = "ZeroDivisionError")` and `expected(regex = "...")`
/// spell out the other three `Expected` variants explicitly, since Rust has
/// no runtime type object to pun a bare identifier into the way the source
/// system's `expected(float)` does.
pub enum ExpectedSpec {
    Value(ValueLit),
    Type(Ident),
    Exception(LitStr),
    Regex(LitStr),
}

impl ExpectedSpec {
    pub fn to_expected_tokens(&self) -> syn::Result<TokenStream> {
        match self {
            ExpectedSpec::Value(v) => {
                let v = v.to_value_tokens();
                Ok(quote! { ::lymbo_core::model::Expected::Value(#v) })
            }
            ExpectedSpec::Type(ident) => {
                let variant = match ident.to_string().as_str() {
                    "Unit" => quote! { Unit },
                    "Bool" => quote! { Bool },
                    "Int" => quote! { Int },
                    "Float" => quote! { Float },
                    "Str" => quote! { Str },
                    "List" => quote! { List },
                    other => {
                        return Err(syn::Error::new_spanned(
                            ident,
                            format!("unknown value type `{other}` (expected one of Unit, Bool, Int, Float, Str, List)"),
                        ));
                    }
                };
                Ok(quote! { ::lymbo_core::model::Expected::Type(::lymbo_core::model::ValueType::#variant) })
            }
            ExpectedSpec::Exception(name) => {
                Ok(quote! { ::lymbo_core::model::Expected::ExceptionType(#name) })
            }
            ExpectedSpec::Regex(pattern) => {
                Ok(quote! { ::lymbo_core::model::Expected::Regex(#pattern.to_owned()) })
            }
        }
    }
}

impl Parse for ExpectedSpec {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(Ident) && input.peek2(Token![=]) {
            let name: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            match name.to_string().as_str() {
                "type" => Ok(ExpectedSpec::Type(input.parse()?)),
                "exception" => Ok(ExpectedSpec::Exception(input.parse()?)),
                "regex" => Ok(ExpectedSpec::Regex(input.parse()?)),
                other => Err(syn::Error::new(
                    name.span(),
                    format!("unexpected `{other}` (expected `type`, `exception` or `regex`)"),
                )),
            }
        } else {
            Ok(ExpectedSpec::Value(input.parse()?))
        }
    }
}

/// One `#[lymbo_macros::test(...)]` case, parsed from its attribute tokens.
#[derive(Default)]
pub struct TestCase {
    pub positional: Vec<ArgSpec>,
    pub keyword: Vec<(Ident, ArgSpec)>,
    pub expected: Option<ExpectedSpec>,
}

impl Parse for TestCase {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut case = TestCase::default();
        let mut seen_args = false;
        let mut seen_expected = false;

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            let content;
            syn::parenthesized!(content in input);

            match ident.to_string().as_str() {
                "args" => {
                    if seen_args {
                        return Err(syn::Error::new(ident.span(), "duplicate `args(...)`"));
                    }
                    seen_args = true;
                    for item in Punctuated::<ArgItem, Token![,]>::parse_terminated(&content)? {
                        match item {
                            ArgItem::Positional(spec) => case.positional.push(spec),
                            ArgItem::Keyword(name, spec) => case.keyword.push((name, spec)),
                        }
                    }
                }
                "expected" => {
                    if seen_expected {
                        return Err(syn::Error::new(ident.span(), "duplicate `expected(...)`"));
                    }
                    seen_expected = true;
                    case.expected = Some(content.parse()?);
                }
                other => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unexpected `{other}` (expected `args` or `expected`)"),
                    ));
                }
            }

            if input.peek(Token![,]) {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(case)
    }
}
