//! The dynamic value model shared by parameter expansion (C), the worker
//! pool (H) and the expected-value check (§4.8 step 5).
//!
//! Test bodies in the source system are untyped Python callables; a Rust
//! test function is statically typed, so arguments, return values and
//! declared expectations are carried through this small closed value type
//! instead.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A dynamic value: an argument, a return value, or the right-hand side of
/// an `expected(...)` equality check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The absence of a value, returned by test bodies with no result.
    Unit,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string, quoted with double quotes in display names (§4.1).
    Str(String),
    /// A heterogeneous list, itself displayed as a parenthesized sequence.
    List(Vec<Value>),
}

impl Value {
    /// The [`ValueType`] tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::List(_) => ValueType::List,
        }
    }
}

impl Display for Value {
    /// Renders the value the way a display name quotes it (§4.1): strings
    /// are double-quoted, everything else uses its natural textual form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The type tag of a [`Value`], used for type-based expected checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// See [`Value::Unit`].
    Unit,
    /// See [`Value::Bool`].
    Bool,
    /// See [`Value::Int`].
    Int,
    /// See [`Value::Float`].
    Float,
    /// See [`Value::Str`].
    Str,
    /// See [`Value::List`].
    List,
}

/// The declared `expected(...)` assertion attached to a test (§4.3, §4.8
/// step 5).
#[derive(Debug, Clone)]
pub enum Expected {
    /// Matches by `==` against the returned value.
    Value(Value),

    /// Matches when the returned value is exactly this type.
    Type(ValueType),

    /// Matches when the test body raised exactly this exception kind.
    ExceptionType(&'static str),

    /// Matches a regex against the string form of the returned value.
    Regex(String),
}

/// The kind of error a test body can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An assertion-kind failure: the test body itself judged its
    /// condition false.
    Assertion,

    /// Any other error, treated as a broken test unless it matches a
    /// declared `expected(...)` exception type.
    Other,
}

/// An error signaled by a test body, either via an assertion failure or any
/// other propagated error.
#[derive(Debug, Clone)]
pub struct TestError {
    /// Whether this is an assertion failure or an unrelated error.
    pub kind: ErrorKind,

    /// The exception-type name used to match against `expected(ExceptionType)`.
    pub exception_type: &'static str,

    /// A human readable message, persisted as `error_message` (§4.2).
    pub message: String,
}

impl TestError {
    /// Constructs an assertion-kind error.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Assertion,
            exception_type: "AssertionError",
            message: message.into(),
        }
    }

    /// Constructs a non-assertion error tagged with the given exception
    /// type name, used by [`Expected::ExceptionType`] matching.
    pub fn other(exception_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Other,
            exception_type,
            message: message.into(),
        }
    }
}

impl Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

/// The outcome of invoking a test body (§4.8 steps 4-5), before it has been
/// classified into a final [`Status`][crate::plan::Status].
pub type TestOutcome = Result<Value, TestError>;

/// A registered test body: given its resolved positional and keyword
/// arguments, runs once and returns its outcome, writing anything it
/// prints to the given sink so it can be captured into the test's output
/// (§4.8 step 3, "redirect the test's stdout/stderr into an in-memory
/// sink").
pub type TestBody = std::sync::Arc<
    dyn Fn(&[Value], &std::collections::BTreeMap<String, Value>, &mut dyn std::io::Write) -> TestOutcome
        + Send
        + Sync,
>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_strings() {
        assert_eq!(Value::Str("abc".into()).to_string(), "\"abc\"");
        assert_eq!(Value::Int(4).to_string(), "4");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Str("a".into())]).to_string(),
            "[1, \"a\"]"
        );
    }

    #[test]
    fn test_value_type_tags() {
        assert_eq!(Value::Float(1.0).value_type(), ValueType::Float);
        assert_eq!(Value::Unit.value_type(), ValueType::Unit);
    }
}
