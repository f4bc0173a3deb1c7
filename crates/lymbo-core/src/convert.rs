//! Conversions between [`Value`](crate::model::Value) and native Rust
//! types, used by `lymbo_macros::test`'s generated argument extraction and
//! return-value wrapping (§4.1, §4.8 step 5).
//!
//! A Python test body passes and returns untyped values; a Rust test
//! function's parameters and return type are concrete, so the macro needs a
//! pair of small conversion traits to bridge the two at the call site.

use std::any::Any;

use crate::model::Value;

/// Converts a declared [`Value`] argument into the concrete type a test
/// function parameter expects.
pub trait FromValue: Sized {
    /// Attempts the conversion, returning a message suitable for a
    /// `TypeError`-tagged [`TestError`](crate::model::TestError) on failure.
    fn from_value(value: &Value) -> Result<Self, String>;
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(format!("expected a bool, got {other}")),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Int(i) => Ok(*i),
            other => Err(format!("expected an int, got {other}")),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            other => Err(format!("expected a float, got {other}")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(format!("expected a string, got {other}")),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

/// Wraps a test function's native return value as a [`Value`], the
/// reciprocal of [`FromValue`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Unit
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

/// Renders a caught panic payload as a message, the way an assertion
/// failure's message is surfaced (§4.8 step 5, "the test body itself judged
/// its condition false").
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test panicked".to_owned()
    }
}
