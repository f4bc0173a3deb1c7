//! Parameter expansion (component C).
//!
//! Turns one declared call into N concrete parameter tuples via the
//! Cartesian product over every `expand(...)` marker (§4.3). Grounded on
//! `lymbo/cm.py`'s `args(...)` flattening loop, re-expressed as the tagged
//! variant the Design Notes prescribe (`Literal(v) | Expansion(v[])`)
//! instead of a runtime type check.

use std::collections::BTreeMap;

use crate::model::Value;

/// One argument position: either a single value, or an expansion marker
/// whose arms are multiplied out by [`expand`].
#[derive(Debug, Clone)]
pub enum Arg {
    /// A plain, non-expanding value.
    Literal(Value),

    /// An `expand(v1, v2, ...)` marker; the source's alternate `params(...)`
    /// spelling collapses to the same variant (see SPEC_FULL.md §4).
    Expansion(Vec<Value>),
}

impl Arg {
    /// Shorthand for [`Arg::Literal`].
    pub fn lit(value: impl Into<Value>) -> Self {
        Arg::Literal(value.into())
    }

    /// Shorthand for [`Arg::Expansion`].
    pub fn expand(values: impl IntoIterator<Item = Value>) -> Self {
        Arg::Expansion(values.into_iter().collect())
    }
}

/// One concrete, fully-resolved parameter tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Positional arguments, in declaration order.
    pub positional: Vec<Value>,

    /// Keyword arguments.
    pub keyword: BTreeMap<String, Value>,
}

/// Expands a declared call into the Cartesian product of its expansion
/// markers (§4.3).
///
/// Expansion markers are visited left to right, positional arguments
/// before keyword arguments — matching `lymbo/cm.py`'s `args()` which
/// walks `args` before `kwargs`. If no marker is present, the single
/// input tuple is returned unchanged.
pub fn expand(positional: &[Arg], keyword: &[(String, Arg)]) -> Vec<Parameters> {
    let mut tuples = vec![Parameters {
        positional: Vec::with_capacity(positional.len()),
        keyword: BTreeMap::new(),
    }];

    for arg in positional {
        tuples = match arg {
            Arg::Literal(value) => tuples
                .into_iter()
                .map(|mut t| {
                    t.positional.push(value.clone());
                    t
                })
                .collect(),
            Arg::Expansion(values) => tuples
                .into_iter()
                .flat_map(|t| {
                    values.iter().map(move |v| {
                        let mut t = t.clone();
                        t.positional.push(v.clone());
                        t
                    })
                })
                .collect(),
        };
    }

    for (key, arg) in keyword {
        tuples = match arg {
            Arg::Literal(value) => tuples
                .into_iter()
                .map(|mut t| {
                    t.keyword.insert(key.clone(), value.clone());
                    t
                })
                .collect(),
            Arg::Expansion(values) => tuples
                .into_iter()
                .flat_map(|t| {
                    values.iter().map(move |v| {
                        let mut t = t.clone();
                        t.keyword.insert(key.clone(), v.clone());
                        t
                    })
                })
                .collect(),
        };
    }

    tuples
}
