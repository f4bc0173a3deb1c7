//! Identity & naming (component A).
//!
//! Deterministic display names and unique identifiers for each test
//! instantiation, plus the scope hierarchy (§3 "Invariants" 5) that the
//! resource broker (G) enforces.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::Value;

/// The depth ordering `session < module < class < function` (§3, §4.7
/// "Hierarchy rule").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// One bucket per run.
    Session,
    /// One bucket per source file.
    Module,
    /// One bucket per class within a module.
    Class,
    /// One bucket per function (or method) within a module/class.
    Function,
}

impl ScopeKind {
    /// All scope kinds, shallowest first.
    pub const ALL: [ScopeKind; 4] = [
        ScopeKind::Session,
        ScopeKind::Module,
        ScopeKind::Class,
        ScopeKind::Function,
    ];
}

impl Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScopeKind::Session => "global",
            ScopeKind::Module => "module",
            ScopeKind::Class => "class",
            ScopeKind::Function => "function",
        };
        write!(f, "{s}")
    }
}

/// The declaration site of a test: its source path, optional enclosing
/// class, and function name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    /// The source file this test is declared in.
    pub path: String,

    /// The enclosing class, if the test is a method.
    pub class: Option<String>,

    /// The test function's name.
    pub function: String,
}

impl Location {
    /// Creates a new location.
    pub fn new(path: impl Into<String>, class: Option<String>, function: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            class,
            function: function.into(),
        }
    }

    /// The session scope key: a literal constant, shared across every test
    /// in the run.
    pub fn session_key(&self) -> String {
        "session".to_owned()
    }

    /// The module scope key: the source path.
    pub fn module_key(&self) -> String {
        self.path.clone()
    }

    /// The class scope key, absent if this test is not declared in a class.
    pub fn class_key(&self) -> Option<String> {
        self.class
            .as_ref()
            .map(|class| format!("{}::{class}", self.path))
    }

    /// The function scope key.
    pub fn function_key(&self) -> String {
        match &self.class {
            Some(class) => format!("{}::{class}::{}", self.path, self.function),
            None => format!("{}::{}", self.path, self.function),
        }
    }

    /// The scopes map derived from this location (§3 "Scopes map"): every
    /// scope key this test participates in, paired with its kind.
    pub fn scopes_map(&self) -> Vec<(ScopeKind, String)> {
        let mut scopes = vec![
            (ScopeKind::Session, self.session_key()),
            (ScopeKind::Module, self.module_key()),
        ];

        if let Some(class_key) = self.class_key() {
            scopes.push((ScopeKind::Class, class_key));
        }

        scopes.push((ScopeKind::Function, self.function_key()));

        scopes
    }
}

/// Renders the display name `path::[class::]function(args)` (§4.1).
///
/// Positional arguments are rendered in declaration order; keyword
/// arguments follow as `name=value`, sorted by name for determinism.
pub fn display_name(
    location: &Location,
    positional: &[Value],
    keyword: &BTreeMap<String, Value>,
) -> String {
    let mut name = location.path.clone();
    name.push_str("::");
    if let Some(class) = &location.class {
        name.push_str(class);
        name.push_str("::");
    }
    name.push_str(&location.function);

    name.push('(');
    let mut first = true;
    for value in positional {
        if !first {
            name.push_str(", ");
        }
        name.push_str(&value.to_string());
        first = false;
    }
    for (key, value) in keyword {
        if !first {
            name.push_str(", ");
        }
        name.push_str(key);
        name.push('=');
        name.push_str(&value.to_string());
        first = false;
    }
    name.push(')');

    name
}

/// Generates a fresh unique identifier for a test invocation.
///
/// `spec.md` derives its uuid from `hash(display_name) ⊕ microsecond
/// timestamp ⊕ 5-digit random`; a v4 UUID satisfies the same requirement —
/// "unique across a run with overwhelming probability" — with a single
/// well-tested primitive instead of a hand-rolled mixing scheme (see
/// DESIGN.md).
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}
