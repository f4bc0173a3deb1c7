//! The error taxonomy of the execution engine.
//!
//! Collection errors are terminal, setup and scope errors classify a
//! single test, teardown errors are logged and never fail a test.

use thiserror::Error;

/// An error raised while parsing a filter expression (§4.4).
///
/// Filter-syntax errors are terminal: collection aborts.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The pest grammar rejected the input.
    #[error("the filter expression could not be parsed")]
    Syntax(#[from] Box<pest::error::Error<crate::filter::Rule>>),
}

/// An error raised while acquiring a scoped resource (§4.7).
#[derive(Debug, Error, Clone)]
pub enum ScopeError {
    /// A resource at depth `D` was requested while a strictly deeper scope
    /// was already active on the borrowing task.
    #[error("can't share a resource with the scope [{requested}] under a shared resource with the scope [{active}]")]
    Hierarchy {
        /// The scope depth that was requested.
        requested: crate::identity::ScopeKind,

        /// The deepest scope already active on the borrowing task.
        active: crate::identity::ScopeKind,
    },

    /// A scoped resource was requested from inside a factory body.
    #[error("can't acquire a scoped resource from within a resource factory")]
    Nesting,
}

/// An error raised by a resource factory during setup (§4.7 "Setup").
///
/// Stored verbatim in the resource slot; every borrower re-raises it as an
/// [`AcquireError::Setup`].
#[derive(Debug, Clone)]
pub struct SetupError {
    /// The factory's error message.
    pub message: String,
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SetupError {}

/// An error surfaced to a borrower while acquiring a scoped resource.
#[derive(Debug, Error, Clone)]
pub enum AcquireError {
    /// The resource factory itself failed during setup.
    #[error("resource setup failed: {0}")]
    Setup(#[from] SetupError),

    /// The scope hierarchy or nesting rule was violated.
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl From<AcquireError> for crate::model::TestError {
    /// Lets a test body `?`-propagate a `scope_*` failure (§4.7 "Setup
    /// errors ... classifies the test as BROKEN", "Scope errors ... raised
    /// at the borrow site"): with no matching `expected(...)`, both
    /// surface as `BROKEN` through the same `ErrorKind::Other` path a test's
    /// own non-assertion errors take.
    fn from(err: AcquireError) -> Self {
        let exception_type = match &err {
            AcquireError::Setup(_) => "SetupError",
            AcquireError::Scope(ScopeError::Hierarchy { .. }) => "ScopeHierarchyError",
            AcquireError::Scope(ScopeError::Nesting) => "ScopeNestingError",
        };
        crate::model::TestError::other(exception_type, err.to_string())
    }
}

/// An error reading or writing a report record (§4.2).
#[derive(Debug, Error)]
pub enum ReportError {
    /// The underlying filesystem operation failed.
    #[error("an io error occurred")]
    Io(#[from] std::io::Error),

    /// The on-disk record did not parse as the expected JSON shape.
    #[error("the report record was malformed")]
    Malformed(#[from] serde_json::Error),
}
