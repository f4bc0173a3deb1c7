//! The front-end's error taxonomy.
//!
//! `lymbo-core` classifies *test* outcomes; this module only distinguishes a
//! clean, user-facing operation failure (bad filter expression, report
//! directory that can't be created, log file that can't be opened) from a
//! genuine bug, the way the teacher's own `error.rs` does with its
//! `Failure` trait and `OperationFailure` wrapper.

use std::error::Error;
use std::fmt::Display;
use std::io;

use thiserror::Error;

use crate::ui::Ui;

/// A user-facing operation failure: distinct from an unexpected bug, this
/// kind of error is reported without a backtrace.
pub trait Failure: Error + Send + Sync + 'static {
    /// Writes this failure's message to the user.
    fn report(&self, ui: &Ui) -> io::Result<()>;

    /// The process exit code this failure should produce (§6 "Exit codes").
    ///
    /// Defaults to `5`, the "informational" bucket `NoTests` belongs to;
    /// hard collection errors (bad filter syntax, an unusable report
    /// directory) override this to `1`, since `spec.md` only defines `0`,
    /// `1` and `5` and these are closer in spirit to "the run did not
    /// complete successfully" than to an informational request.
    fn exit_code(&self) -> i32 {
        5
    }
}

/// At least one test failed or broke; used only to pick the exit code, never
/// printed (the per-test summary already told the user which ones).
#[derive(Debug, Error)]
#[error("one or more tests failed")]
pub struct TestFailure;

impl Failure for TestFailure {
    fn report(&self, _ui: &Ui) -> io::Result<()> {
        Ok(())
    }

    fn exit_code(&self) -> i32 {
        1
    }
}

/// Wraps a [`Failure`] so it can be carried through a `color_eyre::Result`
/// and recognized again by `main`'s exit-code classification.
#[derive(Debug)]
pub struct OperationFailure(pub Box<dyn Failure>);

impl Error for OperationFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

impl Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<F: Failure> From<F> for OperationFailure {
    fn from(value: F) -> Self {
        OperationFailure(Box::new(value) as _)
    }
}

/// No test matched the paths/filter given on the command line (§6 "Exit
/// codes": this is informational, not a failure, but it still aborts the
/// run before any test is dispatched).
#[derive(Debug, Error)]
#[error("no tests matched")]
pub struct NoTests;

impl Failure for NoTests {
    fn report(&self, ui: &Ui) -> io::Result<()> {
        ui.error("Matched no tests")
    }
}

/// A filter expression (`--filter`) failed to parse (§4.4, §7 "Collection
/// errors ... terminal; the run aborts").
#[derive(Debug, Error)]
#[error("invalid filter expression")]
pub struct InvalidFilter(#[source] pub lymbo_core::error::FilterError);

impl Failure for InvalidFilter {
    fn report(&self, ui: &Ui) -> io::Result<()> {
        ui.error_with(|w| writeln!(w, "Invalid filter expression:\n{}", self.0))
    }

    fn exit_code(&self) -> i32 {
        1
    }
}

/// The report directory could not be created or cleaned (§4.2).
#[derive(Debug, Error)]
#[error("could not open report directory")]
pub struct ReportDirUnavailable(#[source] pub lymbo_core::error::ReportError);

impl Failure for ReportDirUnavailable {
    fn report(&self, ui: &Ui) -> io::Result<()> {
        ui.error_with(|w| writeln!(w, "Could not open the report directory:\n{}", self.0))
    }

    fn exit_code(&self) -> i32 {
        1
    }
}
