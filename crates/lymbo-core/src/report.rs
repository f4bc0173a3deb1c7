//! Report store (component B).
//!
//! A directory of per-test JSON records, atomically written, re-readable by
//! any worker. Grounded on `lymbo/report.py`'s `TestReport` (directory
//! creation + `lymbo-*` cleanup) and on [`lymbo_stdx::fs`]'s
//! `atomic_write`/`list_with_prefix` primitives built for exactly this
//! purpose.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ReportError;
use crate::plan::Status;

/// The on-disk schema version (§4.2 record shape's `lymbo` field).
pub const SCHEMA_VERSION: u32 = 1;

/// The error payload embedded in a [`Record`] when a test did not pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// A short, human readable reason.
    pub reason: String,

    /// The error message, one entry per line.
    pub error_message: Vec<String>,

    /// A best-effort traceback, one entry per line.
    pub traceback: Vec<String>,
}

/// One test's report record, as persisted to `lymbo-<uuid>.json` (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// The schema version this record was written with.
    pub lymbo: u32,

    /// The embedded test summary.
    pub test: TestSummary,
}

/// The `test` object embedded in a [`Record`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    /// The test's display name (§4.1).
    pub name: String,

    /// The test's unique identifier (§3).
    pub uuid: String,

    /// The test's final (or in-progress) status.
    pub status: Status,

    /// When the test started, if it has.
    pub start_at: Option<chrono::DateTime<chrono::Utc>>,

    /// When the test ended, if it has.
    pub end_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Captured stdout/stderr.
    pub output: String,

    /// Failure detail, present only for non-passing statuses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// A directory of report records.
///
/// Created if missing; cleaned of prior `lymbo-*` entries on construction,
/// matching `TestReport.__init__`'s `self.clean()` call.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Opens (creating if necessary) a report store at `dir`, removing any
    /// `lymbo-*` entries left over from a previous run.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        lymbo_stdx::fs::create_dir(&dir, true)?;

        let this = Self { dir };
        this.clean()?;
        Ok(this)
    }

    /// Opens a report store in a freshly created temporary directory, the
    /// default when `--report` is not given (§6).
    pub fn open_temporary() -> Result<Self, ReportError> {
        let dir = std::env::temp_dir().join(format!("lymbo-report-{}", crate::identity::new_uuid()));
        Self::open(dir)
    }

    /// The directory backing this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes every `lymbo-*` entry in this store's directory.
    fn clean(&self) -> Result<(), ReportError> {
        for path in lymbo_stdx::fs::list_with_prefix(&self.dir, "lymbo-")? {
            debug!(path = %path.display(), "removing stale report file");
            lymbo_stdx::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// The path a record for `uuid` would live at.
    fn path_for(&self, uuid: &str) -> PathBuf {
        self.dir.join(format!("lymbo-{uuid}.json"))
    }

    /// Atomically writes (or rewrites) a test's record (§3 "Invariants" 4:
    /// "its report file is rewritten atomically on every state transition").
    pub fn write(&self, summary: &TestSummary) -> Result<(), ReportError> {
        let record = Record {
            lymbo: SCHEMA_VERSION,
            test: summary.clone(),
        };

        let bytes = serde_json::to_vec_pretty(&record)?;
        lymbo_stdx::fs::atomic_write(self.path_for(&summary.uuid), bytes)?;
        Ok(())
    }

    /// Reads back a test's record, retrying briefly on transient absence
    /// the way a status listing refreshes from disk (§4.5 "Rendering").
    pub fn read(&self, uuid: &str) -> Result<Option<Record>, ReportError> {
        let path = self.path_for(uuid);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads back every record currently in the store.
    pub fn read_all(&self) -> Result<Vec<Record>, ReportError> {
        let mut records = Vec::new();
        for path in lymbo_stdx::fs::list_with_prefix(&self.dir, "lymbo-")? {
            let bytes = std::fs::read(&path)?;
            records.push(serde_json::from_slice(&bytes)?);
        }
        Ok(records)
    }
}
