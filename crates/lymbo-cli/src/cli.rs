//! The command-line surface (§6), a single flat `clap::Parser` struct:
//! unlike the teacher's subcommand tree, lymbo is a single-command tool, so
//! there is one [`Args`] rather than a `Command` enum.

use std::path::PathBuf;

use clap::ColorChoice;

/// Exit code: success, or a run with no `FAILED`/`BROKEN` tests.
pub const EXIT_OK: i32 = 0;

/// Exit code: at least one test `FAILED` or was `BROKEN`.
pub const EXIT_TEST_FAILURE: i32 = 1;

/// Exit code: an informational request was served (`--version`,
/// `--collect`) or no test matched the given paths/filter (§6 "Exit
/// codes").
pub const EXIT_INFORMATIONAL: i32 = 5;

/// `notset|debug|info|warning|error|critical`, mapped onto [`tracing::Level`]
/// (§6 "Environment variables": "Logging level").
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// No logging at all.
    Notset,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// The `tracing` level this maps onto, or `None` for [`LogLevel::Notset`].
    pub fn as_tracing_level(self) -> Option<tracing::Level> {
        match self {
            LogLevel::Notset => None,
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Warning => Some(tracing::Level::WARN),
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Critical => Some(tracing::Level::ERROR),
        }
    }
}

/// `none|module|class|function` (§4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum GroupBy {
    #[default]
    None,
    Module,
    Class,
    Function,
}

impl From<GroupBy> for lymbo_core::plan::GroupBy {
    fn from(value: GroupBy) -> Self {
        match value {
            GroupBy::None => lymbo_core::plan::GroupBy::None,
            GroupBy::Module => lymbo_core::plan::GroupBy::Module,
            GroupBy::Class => lymbo_core::plan::GroupBy::Class,
            GroupBy::Function => lymbo_core::plan::GroupBy::Function,
        }
    }
}

/// `none|simple|normal|full` (§6 "`--report-failure`", §7 "Propagation
/// policy").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFailure {
    None,
    #[default]
    Simple,
    Normal,
    Full,
}

/// Run and manage a lymbo test suite.
///
/// `--version` is handled by hand rather than through clap's built-in flag,
/// since lymbo's own exit code for it is `5`, not `0` (§6 "Exit codes").
#[derive(clap::Parser, Debug, Clone)]
#[clap(about, disable_version_flag = true)]
pub struct Args {
    /// The paths to collect tests from.
    ///
    /// Defaults to `test/` and `tests/` if neither is given and at least one
    /// exists.
    pub paths: Vec<PathBuf>,

    /// Print the version and exit.
    #[arg(long)]
    pub version: bool,

    /// Print the resolved test plan and exit, without running anything.
    #[arg(long)]
    pub collect: bool,

    /// How to group tests for reporting and scheduling (§4.5).
    #[arg(long, value_enum, default_value_t = GroupBy::None)]
    pub groupby: GroupBy,

    /// The report directory to write JSON records into.
    ///
    /// Defaults to a newly created temporary directory.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// The minimum severity to log.
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Notset)]
    pub log_level: LogLevel,

    /// A file to additionally write logs to.
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// How much detail to print for non-passing tests at the end of a run.
    #[arg(long = "report-failure", value_enum, default_value_t = ReportFailure::Simple)]
    pub report_failure: ReportFailure,

    /// The number of worker threads to run tests on.
    ///
    /// Defaults to the detected CPU count.
    #[arg(long, short)]
    pub workers: Option<usize>,

    /// A filter expression restricting which tests run (§4.4).
    #[arg(long)]
    pub filter: Option<String>,

    /// When to use colorful output.
    #[clap(long, value_name = "WHEN", default_value = "auto")]
    pub color: ColorChoice,
}

impl Args {
    /// The paths to collect from, with the `test/`/`tests/` default applied
    /// when none were given (§6 "Positional").
    pub fn resolved_paths(&self) -> Vec<PathBuf> {
        if !self.paths.is_empty() {
            return self.paths.clone();
        }

        ["test", "tests"]
            .into_iter()
            .map(PathBuf::from)
            .filter(|p| p.is_dir())
            .collect()
    }

    /// The worker count to run with, defaulting to the detected parallelism.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}
