//! `lymbo`: a parallel test runner for large test suites.
//!
//! Per `spec.md` §1 the source-file collector and the terminal renderer are
//! external collaborators; this binary supplies reference implementations of
//! both (via `lymbo_core::collector::StaticTestSource` and this crate's
//! `ui`/`report` modules) so the workspace is a runnable tool, while
//! `lymbo-core` keeps every scheduling and classification policy.

use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use color_eyre::eyre;
use termcolor::{StandardStream, WriteColor};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_tree::HierarchicalLayer;

use cli::{Args, EXIT_INFORMATIONAL, EXIT_OK};
use error::{Failure, InvalidFilter, NoTests, OperationFailure, ReportDirUnavailable, TestFailure};
use lymbo_core::collector::{self, StaticTestSource};
use lymbo_core::controller;
use lymbo_core::filter::Expr;
use lymbo_core::report::ReportStore;
use report::Reporter;
use ui::Ui;

mod cli;
mod error;
mod report;
mod ui;

fn main() -> ExitCode {
    let args = Args::parse();

    let cc = match args.color {
        clap::ColorChoice::Auto => termcolor::ColorChoice::Auto,
        clap::ColorChoice::Always => termcolor::ColorChoice::Always,
        clap::ColorChoice::Never => termcolor::ColorChoice::Never,
    };
    let ui = Ui::new(cc, cc);

    match main_impl(&args, &ui) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            for cause in err.chain() {
                if let Some(failure) = cause.downcast_ref::<OperationFailure>() {
                    failure.0.report(&ui).ok();
                    return ExitCode::from(failure.0.exit_code() as u8);
                }
            }

            ui.error_with(|w| {
                writeln!(w, "lymbo ran into an unexpected error, this is most likely a bug")
            })
            .ok();
            ui.error_with(|w| writeln!(w, "{err:?}")).ok();
            ExitCode::from(1)
        }
    }
}

fn main_impl(args: &Args, ui: &Ui) -> eyre::Result<i32> {
    color_eyre::install()?;

    let tracing_ansi = StandardStream::stderr(match args.color {
        clap::ColorChoice::Auto => termcolor::ColorChoice::Auto,
        clap::ColorChoice::Always => termcolor::ColorChoice::Always,
        clap::ColorChoice::Never => termcolor::ColorChoice::Never,
    })
    .supports_color();

    let level_filter = args
        .log_level
        .as_tracing_level()
        .map(tracing_subscriber::filter::LevelFilter::from_level)
        .unwrap_or(tracing_subscriber::filter::LevelFilter::OFF);

    let console_layer = HierarchicalLayer::new(2)
        .with_targets(true)
        .with_ansi(tracing_ansi);

    let file_layer = args
        .log
        .as_ref()
        .map(|path| -> eyre::Result<_> {
            let file = File::create(path)?;
            Ok(tracing_subscriber::fmt::layer()
                .with_writer(file)
                .with_ansi(false))
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(Targets::new().with_default(level_filter))
        .init();

    if args.version {
        println!("lymbo {}", env!("CARGO_PKG_VERSION"));
        return Ok(EXIT_INFORMATIONAL);
    }

    run(args, ui)
}

fn run(args: &Args, ui: &Ui) -> eyre::Result<i32> {
    let paths = args.resolved_paths();
    let workers = args.resolved_workers();

    let filter = args
        .filter
        .as_deref()
        .map(Expr::parse)
        .transpose()
        .map_err(InvalidFilter)
        .map_err(OperationFailure::from)?;

    tracing::debug!(?paths, workers, ?filter, "starting run");

    let plan = collector::collect(&StaticTestSource, args.groupby.into(), filter.as_ref());

    if args.collect {
        for line in plan.render_plan() {
            println!("{line}");
        }
        return Ok(if plan.is_empty() { EXIT_INFORMATIONAL } else { EXIT_OK });
    }

    if plan.is_empty() {
        return Err(OperationFailure::from(NoTests).into());
    }

    let store = match &args.report {
        Some(dir) => ReportStore::open(dir),
        None => ReportStore::open_temporary(),
    }
    .map_err(ReportDirUnavailable)
    .map_err(OperationFailure::from)?;
    let store = Arc::new(store);

    let reporter = Reporter::new(ui, ui.can_report_live());
    reporter.report_start(plan.len(), workers)?;

    let start = Instant::now();
    let report = controller::run(&plan, Arc::clone(&store), workers, |token| {
        reporter.report_progress(token).ok();
    });
    let duration = Duration::from_secs(report.duration_secs.max(start.elapsed().as_secs()));

    reporter.report_end(&report.stats, duration)?;

    if !matches!(args.report_failure, cli::ReportFailure::None) {
        for record in store.read_all().unwrap_or_default() {
            reporter.report_failure(&record, args.report_failure)?;
        }
    }

    if !report.broker_shutdown_clean {
        ui.warning("the resource broker did not shut down cleanly within its budget")?;
    }

    if controller::exit_code(&report.stats) == 0 {
        Ok(EXIT_OK)
    } else {
        Err(OperationFailure::from(TestFailure).into())
    }
}
