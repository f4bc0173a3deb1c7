//! Live reporting of test progress (§4.8 step 7, §6 "`--report-failure`").
//!
//! Grounded on the teacher's `report.rs` `Reporter`: a start/end annotated
//! summary plus a live-updating status line, re-expressed over lymbo's
//! three-way `PASSED`/`FAILED`/`BROKEN` outcome instead of typst's
//! pass/fail-with-images model.

use std::io;
use std::time::Duration;

use lymbo_core::exec::Stats;
use lymbo_core::plan::Status;
use lymbo_core::report::Record;
use termcolor::Color;

use crate::cli::ReportFailure;
use crate::ui::{self, Ui};

/// The padding to use for annotations while reporting (`"warning:"` is the
/// longest standard annotation at 8 bytes; `"Summary"` needs one more).
const RUN_ANNOT_PADDING: usize = 8;

/// A reporter for test run progress and the end-of-run summary.
pub struct Reporter<'ui> {
    ui: &'ui Ui,
    live: bool,
}

impl<'ui> Reporter<'ui> {
    pub fn new(ui: &'ui Ui, live: bool) -> Self {
        Self { ui, live }
    }

    pub fn ui(&self) -> &Ui {
        self.ui
    }

    /// Reports the start of a run (§4.8 "Groups -> workers").
    pub fn report_start(&self, total: usize, workers: usize) -> io::Result<()> {
        let mut w = self.ui.stderr();

        ui::write_annotated(&mut w, "Starting", Color::Green, RUN_ANNOT_PADDING, |w| {
            ui::write_bold(w, |w| write!(w, "{total}"))?;
            write!(w, " tests on ")?;
            ui::write_bold(w, |w| write!(w, "{workers}"))?;
            writeln!(w, " workers")
        })
    }

    /// Emits a single progress token as each test finishes (`P`/`F`/`B`).
    ///
    /// When not live (not a terminal, or `--log` redirected stderr), tokens
    /// are printed inline with no trailing newline, matching a classic dot
    /// progress reporter.
    pub fn report_progress(&self, token: char) -> io::Result<()> {
        let mut w = self.ui.stderr();
        let color = match token {
            'P' => Color::Green,
            'F' => Color::Red,
            _ => Color::Yellow,
        };
        ui::write_colored(&mut w, color, |w| write!(w, "{token}"))
    }

    /// Reports the end of a run: a colored one-line summary (§4.9 step 6).
    pub fn report_end(&self, stats: &Stats, duration: Duration) -> io::Result<()> {
        let mut w = self.ui.stderr();

        if self.live {
            writeln!(w)?;
        }

        let color = if stats.failed == 0 && stats.broken == 0 {
            Color::Green
        } else if stats.passed == 0 {
            Color::Red
        } else {
            Color::Yellow
        };

        ui::write_annotated(&mut w, "Summary", color, RUN_ANNOT_PADDING, |w| {
            write!(w, "[{}s] ", duration.as_secs())?;
            ui::write_bold(w, |w| write!(w, "{}", stats.total()))?;
            write!(w, " tests run: ")?;

            ui::write_bold(w, |w| write!(w, "{}", stats.passed))?;
            write!(w, " ")?;
            ui::write_colored(w, Color::Green, |w| write!(w, "passed"))?;

            if stats.failed != 0 {
                write!(w, ", ")?;
                ui::write_bold(w, |w| write!(w, "{}", stats.failed))?;
                write!(w, " ")?;
                ui::write_colored(w, Color::Red, |w| write!(w, "failed"))?;
            }

            if stats.broken != 0 {
                write!(w, ", ")?;
                ui::write_bold(w, |w| write!(w, "{}", stats.broken))?;
                write!(w, " ")?;
                ui::write_colored(w, Color::Yellow, |w| write!(w, "broken"))?;
            }

            writeln!(w)
        })
    }

    /// Reports one non-passing record's failure detail at the verbosity
    /// `level` requests (§7 "Propagation policy").
    pub fn report_failure(&self, record: &Record, level: ReportFailure) -> io::Result<()> {
        if level == ReportFailure::None {
            return Ok(());
        }

        let (header, color) = match record.test.status {
            Status::Failed => ("fail", Color::Red),
            Status::Broken => ("broke", Color::Yellow),
            _ => return Ok(()),
        };

        let mut w = self.ui.stderr();
        ui::write_annotated(&mut w, header, color, RUN_ANNOT_PADDING, |w| {
            writeln!(w, "{}", record.test.name)?;

            let Some(error) = &record.test.error else {
                return Ok(());
            };

            writeln!(w, "{}", error.reason)?;

            if matches!(level, ReportFailure::Normal | ReportFailure::Full) {
                for line in &error.error_message {
                    writeln!(w, "{line}")?;
                }
            }

            if level == ReportFailure::Full {
                for line in &error.traceback {
                    writeln!(w, "{line}")?;
                }
            }

            Ok(())
        })
    }
}
