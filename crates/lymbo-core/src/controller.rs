//! Pipeline controller (component I).
//!
//! Wires the scope registry (F), resource broker (G) and worker pool (H)
//! together, and owns the startup/shutdown protocol. Grounded on
//! `lymbo/__main__.py`'s `lymbo_entry_point` (collect → run) and
//! `lymbo/run.py`'s `run_test_plan` for the overall shape, generalized per
//! `spec.md` §4.9's explicit startup/shutdown sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::broker::ResourceBroker;
use crate::exec::{self, Stats};
use crate::plan::TestPlan;
use crate::report::ReportStore;
use crate::scope::ScopeRegistry;

/// The hard budget for draining the resource broker at shutdown (§4.9 step
/// 5, §5 "Cancellation & timeouts").
pub const SHUTDOWN_BUDGET: Duration = Duration::from_secs(30);

/// The result of running a whole plan to completion.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    /// Pass/fail/broken counters.
    pub stats: Stats,
    /// Total wall-clock duration, in whole seconds (§4.9 step 6).
    pub duration_secs: u64,
    /// Whether the broker shut down within [`SHUTDOWN_BUDGET`].
    pub broker_shutdown_clean: bool,
}

/// Runs a test plan end to end: builds the scope registry, spawns the
/// resource broker, dispatches every group to the executor pool, and
/// performs the bounded shutdown handshake (§4.9).
pub fn run(
    plan: &TestPlan,
    store: Arc<ReportStore>,
    workers: usize,
    on_progress: impl Fn(char) + Sync,
) -> RunReport {
    let start = Instant::now();

    // Step 1: build scope registry from the plan (§4.6).
    let registry = Arc::new(ScopeRegistry::build(plan));

    // Step 2: start the broker pool (a single dedicated thread per §1's
    // thread-pool resolution) sized alongside the executor pool.
    let broker = Arc::new(ResourceBroker::spawn(Arc::clone(&registry)));

    // Step 3: submit every group to the executor pool, draining results as
    // they complete (handled inside `exec::run_plan`'s rayon `for_each`).
    let stats = exec::run_plan(plan, &registry, &broker, &store, workers, on_progress);

    // Steps 4-5: signal shutdown and wait on the broker with a hard budget.
    // A real cross-thread broker has no outstanding work once every group
    // has finished (every request on its queue has already been answered),
    // so the join below either returns immediately or has genuinely hung.
    let shutdown_started = Instant::now();
    let broker = Arc::try_unwrap(broker);
    let broker_shutdown_clean = match broker {
        Ok(broker) => {
            let joined = broker.shutdown(SHUTDOWN_BUDGET);
            if !joined {
                warn!(
                    elapsed_secs = shutdown_started.elapsed().as_secs(),
                    "broker shutdown exceeded the 30s budget; abandoning teardown"
                );
            }
            joined
        }
        Err(_) => {
            // Another Arc clone is still outstanding (a panicked executor
            // thread leaked its handle); this is the "abandoned teardown"
            // case the controller is specified to tolerate.
            warn!("resource broker could not be joined cleanly; abandoning");
            false
        }
    };

    RunReport {
        stats,
        duration_secs: start.elapsed().as_secs(),
        broker_shutdown_clean,
    }
}

/// The process exit code for a completed run (§6 "Exit codes").
pub fn exit_code(stats: &Stats) -> i32 {
    if stats.failed > 0 || stats.broken > 0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Location;
    use crate::model::Value;
    use crate::plan::{Candidate, GroupBy, TestItem};
    use std::collections::BTreeMap;

    fn item(function: &str, body: crate::model::TestBody) -> (TestItem, Candidate) {
        let location = Location::new("tests/a.py", None, function);
        let candidate = Candidate {
            module_key: location.module_key(),
            class_key: location.class_key(),
            function_key: location.function_key(),
        };
        (
            TestItem::new(location, false, body, Vec::new(), BTreeMap::new(), None),
            candidate,
        )
    }

    #[test]
    fn test_run_plan_reports_stats_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ReportStore::open(dir.path()).unwrap());

        let passing: crate::model::TestBody = Arc::new(|_, _, _| Ok(Value::Unit));
        let failing: crate::model::TestBody =
            Arc::new(|_, _, _| Err(crate::model::TestError::assertion("nope")));

        let items = vec![item("pass_one", passing), item("fail_one", failing)];
        let plan = TestPlan::build(items, GroupBy::None);

        let report = run(&plan, store, 2, |_| {});

        assert_eq!(report.stats.passed, 1);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(exit_code(&report.stats), 1);
        assert!(report.broker_shutdown_clean);
    }

    #[test]
    fn test_exit_code_zero_when_all_passed() {
        let stats = Stats { passed: 3, failed: 0, broken: 0 };
        assert_eq!(exit_code(&stats), 0);
    }
}
