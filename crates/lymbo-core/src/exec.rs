//! Worker pool & dispatcher (component H).
//!
//! Parallel execution of groups, per-test output capture, expected-value
//! checking and status classification. Grounded on `lymbo/run.py`'s
//! `run_test_plan`/`run_tests`/`run_function`, re-expressed over a `rayon`
//! pool the way `typst-test-cli/src/test/runner.rs` fans its suite out,
//! instead of a `ProcessPoolExecutor`.

use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};

use crate::broker::ResourceBroker;
use crate::model::{Expected, TestOutcome, Value};
use crate::plan::{Group, Status, TestItem, TestPlan};
use crate::report::{ErrorDetail, ReportStore, TestSummary};
use crate::scope::ScopeRegistry;

/// A single test's progress token, printed after it finishes (§4.8 step 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `PASSED`.
    Passed,
    /// `FAILED`.
    Failed,
    /// `BROKEN`.
    Broken,
}

impl Token {
    /// The single-character progress marker for this outcome.
    pub fn as_char(self) -> char {
        match self {
            Token::Passed => 'P',
            Token::Failed => 'F',
            Token::Broken => 'B',
        }
    }
}

/// Aggregate counters over a completed run, used to derive the process
/// exit code (§6 "Exit codes").
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    /// Number of tests that passed.
    pub passed: usize,
    /// Number of tests that failed an assertion or expected-value check.
    pub failed: usize,
    /// Number of tests that broke on an unrelated error.
    pub broken: usize,
}

impl Stats {
    fn record(&mut self, token: Token) {
        match token {
            Token::Passed => self.passed += 1,
            Token::Failed => self.failed += 1,
            Token::Broken => self.broken += 1,
        }
    }

    /// Total tests counted so far.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.broken
    }
}

/// Runs every group of a plan to completion (§4.8 "Groups → workers").
///
/// Groups are dispatched onto a `rayon` pool sized to `workers`; within a
/// group, tests run strictly in order on the worker that picked it up
/// (§3 "Invariants" 3). Progress tokens are emitted on `on_progress` as each
/// test finishes.
pub fn run_plan(
    plan: &TestPlan,
    registry: &Arc<ScopeRegistry>,
    broker: &Arc<ResourceBroker>,
    store: &Arc<ReportStore>,
    workers: usize,
    on_progress: impl Fn(char) + Sync,
) -> Stats {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("lymbo-executor-{i}"))
        .build()
        .expect("failed to build executor thread pool");

    let stats = std::sync::Mutex::new(Stats::default());

    pool.install(|| {
        use rayon::prelude::*;
        plan.groups.par_iter().for_each(|group| {
            let tokens = run_group(group, registry, broker, store);
            let mut stats = stats.lock().expect("stats mutex poisoned");
            for token in tokens {
                stats.record(token);
                on_progress(token.as_char());
            }
        });
    });

    stats.into_inner().expect("stats mutex poisoned")
}

/// Runs every test in one group sequentially (§4.8 "Groups → workers"),
/// matching `run_tests`'s per-group loop.
fn run_group(
    group: &Group,
    registry: &Arc<ScopeRegistry>,
    broker: &Arc<ResourceBroker>,
    store: &Arc<ReportStore>,
) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(group.items.len());
    for item in &group.items {
        tokens.push(run_item(item, registry, broker, store));
    }
    tokens
}

/// Runs a single test item end to end (§4.8 "Per-test execution"), writing
/// its final record and returning its progress token.
fn run_item(
    item: &TestItem,
    registry: &Arc<ScopeRegistry>,
    broker: &Arc<ResourceBroker>,
    store: &Arc<ReportStore>,
) -> Token {
    let name = item.display_name();
    debug!(test = %name, "starting test");

    let start_at = Utc::now();
    let in_progress = TestSummary {
        name: name.clone(),
        uuid: item.uuid.clone(),
        status: Status::InProgress,
        start_at: Some(start_at),
        end_at: None,
        output: String::new(),
        error: None,
    };
    store.write(&in_progress).ok();

    let mut output = Vec::new();
    let captured_setup_output = Arc::new(std::sync::Mutex::new(String::new()));
    let outcome: TestOutcome = crate::broker::with_test_context(
        Arc::clone(broker),
        item.scopes_map(),
        Arc::clone(&captured_setup_output),
        || (item.body)(&item.positional, &item.keyword, &mut output),
    );
    let mut output = String::from_utf8_lossy(&output).into_owned();
    output.push_str(&captured_setup_output.lock().expect("captured-output mutex poisoned"));
    let end_at = Utc::now();

    let (status, token, error) = classify(outcome, item.expected.as_ref());

    let summary = TestSummary {
        name: name.clone(),
        uuid: item.uuid.clone(),
        status,
        start_at: Some(start_at),
        end_at: Some(end_at),
        output,
        error,
    };
    store.write(&summary).ok();

    let drained = registry.release_for(&item.scopes_map());
    if !drained.is_empty() {
        info!(test = %name, scopes = drained.len(), "releasing drained scopes");
        broker.teardown(drained);
    }

    token
}

/// Classifies a test's outcome against its declared expectation (§4.8 steps
/// 5-6): no error and no expected mismatch is `PASSED`; an assertion-kind
/// error or *any* expected mismatch is `FAILED`; any other error with no
/// applicable expectation is `BROKEN`. The Open Question resolution in
/// `spec.md` §9 governs the case where both a raised error and a declared
/// expectation are present: a raised error wins classification as `BROKEN`
/// unless the expectation is itself an exception type and it matches
/// (`PASSED`) or doesn't (`FAILED`) — a `Value`/`Type`/`Regex` expectation
/// has nothing to say about a raised error, so it doesn't rescue it from
/// `BROKEN`.
fn classify(outcome: TestOutcome, expected: Option<&Expected>) -> (Status, Token, Option<ErrorDetail>) {
    match outcome {
        Ok(value) => match expected {
            None => (Status::Passed, Token::Passed, None),
            Some(expectation) => {
                if matches_expected(expectation, &value) {
                    (Status::Passed, Token::Passed, None)
                } else {
                    let detail = ErrorDetail {
                        reason: format!("expected {expectation:?}, got {value}"),
                        error_message: vec![format!("returned value {value} did not match the declared expectation")],
                        traceback: Vec::new(),
                    };
                    (Status::Failed, Token::Failed, Some(detail))
                }
            }
        },
        Err(err) => {
            let detail = ErrorDetail {
                reason: err.message.clone(),
                error_message: vec![err.message.clone()],
                traceback: Vec::new(),
            };

            match expected {
                Some(Expected::ExceptionType(expected_type)) if *expected_type == err.exception_type => {
                    (Status::Passed, Token::Passed, None)
                }
                Some(Expected::ExceptionType(_)) => (Status::Failed, Token::Failed, Some(detail)),
                Some(Expected::Value(_) | Expected::Type(_) | Expected::Regex(_)) => {
                    (Status::Broken, Token::Broken, Some(detail))
                }
                None if err.kind == crate::model::ErrorKind::Assertion => {
                    (Status::Failed, Token::Failed, Some(detail))
                }
                None => (Status::Broken, Token::Broken, Some(detail)),
            }
        }
    }
}

/// Evaluates one `expected(...)` assertion against a test's returned value
/// (§4.8 step 5).
fn matches_expected(expected: &Expected, value: &Value) -> bool {
    match expected {
        Expected::Value(expected_value) => values_equal(value, expected_value),
        Expected::Type(expected_type) => value.value_type() == *expected_type,
        Expected::ExceptionType(_) => false, // no exception was raised
        Expected::Regex(pattern) => Regex::new(pattern)
            .map(|re| re.is_match(&value.to_string()))
            .unwrap_or(false),
    }
}

/// Value equality for `expected(...)` matching: an int and a float compare
/// equal by numeric value, the way `4 == 4.0` does in the source system,
/// since `a / b` there is untyped but a Rust test function's return type is
/// fixed to one or the other.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorKind, TestError, ValueType as VT};

    #[test]
    fn test_classify_passed_no_expectation() {
        let (status, token, error) = classify(Ok(Value::Int(4)), None);
        assert_eq!(status, Status::Passed);
        assert_eq!(token, Token::Passed);
        assert!(error.is_none());
    }

    #[test]
    fn test_classify_value_passed_cross_type_numeric_equality() {
        // S2: value_passed(a=4, b=2) with expected(2) -> PASSED (an int
        // expectation matches a float return of equal numeric value).
        let (status, token, _) = classify(Ok(Value::Float(2.0)), Some(&Expected::Value(Value::Int(2))));
        assert_eq!(status, Status::Passed);
        assert_eq!(token, Token::Passed);
    }

    #[test]
    fn test_classify_value_mismatch_is_failed() {
        // S2: division(a=9, b=2) with expected(4.5) -> FAILED.
        let (status, token, _) = classify(Ok(Value::Float(4.5)), Some(&Expected::Value(Value::Float(9.0))));
        assert_eq!(status, Status::Failed);
        assert_eq!(token, Token::Failed);
    }

    #[test]
    fn test_classify_exception_type_match_is_passed() {
        // S2: division(a=9, b=0) with expected(ZeroDivisionError) -> PASSED.
        let outcome: TestOutcome = Err(TestError::other("ZeroDivisionError", "division by zero"));
        let (status, token, _) = classify(outcome, Some(&Expected::ExceptionType("ZeroDivisionError")));
        assert_eq!(status, Status::Passed);
        assert_eq!(token, Token::Passed);
    }

    #[test]
    fn test_classify_type_match_is_passed() {
        // S2: type_passed(4, 2) expecting float -> PASSED.
        let (status, _, _) = classify(Ok(Value::Float(2.0)), Some(&Expected::Type(VT::Float)));
        assert_eq!(status, Status::Passed);
    }

    #[test]
    fn test_classify_exception_type_mismatch_is_failed() {
        // S2: exception_failed(4, 0) expecting NameError -> FAILED.
        let outcome: TestOutcome = Err(TestError::other("ZeroDivisionError", "division by zero"));
        let (status, token, _) = classify(outcome, Some(&Expected::ExceptionType("NameError")));
        assert_eq!(status, Status::Failed);
        assert_eq!(token, Token::Failed);
    }

    #[test]
    fn test_classify_assertion_without_expectation_is_failed() {
        let outcome: TestOutcome = Err(TestError::assertion("values differ"));
        let (status, token, _) = classify(outcome, None);
        assert_eq!(status, Status::Failed);
        assert_eq!(token, Token::Failed);
    }

    #[test]
    fn test_classify_raised_error_with_value_expectation_is_broken() {
        // A raised error wins classification as BROKEN over a Value
        // expectation, since the expectation has nothing to say about it.
        let outcome: TestOutcome = Err(TestError::other("ZeroDivisionError", "division by zero"));
        let (status, token, _) = classify(outcome, Some(&Expected::Value(Value::Int(4))));
        assert_eq!(status, Status::Broken);
        assert_eq!(token, Token::Broken);
    }

    #[test]
    fn test_classify_raised_error_with_type_expectation_is_broken() {
        let outcome: TestOutcome = Err(TestError::other("ZeroDivisionError", "division by zero"));
        let (status, token, _) = classify(outcome, Some(&Expected::Type(VT::Float)));
        assert_eq!(status, Status::Broken);
        assert_eq!(token, Token::Broken);
    }

    #[test]
    fn test_classify_other_error_is_broken() {
        let outcome: TestOutcome = Err(TestError::other("IOError", "disk full"));
        let (status, token, _) = classify(outcome, None);
        assert_eq!(status, Status::Broken);
        assert_eq!(token, Token::Broken);
    }

    #[test]
    fn test_classify_regex_match() {
        let (status, _, _) = classify(
            Ok(Value::Str("v1.2.3".into())),
            Some(&Expected::Regex(r"^v\d+\.\d+\.\d+$".into())),
        );
        assert_eq!(status, Status::Passed);
    }

    #[test]
    fn test_error_kind_eq_used_in_classification() {
        assert_eq!(ErrorKind::Assertion, ErrorKind::Assertion);
    }
}
