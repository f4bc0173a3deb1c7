//! End-to-end tests over the seed scenarios (§8), driven through
//! `StaticTestSource` fixtures registered with `inventory::submit!`
//! directly (no macro crate needed to exercise the engine itself).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lymbo_core::collector::{self, CandidateTest, StaticTestSource};
use lymbo_core::model::{Expected, TestError, TestOutcome, Value, ValueType};
use lymbo_core::params::Arg;
use lymbo_core::plan::GroupBy;
use lymbo_core::report::ReportStore;

fn body(f: fn(&[Value], &BTreeMap<String, Value>) -> TestOutcome) -> lymbo_core::model::TestBody {
    Arc::new(move |positional, keyword, _output| f(positional, keyword))
}

// S1 — Parameter expansion.
static S1_CANDIDATE: CandidateTest = CandidateTest {
    path: "tests/seed.py",
    class: None,
    function: "by_four",
    asynchronous: false,
    positional: Vec::new,
    keyword: || {
        vec![(
            "n".to_owned(),
            Arg::Expansion(vec![Value::Int(1), Value::Int(4), Value::Int(9), Value::Int(116)]),
        )]
    },
    expected: || None,
    body: || body(|_, kw| Ok(kw.get("n").cloned().unwrap())),
};
inventory::submit!(S1_CANDIDATE);

#[test]
fn test_s1_parameter_expansion_produces_four_named_items() {
    let plan = collector::collect(&StaticTestSource, GroupBy::None, None);
    let names: Vec<_> = plan
        .groups
        .iter()
        .flat_map(|g| g.items.iter())
        .filter(|item| item.display_name().contains("by_four"))
        .map(|item| item.display_name())
        .collect();

    assert_eq!(names.len(), 4);
    for suffix in ["n=1", "n=4", "n=9", "n=116"] {
        assert!(names.iter().any(|n| n.contains(suffix)), "missing {suffix} in {names:?}");
    }
}

// S2 — Expected values matrix.
static S2_DIVISION: CandidateTest = CandidateTest {
    path: "tests/seed.py",
    class: None,
    function: "division",
    asynchronous: false,
    positional: Vec::new,
    keyword: || vec![("a".to_owned(), Arg::lit(Value::Int(9))), ("b".to_owned(), Arg::lit(Value::Int(2)))],
    // Deliberately mismatched against the returned 4.5, as spec.md's S2
    // scenario demonstrates the equality check rejecting an unequal value.
    expected: || Some(Expected::Value(Value::Int(4))),
    body: || {
        body(|_, kw| {
            let a = kw.get("a").and_then(|v| if let Value::Int(i) = v { Some(*i) } else { None }).unwrap();
            let b = kw.get("b").and_then(|v| if let Value::Int(i) = v { Some(*i) } else { None }).unwrap();
            if b == 0 {
                return Err(TestError::other("ZeroDivisionError", "division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        })
    },
};
inventory::submit!(S2_DIVISION);

static S2_DIVISION_BY_ZERO: CandidateTest = CandidateTest {
    path: "tests/seed.py",
    class: None,
    function: "division_by_zero",
    asynchronous: false,
    positional: Vec::new,
    keyword: || vec![("a".to_owned(), Arg::lit(Value::Int(9))), ("b".to_owned(), Arg::lit(Value::Int(0)))],
    expected: || Some(Expected::ExceptionType("ZeroDivisionError")),
    body: S2_DIVISION.body,
};
inventory::submit!(S2_DIVISION_BY_ZERO);

static S2_TYPE_PASSED: CandidateTest = CandidateTest {
    path: "tests/seed.py",
    class: None,
    function: "type_passed",
    asynchronous: false,
    positional: || vec![Arg::lit(Value::Int(4)), Arg::lit(Value::Int(2))],
    keyword: Vec::new,
    expected: || Some(Expected::Type(ValueType::Float)),
    body: || body(|pos, _| {
        let a = if let Value::Int(i) = pos[0] { i } else { 0 };
        let b = if let Value::Int(i) = pos[1] { i } else { 1 };
        Ok(Value::Float(a as f64 / b as f64))
    }),
};
inventory::submit!(S2_TYPE_PASSED);

static S2_EXCEPTION_FAILED: CandidateTest = CandidateTest {
    path: "tests/seed.py",
    class: None,
    function: "exception_failed",
    asynchronous: false,
    positional: || vec![Arg::lit(Value::Int(4)), Arg::lit(Value::Int(0))],
    keyword: Vec::new,
    expected: || Some(Expected::ExceptionType("NameError")),
    body: || body(|pos, _| {
        let a = if let Value::Int(i) = pos[0] { i } else { 0 };
        let b = if let Value::Int(i) = pos[1] { i } else { 0 };
        if b == 0 {
            return Err(TestError::other("ZeroDivisionError", "division by zero"));
        }
        Ok(Value::Float(a as f64 / b as f64))
    }),
};
inventory::submit!(S2_EXCEPTION_FAILED);

#[test]
fn test_s2_expected_values_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ReportStore::open(dir.path()).unwrap());

    let plan = collector::collect(&StaticTestSource, GroupBy::None, Some(
        &lymbo_core::filter::Expr::parse("division or type_passed or exception_failed").unwrap(),
    ));

    let report = lymbo_core::controller::run(&plan, store.clone(), 4, |_| {});
    assert_eq!(report.stats.total(), 4);
    assert_eq!(report.stats.passed, 2); // division_by_zero, type_passed
    assert_eq!(report.stats.failed, 2); // division, exception_failed

    for record in store.read_all().unwrap() {
        if record.test.name.contains("::division(") {
            assert_eq!(record.test.status, lymbo_core::plan::Status::Failed);
        }
        if record.test.name.contains("division_by_zero") {
            assert_eq!(record.test.status, lymbo_core::plan::Status::Passed);
        }
        if record.test.name.contains("type_passed") {
            assert_eq!(record.test.status, lymbo_core::plan::Status::Passed);
        }
        if record.test.name.contains("exception_failed") {
            assert_eq!(record.test.status, lymbo_core::plan::Status::Failed);
        }
    }
}

// S3 — Scope sharing: ten tests acquire the same broker-managed resource.
static S3_SETUP_CALLS: AtomicUsize = AtomicUsize::new(0);

fn s3_body(_: &[Value], _: &BTreeMap<String, Value>) -> TestOutcome {
    S3_SETUP_CALLS.fetch_add(1, Ordering::SeqCst);
    Ok(Value::Unit)
}

#[test]
fn test_s3_scope_sharing_runs_factory_once_across_ten_tests() {
    use lymbo_core::broker::ResourceBroker;
    use lymbo_core::identity::ScopeKind;
    use lymbo_core::plan::{Candidate, TestItem, TestPlan};

    let location = lymbo_core::identity::Location::new("tests/seed.py", None, "shared");
    let candidate = Candidate {
        module_key: location.module_key(),
        class_key: location.class_key(),
        function_key: location.function_key(),
    };
    let items: Vec<_> = (0..10)
        .map(|_| {
            (
                TestItem::new(location.clone(), false, Arc::new(s3_body), Vec::new(), BTreeMap::new(), None),
                candidate.clone(),
            )
        })
        .collect();
    let plan = TestPlan::build(items, GroupBy::None);

    let registry = Arc::new(lymbo_core::scope::ScopeRegistry::build(&plan));
    let broker = Arc::new(ResourceBroker::spawn(Arc::clone(&registry)));

    let factory_calls = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = plan
        .groups
        .iter()
        .flat_map(|g| g.items.iter())
        .map(|item| {
            let broker = Arc::clone(&broker);
            let factory_calls = Arc::clone(&factory_calls);
            let scopes_map = item.scopes_map();
            std::thread::spawn(move || {
                let module_key = scopes_map
                    .iter()
                    .find(|(kind, _)| *kind == ScopeKind::Module)
                    .unwrap()
                    .1
                    .clone();
                let (result, _) = broker.acquire(&module_key, ScopeKind::Module, "seed.shared_resource.()", Box::new(move |_| {
                    factory_calls.fetch_add(1, Ordering::SeqCst);
                    (Ok(Value::Int(1)), None)
                }));
                result.unwrap()
            })
        })
        .collect();

    for handle in handles {
        let value = handle.join().unwrap();
        assert_eq!(value, Value::Int(1));
    }

    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
    Arc::try_unwrap(broker).ok().unwrap().shutdown(std::time::Duration::from_secs(30));
}

// S4 — Scope hierarchy violation: a test that opens scope_function and
// then tries scope_session ends up BROKEN with the hierarchy message,
// driven end to end through the real collect -> run pipeline (not a
// hand-constructed error).
fn s4_body(_: &[Value], _: &BTreeMap<String, Value>) -> TestOutcome {
    let _function_guard =
        lymbo_core::broker::scope_function("s4.fn.()", Box::new(|_| (Ok(Value::Unit), None)))?;
    let guard = lymbo_core::broker::scope_session("s4.global.()", Box::new(|_| (Ok(Value::Unit), None)))?;
    Ok(Value::clone(&guard))
}

static S4_HIERARCHY_VIOLATION: CandidateTest = CandidateTest {
    path: "tests/seed.py",
    class: None,
    function: "hierarchy_violation",
    asynchronous: false,
    positional: Vec::new,
    keyword: Vec::new,
    expected: || None,
    body: || body(s4_body),
};
inventory::submit!(S4_HIERARCHY_VIOLATION);

#[test]
fn test_s4_scope_hierarchy_violation_breaks_the_test() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ReportStore::open(dir.path()).unwrap());

    let plan = collector::collect(
        &StaticTestSource,
        GroupBy::None,
        Some(&lymbo_core::filter::Expr::parse("hierarchy_violation").unwrap()),
    );
    assert_eq!(plan.len(), 1);

    let report = lymbo_core::controller::run(&plan, store.clone(), 1, |_| {});
    assert_eq!(report.stats.broken, 1);

    let record = store
        .read_all()
        .unwrap()
        .into_iter()
        .find(|r| r.test.name.contains("hierarchy_violation"))
        .unwrap();
    assert_eq!(record.test.status, lymbo_core::plan::Status::Broken);
    let error = record.test.error.unwrap();
    assert!(error.reason.contains("can't share a resource with the scope"));
}

// S6 — Filter.
#[test]
fn test_s6_filter_selects_expected_subset() {
    let expr = lymbo_core::filter::Expr::parse("second and not ((p=4) or (p=5))").unwrap();

    let names = [
        "t.py::second(p=1)",
        "t.py::second(p=2)",
        "t.py::second(p=3)",
        "t.py::second(p=4)",
        "t.py::second(p=5)",
        "t.py::first(p=1)",
        "t.py::first(p=2)",
        "t.py::first(p=3)",
        "t.py::first(p=4)",
        "t.py::first(p=5)",
        "t.py::third(p=1)",
    ];
    assert_eq!(names.len(), 11);

    let matched: Vec<_> = names.iter().filter(|n| expr.matches(n)).collect();
    assert_eq!(matched.len(), 3);

    assert!(lymbo_core::filter::Expr::parse("second )").is_err());
}
