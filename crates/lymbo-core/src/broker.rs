//! Resource broker (component G).
//!
//! A single background thread that performs every resource setup, reached
//! through a FIFO request queue, so setup work is serialized exactly once
//! per resource no matter how many worker threads race to borrow it.
//! Grounded on `lymbo/resource_manager.py`'s `manage_resources` loop and
//! `_cm_by_scope`'s election, re-expressed over a thread pool: a
//! `crossbeam-channel` queue stands in for the `multiprocessing.Queue`, and
//! [`ScopeBucket::entry`]'s insert-based election replaces the
//! `SyncManager` dict check (§1, §4.7).

use std::cell::RefCell;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::error::{AcquireError, ScopeError, SetupError};
use crate::identity::ScopeKind;
use crate::model::Value;
use crate::scope::{ResourceEntry, ScopeRegistry, SlotResult, Teardown};

/// A resource factory: runs once, writes any diagnostic output it produces
/// to the given writer (captured and relayed into the borrowing test's
/// output per §4.7 "Borrow"), and returns its outcome plus an optional
/// teardown action.
pub type Factory = Box<dyn FnOnce(&mut dyn std::io::Write) -> (SlotResult, Option<Teardown>) + Send>;

/// One request to create a resource, submitted by a borrowing thread that
/// won the [`ScopeBucket::entry`] election.
struct Request {
    entry: Arc<ResourceEntry>,
    factory: Factory,
}

/// Per-thread tracking of the deepest scope already borrowed, used to
/// enforce the hierarchy rule (§4.7 "Hierarchy rule", §3 "Invariants" 5):
/// a test can't request a strictly shallower scope while holding a deeper
/// one (re-requesting the same depth, or a deeper one, is fine —
/// `resource_manager.py`'s per-level checks only reject a request for a
/// scope shallower than the one already active).
thread_local! {
    static ACTIVE_MAX_SCOPE: std::cell::Cell<Option<ScopeKind>> = const { std::cell::Cell::new(None) };
}

/// Checks the hierarchy rule for `kind` against this thread's currently
/// active scope and, if it holds, pushes `kind` as the new active scope.
/// Returns the previous value, to be restored later by [`pop_scope`] when
/// the resulting [`ScopeGuard`] drops.
fn check_and_push_scope(kind: ScopeKind) -> Result<Option<ScopeKind>, ScopeError> {
    let previous = ACTIVE_MAX_SCOPE.with(|cell| cell.get());

    if let Some(active) = previous {
        if active > kind {
            return Err(ScopeError::Hierarchy { requested: kind, active });
        }
    }

    ACTIVE_MAX_SCOPE.with(|cell| cell.set(Some(kind)));
    Ok(previous)
}

/// Restores the thread's active scope to `previous`, undoing a prior
/// [`check_and_push_scope`].
fn pop_scope(previous: Option<ScopeKind>) {
    ACTIVE_MAX_SCOPE.with(|cell| cell.set(previous));
}

/// Owns the scope registry and the single setup-request queue.
pub struct ResourceBroker {
    registry: Arc<ScopeRegistry>,
    sender: Sender<Request>,
    worker: Option<JoinHandle<()>>,
}

impl ResourceBroker {
    /// Spawns the broker's background thread and returns a handle to it.
    pub fn spawn(registry: Arc<ScopeRegistry>) -> Self {
        let (sender, receiver): (Sender<Request>, Receiver<Request>) = crossbeam_channel::unbounded();

        let worker = std::thread::Builder::new()
            .name("lymbo-resource-broker".into())
            .spawn(move || Self::run(receiver))
            .expect("failed to spawn resource broker thread");

        Self {
            registry,
            sender,
            worker: Some(worker),
        }
    }

    fn run(receiver: Receiver<Request>) {
        for request in receiver {
            let mut output = Vec::new();
            let (result, teardown) = (request.factory)(&mut output);
            let output = String::from_utf8_lossy(&output).into_owned();

            if let Err(err) = &result {
                debug!(error = %err, "resource setup failed");
            }

            request.entry.fulfill(result, output, teardown);
        }
    }

    /// Borrows a resource at the given scope, running `factory` exactly
    /// once no matter how many threads call this with the same
    /// `resource_id` concurrently (§4.7 "Setup" + "Borrow").
    ///
    /// Returns the factory's outcome alongside any diagnostic output it
    /// captured — unconditionally, whether setup succeeded or failed, so a
    /// caller can relay it into the borrowing test's captured output before
    /// re-raising the error. The scope hierarchy rule is the ambient
    /// layer's concern ([`acquire_scoped`]), not this method's: it only
    /// elects and runs the factory.
    pub fn acquire(
        &self,
        scope_key: &str,
        kind: ScopeKind,
        resource_id: &str,
        factory: Factory,
    ) -> (Result<Value, AcquireError>, String) {
        debug!(scope = %scope_key, %kind, resource = %resource_id, "acquiring resource");

        let bucket = self
            .registry
            .get(scope_key)
            .unwrap_or_else(|| panic!("scope key {scope_key:?} missing from registry"));

        let (entry, is_new) = bucket.entry(resource_id);
        if is_new {
            self.sender
                .send(Request {
                    entry: Arc::clone(&entry),
                    factory,
                })
                .expect("resource broker thread is alive for the duration of the run");
        }

        let (result, captured) = entry.wait();
        match result {
            Ok(value) => (Ok(value), captured),
            Err(setup_err) => (Err(AcquireError::Setup(setup_err)), captured),
        }
    }

    /// Tears down every resource in scopes whose use-count just reached
    /// zero, logging (never failing) on teardown errors, matching
    /// `teardown_resources`'s `try`/`except` wrapping each resource.
    pub fn teardown(&self, drained: Vec<(String, Arc<crate::scope::ScopeBucket>)>) {
        for (scope_key, bucket) in drained {
            for (resource_id, entry) in bucket.drain_resources() {
                let Some(teardown) = entry.take_teardown() else {
                    continue;
                };
                let mut output = Vec::new();
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    teardown(&mut output)
                }));
                if outcome.is_err() {
                    warn!(scope = %scope_key, resource = %resource_id, "resource teardown panicked");
                }
            }
        }
    }

    /// Shuts the broker down, waiting up to `budget` for its background
    /// thread to drain its queue and join. The budget is hard (§4.9 step 5,
    /// §5 "Cancellation & timeouts"): a stuck broker thread is abandoned to
    /// a detached watchdog thread instead of blocking this call forever, so
    /// the caller can proceed to exit either way. Returns whether the join
    /// completed within `budget`.
    pub fn shutdown(mut self, budget: Duration) -> bool {
        drop(self.sender.clone());
        let Some(worker) = self.worker.take() else {
            return true;
        };

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("lymbo-broker-shutdown-watchdog".into())
            .spawn(move || {
                let _ = worker.join();
                let _ = done_tx.send(());
            })
            .expect("failed to spawn broker shutdown watchdog thread");

        done_rx.recv_timeout(budget).is_ok()
    }
}

impl Drop for ResourceBroker {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Wraps a [`SetupError`] message as a standalone helper for factories that
/// want to report setup failure without constructing the struct directly.
pub fn setup_failed(message: impl Into<String>) -> SetupError {
    SetupError { message: message.into() }
}

/// The running test's ambient access to the broker, used by
/// `scope_session`/`scope_module`/`scope_class`/`scope_function` so a test
/// body can borrow a scoped resource without threading the broker through
/// every call (§6 "Test declaration surface": `scope_{...}(factory, *args,
/// **kwargs)`). Set around a test body's call by [`with_test_context`],
/// never outside it — there is no ambient context on the broker's own
/// thread, so a factory can't nest a `scope_*` call inside its own setup.
struct TestContext {
    broker: Arc<ResourceBroker>,
    scopes: Vec<(ScopeKind, String)>,
    captured_output: Arc<Mutex<String>>,
}

thread_local! {
    static ACTIVE_CONTEXT: RefCell<Option<TestContext>> = const { RefCell::new(None) };
}

/// Runs `body` (a test's registered call) with ambient `scope_*` access
/// bound to `scopes`, the keys the running [`TestItem`][crate::plan::TestItem]
/// maps onto (§4.6). Any setup output surfaced by a resource the body
/// acquires is appended to `captured_output`, so the caller can fold it
/// into the test's own captured output (§4.7 "Borrow").
pub fn with_test_context<T>(
    broker: Arc<ResourceBroker>,
    scopes: Vec<(ScopeKind, String)>,
    captured_output: Arc<Mutex<String>>,
    body: impl FnOnce() -> T,
) -> T {
    ACTIVE_CONTEXT.with(|cell| {
        *cell.borrow_mut() = Some(TestContext { broker, scopes, captured_output });
    });
    let result = body();
    ACTIVE_CONTEXT.with(|cell| cell.borrow_mut().take());
    result
}

/// An RAII handle on a scoped resource borrow (§4.7), returned by
/// `scope_session`/`scope_module`/`scope_class`/`scope_function`. This is
/// the Rust-native stand-in for the lifetime of a Python `with ... as
/// value:` block: for as long as the guard is alive, this thread's active
/// scope still reflects the kind it borrowed, so a `scope_*` call nested
/// inside the same lexical block correctly sees a still-active outer scope
/// (§3 "Invariants" 5 / §4.7 "Hierarchy rule"). Dropping the guard — at the
/// end of its block, or explicitly via `drop(guard)` — restores the
/// thread's previous active scope.
pub struct ScopeGuard {
    value: Value,
    previous: Option<ScopeKind>,
}

impl std::ops::Deref for ScopeGuard {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.value
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        pop_scope(self.previous);
    }
}

/// Looks up the running test's scope key for `kind`, pushes `kind` as this
/// thread's active scope (§4.7 "Hierarchy rule"), and acquires
/// `resource_id` through the ambient broker, folding any setup output into
/// the test's captured output unconditionally — before the hierarchy push
/// is unwound on the error path, and before a setup failure is re-raised
/// (§4 "Supplemented features": relay happens unconditionally, success or
/// failure).
///
/// # Errors
/// Returns [`AcquireError::Scope(ScopeError::Nesting)`](ScopeError::Nesting)
/// if called from inside a resource factory (the broker's own thread has
/// no ambient test context), or [`AcquireError::Scope(ScopeError::Hierarchy)`](ScopeError::Hierarchy)
/// if the hierarchy rule is violated.
///
/// # Panics
/// Panics if the running test has no scope of the requested `kind` (a
/// method-less test has no [`ScopeKind::Class`] bucket, for instance) —
/// an authoring mistake, not a runtime condition a test should recover
/// from.
fn acquire_scoped(kind: ScopeKind, resource_id: &str, factory: Factory) -> Result<ScopeGuard, AcquireError> {
    let found = ACTIVE_CONTEXT.with(|cell| {
        let ctx = cell.borrow();
        ctx.as_ref().map(|ctx| {
            let key = ctx
                .scopes
                .iter()
                .find(|(k, _)| *k == kind)
                .unwrap_or_else(|| panic!("the running test has no {kind} scope"))
                .1
                .clone();
            (Arc::clone(&ctx.broker), key, Arc::clone(&ctx.captured_output))
        })
    });

    let Some((broker, key, captured_output)) = found else {
        return Err(AcquireError::Scope(ScopeError::Nesting));
    };

    let previous = check_and_push_scope(kind)?;

    let (result, output) = broker.acquire(&key, kind, resource_id, factory);
    if !output.is_empty() {
        captured_output
            .lock()
            .expect("captured-output mutex poisoned")
            .push_str(&output);
    }

    match result {
        Ok(value) => Ok(ScopeGuard { value, previous }),
        Err(err) => {
            pop_scope(previous);
            Err(err)
        }
    }
}

/// Acquires a run-wide (`session`) scoped resource (§4.7).
pub fn scope_session(resource_id: &str, factory: Factory) -> Result<ScopeGuard, AcquireError> {
    acquire_scoped(ScopeKind::Session, resource_id, factory)
}

/// Acquires a module-scoped resource, shared by every test in the same
/// source file (§4.7).
pub fn scope_module(resource_id: &str, factory: Factory) -> Result<ScopeGuard, AcquireError> {
    acquire_scoped(ScopeKind::Module, resource_id, factory)
}

/// Acquires a class-scoped resource, shared by every test method on the
/// same class (§4.7).
pub fn scope_class(resource_id: &str, factory: Factory) -> Result<ScopeGuard, AcquireError> {
    acquire_scoped(ScopeKind::Class, resource_id, factory)
}

/// Acquires a function-scoped resource, private to the running test (§4.7).
pub fn scope_function(resource_id: &str, factory: Factory) -> Result<ScopeGuard, AcquireError> {
    acquire_scoped(ScopeKind::Function, resource_id, factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Candidate, GroupBy, TestItem};
    use std::collections::BTreeMap;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry_with_one_module_scope() -> Arc<ScopeRegistry> {
        registry_for(crate::identity::Location::new("a.py", None, "f"))
    }

    /// A registry built from a single test item at `location`, with a
    /// bucket for every scope kind `location` participates in.
    fn registry_for(location: crate::identity::Location) -> Arc<ScopeRegistry> {
        let candidate = Candidate {
            module_key: location.module_key(),
            class_key: location.class_key(),
            function_key: location.function_key(),
        };
        let body: crate::model::TestBody = Arc::new(|_, _, _| Ok(Value::Unit));
        let item = TestItem::new(location, false, body, Vec::new(), BTreeMap::new(), None);
        let plan = crate::plan::TestPlan::build(vec![(item, candidate)], GroupBy::None);
        Arc::new(ScopeRegistry::build(&plan))
    }

    #[test]
    fn test_concurrent_acquire_runs_factory_once() {
        let registry = registry_with_one_module_scope();
        let broker = Arc::new(ResourceBroker::spawn(Arc::clone(&registry)));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let broker = Arc::clone(&broker);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    let calls = Arc::clone(&calls);
                    let (result, output) = broker.acquire(
                        "a.py",
                        ScopeKind::Module,
                        "db.conn.()",
                        Box::new(move |w| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            write!(w, "connecting").unwrap();
                            (Ok(Value::Int(7)), None)
                        }),
                    );
                    (result.unwrap(), output)
                })
            })
            .collect();

        for handle in handles {
            let (value, output) = handle.join().unwrap();
            assert_eq!(value, Value::Int(7));
            assert_eq!(output, "connecting");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_setup_failure_propagates_to_every_waiter() {
        let registry = registry_with_one_module_scope();
        let broker = ResourceBroker::spawn(registry);

        let (result, _) = broker.acquire(
            "a.py",
            ScopeKind::Module,
            "db.conn.()",
            Box::new(|_| (Err(setup_failed("boom")), None)),
        );

        assert!(matches!(result, Err(AcquireError::Setup(_))));
    }

    #[test]
    fn test_setup_failure_output_is_relayed_before_error_propagates() {
        // §4: the captured output is still relayed before the error is
        // re-raised, success or failure.
        let registry = registry_with_one_module_scope();
        let broker = ResourceBroker::spawn(registry);

        let (result, output) = broker.acquire(
            "a.py",
            ScopeKind::Module,
            "db.conn.()",
            Box::new(|w| {
                write!(w, "connecting...").unwrap();
                (Err(setup_failed("boom")), None)
            }),
        );

        assert!(matches!(result, Err(AcquireError::Setup(_))));
        assert_eq!(output, "connecting...");
    }

    #[test]
    fn test_shutdown_abandons_stuck_broker_within_budget() {
        // §4.9 step 5 / §5: the 30s drain budget is hard — a broker thread
        // wedged on a slow factory must not block the caller forever.
        let registry = registry_with_one_module_scope();
        let broker = ResourceBroker::spawn(registry);

        let bucket = broker.registry.get("a.py").unwrap();
        let (entry, _is_new) = bucket.entry("stuck.()");
        broker
            .sender
            .send(Request {
                entry: Arc::clone(&entry),
                factory: Box::new(|_| {
                    std::thread::sleep(std::time::Duration::from_secs(5));
                    (Ok(Value::Unit), None)
                }),
            })
            .unwrap();

        let start = std::time::Instant::now();
        let joined = broker.shutdown(std::time::Duration::from_millis(50));
        assert!(!joined);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_scope_function_acquires_through_ambient_context() {
        let registry = registry_with_one_module_scope();
        let broker = Arc::new(ResourceBroker::spawn(registry));
        let captured = Arc::new(Mutex::new(String::new()));

        let value = with_test_context(
            Arc::clone(&broker),
            vec![(ScopeKind::Module, "a.py".to_owned())],
            Arc::clone(&captured),
            || {
                scope_module(
                    "db.conn.()",
                    Box::new(|w| {
                        write!(w, "connecting").unwrap();
                        (Ok(Value::Int(7)), None)
                    }),
                )
            },
        );

        assert_eq!(*value.unwrap(), Value::Int(7));
        assert_eq!(*captured.lock().unwrap(), "connecting");
    }

    #[test]
    fn test_scope_call_outside_test_context_returns_nesting_error() {
        // A factory running on the broker's own thread has no ambient test
        // context; calling scope_* from inside one must not panic the
        // broker thread, since that would wedge every later waiter.
        let result = scope_session("whatever", Box::new(|_| (Ok(Value::Unit), None)));
        assert!(matches!(result, Err(AcquireError::Scope(ScopeError::Nesting))));
    }

    /// An end-to-end hierarchy test driven entirely through the public
    /// `scope_*` guard API and a real `with_test_context` binding — not a
    /// hand-constructed error — grounded on
    /// `resource_nested.py`'s `scope_nested_hierarchy`/
    /// `scope_nested_forbidden_*` fixtures: re-nesting the same scope kind
    /// (or a deeper one) while a guard is held succeeds, and requesting a
    /// strictly shallower one fails.
    #[test]
    fn test_nested_scope_guards_enforce_hierarchy_end_to_end() {
        let location = crate::identity::Location::new("a.py", Some("Calc".to_owned()), "f");
        let registry = registry_for(location.clone());
        let broker = Arc::new(ResourceBroker::spawn(registry));
        let captured = Arc::new(Mutex::new(String::new()));

        let scopes = location.scopes_map();
        let outcome = with_test_context(Arc::clone(&broker), scopes, Arc::clone(&captured), || {
            let _class_guard = scope_class("conn.()", Box::new(|_| (Ok(Value::Int(1)), None))).unwrap();

            // Re-nesting the same depth while the class guard is held
            // succeeds (scope_nested_hierarchy nests the same kind twice).
            let _inner_class_guard =
                scope_class("other.()", Box::new(|_| (Ok(Value::Int(2)), None))).unwrap();

            // A deeper scope while a shallower one is held succeeds too.
            let _function_guard =
                scope_function("temp.()", Box::new(|_| (Ok(Value::Int(3)), None))).unwrap();

            // A strictly shallower scope while the function guard is still
            // held is rejected (scope_nested_forbidden_module_in_function).
            scope_module("db.()", Box::new(|_| (Ok(Value::Int(4)), None)))
        });

        assert!(matches!(
            outcome,
            Err(AcquireError::Scope(ScopeError::Hierarchy { requested: ScopeKind::Module, active: ScopeKind::Function }))
        ));
    }
}
