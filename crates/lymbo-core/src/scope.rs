//! Scope registry (component F).
//!
//! One [`ScopeBucket`] per scope key found in a [`TestPlan`], each holding
//! the write-once resource slots shared by every test that references it,
//! plus the use-count that drives teardown. Grounded on
//! `lymbo/resource_manager.py`'s `new_scope`/`prepare_scopes`/`unset_scope`,
//! re-expressed with `Mutex`+`Condvar` in place of a `multiprocessing`
//! `SyncManager` dict, since a thread pool shares memory directly (§1).

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::SetupError;
use crate::identity::ScopeKind;
use crate::model::Value;
use crate::plan::TestPlan;

/// The outcome stored in a resource slot once setup has run.
pub type SlotResult = Result<Value, SetupError>;

/// A resource's teardown action, run once its scope's use-count reaches
/// zero (§4.7 "Teardown"). Takes a writer so any output it produces is
/// captured the same way setup output is.
pub type Teardown = Box<dyn FnOnce(&mut dyn std::io::Write) + Send>;

/// One resource's write-once slot: `None` while setup is in progress or not
/// yet started, `Some` once the electing caller has run the factory.
struct Slot {
    result: Mutex<Option<SlotResult>>,
    output: Mutex<String>,
    teardown: Mutex<Option<Teardown>>,
    ready: Condvar,
}

impl Slot {
    fn pending() -> Self {
        Self {
            result: Mutex::new(None),
            output: Mutex::new(String::new()),
            teardown: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

/// A single resource's shared slot, identified by `{module}.{factory}.{args}`
/// (§4.7 "unique_cm_id").
pub struct ResourceEntry {
    slot: Slot,
}

impl ResourceEntry {
    fn new() -> Self {
        Self { slot: Slot::pending() }
    }

    /// Fulfils this slot with a factory's outcome, any captured output, and
    /// the teardown action to run later, waking every thread blocked in
    /// [`Self::wait`].
    pub fn fulfill(&self, result: SlotResult, output: String, teardown: Option<Teardown>) {
        let mut guard = self.slot.result.lock().expect("slot mutex poisoned");
        *self.slot.output.lock().expect("slot mutex poisoned") = output;
        *self.slot.teardown.lock().expect("slot mutex poisoned") = teardown;
        *guard = Some(result);
        self.slot.ready.notify_all();
    }

    /// Blocks until this slot has been fulfilled, then returns a clone of
    /// the stored outcome plus any captured setup output (§4.7 "Borrow":
    /// "by printing the output here, it will be added to the test output").
    pub fn wait(&self) -> (SlotResult, String) {
        let guard = self.slot.result.lock().expect("slot mutex poisoned");
        let guard = self
            .slot
            .ready
            .wait_while(guard, |result| result.is_none())
            .expect("slot mutex poisoned");
        let result = guard.clone().expect("wait_while guarantees Some");
        let output = self.slot.output.lock().expect("slot mutex poisoned").clone();
        (result, output)
    }

    /// Takes the teardown action out of this slot, if setup completed
    /// successfully and registered one.
    pub fn take_teardown(&self) -> Option<Teardown> {
        self.slot.teardown.lock().expect("slot mutex poisoned").take()
    }
}

/// One scope's bucket: its remaining use-count and the resources created
/// within it, keyed by resource id.
pub struct ScopeBucket {
    /// The kind of scope this bucket represents.
    pub kind: ScopeKind,

    count: Mutex<usize>,
    resources: Mutex<HashMap<String, Arc<ResourceEntry>>>,
}

impl ScopeBucket {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            count: Mutex::new(0),
            resources: Mutex::new(HashMap::new()),
        }
    }

    /// Finds or creates the entry for `resource_id`, returning whether this
    /// call is the one that created it (§4.7 "Setup" election: "the lock is
    /// only to flag the resource creation").
    pub fn entry(&self, resource_id: &str) -> (Arc<ResourceEntry>, bool) {
        let mut resources = self.resources.lock().expect("resources mutex poisoned");
        if let Some(entry) = resources.get(resource_id) {
            (Arc::clone(entry), false)
        } else {
            let entry = Arc::new(ResourceEntry::new());
            resources.insert(resource_id.to_owned(), Arc::clone(&entry));
            (entry, true)
        }
    }

    /// Decrements this bucket's use-count, returning the new value. A
    /// return of `0` means every test referencing this scope has finished
    /// and its resources are eligible for teardown (§4.7 "Teardown").
    pub fn release(&self) -> usize {
        let mut count = self.count.lock().expect("count mutex poisoned");
        *count = count.saturating_sub(1);
        *count
    }

    /// Drains every resource entry created in this bucket, for teardown.
    pub fn drain_resources(&self) -> Vec<(String, Arc<ResourceEntry>)> {
        self.resources
            .lock()
            .expect("resources mutex poisoned")
            .drain()
            .collect()
    }
}

/// The set of all scope buckets referenced by a [`TestPlan`] (§4.6).
pub struct ScopeRegistry {
    buckets: HashMap<String, Arc<ScopeBucket>>,
}

impl ScopeRegistry {
    /// Builds a registry from a plan: one bucket per distinct scope key, its
    /// use-count equal to the number of tests that reference it. Grounded
    /// on `prepare_scopes`'s double loop over `test_plan`/`test.scopes`.
    pub fn build(plan: &TestPlan) -> Self {
        let mut buckets: HashMap<String, Arc<ScopeBucket>> = HashMap::new();

        for group in &plan.groups {
            for item in &group.items {
                for (kind, key) in item.scopes_map() {
                    let bucket = buckets
                        .entry(key)
                        .or_insert_with(|| Arc::new(ScopeBucket::new(kind)));
                    *bucket.count.lock().expect("count mutex poisoned") += 1;
                }
            }
        }

        Self { buckets }
    }

    /// Looks up the bucket for a scope key.
    pub fn get(&self, scope_key: &str) -> Option<&Arc<ScopeBucket>> {
        self.buckets.get(scope_key)
    }

    /// Releases every scope a finished test participated in, returning the
    /// buckets whose count just reached zero — candidates for immediate
    /// teardown (§4.7 "Teardown"), matching `unset_scope` followed by the
    /// `count == 0` check in `teardown_resources`.
    pub fn release_for(&self, scopes_map: &[(ScopeKind, String)]) -> Vec<(String, Arc<ScopeBucket>)> {
        let mut drained = Vec::new();
        for (_, key) in scopes_map {
            if let Some(bucket) = self.buckets.get(key) {
                if bucket.release() == 0 {
                    drained.push((key.clone(), Arc::clone(bucket)));
                }
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Location;
    use crate::plan::{Candidate, GroupBy, TestItem};
    use std::collections::BTreeMap;

    fn noop_body() -> crate::model::TestBody {
        Arc::new(|_, _, _| Ok(Value::Unit))
    }

    fn plan_with(locations: Vec<(&str, Option<&str>, &str)>) -> TestPlan {
        let items = locations
            .into_iter()
            .map(|(path, class, function)| {
                let location = Location::new(path, class.map(str::to_owned), function);
                let candidate = Candidate {
                    module_key: location.module_key(),
                    class_key: location.class_key(),
                    function_key: location.function_key(),
                };
                (
                    TestItem::new(location, false, noop_body(), Vec::new(), BTreeMap::new(), None),
                    candidate,
                )
            })
            .collect();
        TestPlan::build(items, GroupBy::None)
    }

    #[test]
    fn test_build_counts_shared_module_scope() {
        let plan = plan_with(vec![("a.py", None, "f"), ("a.py", None, "g")]);
        let registry = ScopeRegistry::build(&plan);

        let module_bucket = registry.get("a.py").unwrap();
        assert_eq!(*module_bucket.count.lock().unwrap(), 2);

        // session scope is shared by every test.
        let session_bucket = registry.get("session").unwrap();
        assert_eq!(*session_bucket.count.lock().unwrap(), 2);
    }

    #[test]
    fn test_entry_election_only_first_caller_is_new() {
        let bucket = ScopeBucket::new(ScopeKind::Module);
        let (_first, first_is_new) = bucket.entry("db.Connection.()");
        let (_second, second_is_new) = bucket.entry("db.Connection.()");
        assert!(first_is_new);
        assert!(!second_is_new);
    }

    #[test]
    fn test_release_reaches_zero_once_all_tests_done() {
        let plan = plan_with(vec![("a.py", None, "f"), ("a.py", None, "g")]);
        let registry = ScopeRegistry::build(&plan);

        let scopes_map = vec![(ScopeKind::Module, "a.py".to_owned())];
        assert!(registry.release_for(&scopes_map).is_empty());
        let drained = registry.release_for(&scopes_map);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, "a.py");
    }

    #[test]
    fn test_wait_blocks_until_fulfilled() {
        let entry = ResourceEntry::new();
        let entry = Arc::new(entry);
        let worker = {
            let entry = Arc::clone(&entry);
            std::thread::spawn(move || entry.wait())
        };

        std::thread::sleep(std::time::Duration::from_millis(20));
        entry.fulfill(Ok(Value::Int(42)), "hello\n".to_owned(), None);

        let (result, output) = worker.join().unwrap();
        assert_eq!(result.unwrap(), Value::Int(42));
        assert_eq!(output, "hello\n");
    }
}
