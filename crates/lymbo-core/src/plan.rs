//! Test-plan model (component E).
//!
//! Ordered groups of test instances, the grouping policy of §4.5, and the
//! rendering contract consumed by the (external) terminal renderer.
//! Grounded on `lymbo/item.py`'s `TestItem`/`TestPlan` and `lymbo/ui.py`'s
//! `show_test_plan`.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{self, Location, ScopeKind};
use crate::model::{Expected, TestBody, Value};

/// A test's runtime status (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Collected but not yet started.
    Pending,
    /// Currently executing.
    InProgress,
    /// Finished, no error, expected check (if any) satisfied.
    Passed,
    /// An assertion-kind failure or an expected-value mismatch.
    Failed,
    /// Any other error, or a harness failure.
    Broken,
    /// Excluded by a filter or explicit skip (reserved for future use).
    Skipped,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "PENDING",
            Status::InProgress => "INPROGRESS",
            Status::Passed => "PASSED",
            Status::Failed => "FAILED",
            Status::Broken => "BROKEN",
            Status::Skipped => "SKIPPED",
        };
        write!(f, "{s}")
    }
}

/// One concrete test invocation (§3 "TestItem").
#[derive(Debug, Clone)]
pub struct TestItem {
    /// Where this test is declared.
    pub location: Location,

    /// Whether the test body is asynchronous (§4.8 step 4).
    pub asynchronous: bool,

    /// The registered function that runs this test.
    pub body: TestBody,

    /// The resolved positional arguments for this invocation.
    pub positional: Vec<Value>,

    /// The resolved keyword arguments for this invocation.
    pub keyword: BTreeMap<String, Value>,

    /// The declared `expected(...)` assertion, if any.
    pub expected: Option<Expected>,

    /// This test's unique identifier (§3).
    pub uuid: String,

    /// Runtime fields, mutated only by the executor that owns this item.
    pub start_at: Option<DateTime<Utc>>,
    /// See [`TestItem::start_at`].
    pub end_at: Option<DateTime<Utc>>,
    /// Captured stdout/stderr.
    pub output: String,
    /// Current status.
    pub status: Status,
    /// A short human-readable reason for the current status.
    pub reason: String,
    /// The error message, one entry per line.
    pub error_message: Vec<String>,
    /// A best-effort traceback, one entry per line.
    pub traceback: Vec<String>,
}

impl TestItem {
    /// Creates a new, pending test item for the given declaration.
    pub fn new(
        location: Location,
        asynchronous: bool,
        body: TestBody,
        positional: Vec<Value>,
        keyword: BTreeMap<String, Value>,
        expected: Option<Expected>,
    ) -> Self {
        Self {
            uuid: identity::new_uuid(),
            location,
            asynchronous,
            body,
            positional,
            keyword,
            expected,
            start_at: None,
            end_at: None,
            output: String::new(),
            status: Status::Pending,
            reason: String::new(),
            error_message: Vec::new(),
            traceback: Vec::new(),
        }
    }

    /// This test's derived display name (§4.1).
    pub fn display_name(&self) -> String {
        identity::display_name(&self.location, &self.positional, &self.keyword)
    }

    /// This test's scopes map (§3 "Scopes map").
    pub fn scopes_map(&self) -> Vec<(ScopeKind, String)> {
        self.location.scopes_map()
    }
}

/// A non-empty, ordered sequence of [`TestItem`]s that must run
/// sequentially in one worker (§3 "TestPlan").
#[derive(Debug)]
pub struct Group {
    /// The tests belonging to this group, in declaration order.
    pub items: Vec<TestItem>,
}

impl Group {
    /// Creates a singleton group containing exactly one test.
    pub fn singleton(item: TestItem) -> Self {
        Self { items: vec![item] }
    }
}

/// The grouping policy controlling how [`TestPlan::build`] clusters tests
/// into [`Group`]s (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    /// Every parameter instance is its own singleton group.
    #[default]
    None,
    /// All instances sharing (path, class, function) form one group.
    Function,
    /// All tests declared in the same class form one group.
    Class,
    /// All tests declared in the same source file form one group.
    Module,
}

/// A candidate test as handed to the plan builder: a [`TestItem`] plus the
/// grouping keys derived from its declaration site.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The module (source path) this candidate belongs to.
    pub module_key: String,
    /// The class this candidate belongs to, if any.
    pub class_key: Option<String>,
    /// The (module, class, function) key, shared by every parameter
    /// instance of one declaration.
    pub function_key: String,
}

/// The ordered sequence of groups produced by collection (§3 "TestPlan").
#[derive(Debug, Default)]
pub struct TestPlan {
    /// The groups, in the order they should be considered for dispatch.
    pub groups: Vec<Group>,
}

impl TestPlan {
    /// Builds a plan from a flat list of `(item, candidate)` pairs and a
    /// grouping policy (§4.5).
    ///
    /// Items are first bucketed by the relevant grouping key while
    /// preserving first-seen order, then emitted as groups; a `FUNCTION`
    /// grouping with only one instance remains a singleton, matching
    /// `lymbo/collect.py`'s `len(tests) > 1` guard.
    pub fn build(items: Vec<(TestItem, Candidate)>, group_by: GroupBy) -> Self {
        let mut order: Vec<String> = Vec::new();
        let mut buckets: BTreeMap<String, Vec<TestItem>> = BTreeMap::new();

        for (item, candidate) in items {
            let key = match group_by {
                GroupBy::None => item.uuid.clone(),
                GroupBy::Function => candidate.function_key.clone(),
                GroupBy::Class => candidate
                    .class_key
                    .clone()
                    .unwrap_or_else(|| candidate.module_key.clone()),
                GroupBy::Module => candidate.module_key.clone(),
            };

            if !buckets.contains_key(&key) {
                order.push(key.clone());
            }
            buckets.entry(key).or_default().push(item);
        }

        let groups = order
            .into_iter()
            .map(|key| {
                let items = buckets.remove(&key).expect("key was just inserted above");
                Group { items }
            })
            .collect();

        TestPlan { groups }
    }

    /// The total number of test items across every group.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    /// Whether this plan has no tests at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the plan listing (§4.5 "Rendering"): one line per group
    /// marker, one indented line per test, matching `lymbo/ui.py`'s
    /// `show_test_plan`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn render_plan(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for group in &self.groups {
            let grouped = group.items.len() > 1;
            if grouped {
                lines.push(format!("+ group of {} tests", group.items.len()));
            }
            for item in &group.items {
                let marker = if grouped { " -" } else { "-" };
                lines.push(format!("{marker} {}", item.display_name()));
            }
        }
        lines
    }

    /// Renders the status-aggregated listing: like [`Self::render_plan`]
    /// but each line is annotated with `status` after refreshing it from
    /// `refresh`.
    #[tracing::instrument(level = "debug", skip(self, refresh))]
    pub fn render_status(&self, mut refresh: impl FnMut(&str) -> Status) -> Vec<String> {
        let mut lines = Vec::new();
        for group in &self.groups {
            let grouped = group.items.len() > 1;
            if grouped {
                lines.push(format!("+ group of {} tests", group.items.len()));
            }
            for item in &group.items {
                let marker = if grouped { " -" } else { "-" };
                let status = refresh(&item.uuid);
                lines.push(format!("{marker} [{status}] {}", item.display_name()));
            }
        }
        lines
    }
}
