//! Storage aggregate: everything recorded during one replay session.
//!
//! [`AgentStorage`] owns the result records, task records, and the set
//! of notified result identifiers observed by the mock control-plane
//! service. One instance is constructed per session, handed by
//! reference into the RPC handler layer for the duration of the run,
//! then read (never mutated) by the diff engine.
//!
//! Storage only grows during a session; there is no removal operation.
//! All mutating operations are safe under concurrent invocation from
//! independent handler tasks: each operation is an atomic insert or
//! set-union keyed by a freshly generated identifier.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use replay_core::TaskOptions;

/// Status of a recorded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    /// Result object exists; the mock service only ever produces this.
    Created,
    /// Result data is complete.
    Completed,
}

/// One result object known to the mock service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Service-assigned identifier, unique within the session.
    pub result_id: String,

    /// Human-readable name given by the caller.
    pub name: String,

    /// Result status.
    pub status: ResultStatus,

    /// Owning session.
    pub session_id: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Raw data; absent when the result was created via metadata-only.
    pub data: Option<Vec<u8>>,
}

/// One derived task submitted during replay. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Service-assigned identifier, unique within the session.
    pub task_id: String,

    /// Identifier of the task's payload blob.
    pub payload_id: String,

    /// Data-dependency identifiers, in submission order.
    pub data_dependencies: Vec<String>,

    /// Expected-output identifiers, in submission order.
    pub expected_output_keys: Vec<String>,

    /// Options the task was submitted with, preserved as passed.
    pub task_options: Option<TaskOptions>,
}

/// Concurrent storage for one replay session.
#[derive(Debug, Default)]
pub struct AgentStorage {
    results: RwLock<HashMap<String, ResultRecord>>,
    tasks: RwLock<HashMap<String, TaskRecord>>,
    notified: RwLock<HashSet<String>>,
}

impl AgentStorage {
    /// Creates empty storage for a fresh session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a result record unconditionally.
    ///
    /// Returns the displaced record if the identifier already existed.
    /// Identifiers are freshly generated per insertion, so a displaced
    /// record indicates an identifier-generation defect; callers surface
    /// it loudly rather than ignoring it.
    pub fn insert_result(&self, record: ResultRecord) -> Option<ResultRecord> {
        let mut results = self.results.write().expect("lock poisoned");
        results.insert(record.result_id.clone(), record)
    }

    /// Inserts a result record only if its identifier is not already
    /// present. Returns `true` if the record was inserted.
    ///
    /// With fresh identifier generation the guard never fires; the
    /// conditional semantics are preserved deliberately for the
    /// metadata-only creation path.
    pub fn insert_result_if_absent(&self, record: ResultRecord) -> bool {
        let mut results = self.results.write().expect("lock poisoned");
        match results.entry(record.result_id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            },
        }
    }

    /// Inserts a task record.
    pub fn insert_task(&self, record: TaskRecord) {
        let mut tasks = self.tasks.write().expect("lock poisoned");
        tasks.insert(record.task_id.clone(), record);
    }

    /// Adds a result identifier to the notified set. Idempotent: adding
    /// the same identifier twice has no additional effect. Returns
    /// `true` if the identifier was newly added.
    pub fn add_notified(&self, result_id: impl Into<String>) -> bool {
        let mut notified = self.notified.write().expect("lock poisoned");
        notified.insert(result_id.into())
    }

    /// Number of result records held.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.results.read().expect("lock poisoned").len()
    }

    /// Number of task records held.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.read().expect("lock poisoned").len()
    }

    /// Number of notified result identifiers.
    #[must_use]
    pub fn notified_count(&self) -> usize {
        self.notified.read().expect("lock poisoned").len()
    }

    /// Point-in-time copy of all result records.
    #[must_use]
    pub fn all_results(&self) -> Vec<ResultRecord> {
        let results = self.results.read().expect("lock poisoned");
        results.values().cloned().collect()
    }

    /// Point-in-time copy of all task records.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<TaskRecord> {
        let tasks = self.tasks.read().expect("lock poisoned");
        tasks.values().cloned().collect()
    }

    /// Point-in-time copy of the notified identifier set.
    #[must_use]
    pub fn notified_ids(&self) -> BTreeSet<String> {
        let notified = self.notified.read().expect("lock poisoned");
        notified.iter().cloned().collect()
    }

    /// Produces an ordered, serializable snapshot of the whole
    /// aggregate. Taken after the service has stopped, so it is the
    /// session's stable output; the ordering makes serialization
    /// deterministic.
    #[must_use]
    pub fn snapshot(&self) -> StorageSnapshot {
        let results = self.results.read().expect("lock poisoned");
        let tasks = self.tasks.read().expect("lock poisoned");
        let notified = self.notified.read().expect("lock poisoned");
        StorageSnapshot {
            results: results
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
            tasks: tasks
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect(),
            notified: notified.iter().cloned().collect(),
        }
    }
}

/// Ordered, serializable view of an [`AgentStorage`] at session end.
///
/// The field-level iteration contract (identifier to record) is stable,
/// so an external collaborator can serialize a snapshot for later
/// re-diffing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    /// Result records keyed by result identifier.
    pub results: BTreeMap<String, ResultRecord>,

    /// Task records keyed by task identifier.
    pub tasks: BTreeMap<String, TaskRecord>,

    /// Notified result identifiers.
    pub notified: BTreeSet<String>,
}

impl StorageSnapshot {
    /// Returns `true` if nothing was recorded during the session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.tasks.is_empty() && self.notified.is_empty()
    }
}
