//! Mock control-plane service: the four worker-facing operations.
//!
//! [`ControlPlane`] is the explicit interface the network layer binds
//! to; [`ReplayAgent`] is the recording implementation backed by a
//! shared [`AgentStorage`]. Each operation is stateless except for its
//! effect on storage, so one agent instance serves any number of
//! concurrent connections.
//!
//! The operations never fail: beyond transport problems (handled by the
//! server layer) there is no error path, and empty request lists yield
//! empty responses.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use replay_core::{ReplayError, TaskOptions};

use crate::storage::{AgentStorage, ResultRecord, ResultStatus, TaskRecord};

/// One result to create, with its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultCreation {
    /// Human-readable result name.
    pub name: String,
    /// Raw result data.
    pub data: Vec<u8>,
}

/// Metadata returned for each created result. Never carries data.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMeta {
    /// Service-assigned identifier.
    pub result_id: String,
    /// Echo of the creation's name.
    pub name: String,
    /// Owning session.
    pub session_id: String,
    /// Always [`ResultStatus::Created`] from this service.
    pub status: ResultStatus,
    /// Creation timestamp.
    pub created_at: chrono::DateTime<Utc>,
}

/// One derived task to submit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSubmission {
    /// Identifier of the task's payload blob.
    pub payload_id: String,
    /// Per-task options; the session default applies when unset.
    pub task_options: Option<TaskOptions>,
    /// Data-dependency identifiers, in order.
    pub data_dependencies: Vec<String>,
    /// Expected-output identifiers, in order.
    pub expected_output_keys: Vec<String>,
}

/// Information echoed back for one submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSubmitted {
    /// Service-assigned identifier.
    pub task_id: String,
    /// Echo of the submission's payload identifier.
    pub payload_id: String,
    /// Echo of the submission's data dependencies.
    pub data_dependencies: Vec<String>,
    /// Echo of the submission's expected outputs.
    pub expected_output_ids: Vec<String>,
}

/// The control-plane subset a worker needs during one task's execution.
///
/// The network-binding layer translates wire messages to and from these
/// in-memory structures; implementations stay transport-agnostic.
pub trait ControlPlane: Send + Sync {
    /// Creates results with data. Returns metadata per entry, in order.
    fn create_results(&self, session_id: &str, creations: Vec<ResultCreation>) -> Vec<ResultMeta>;

    /// Creates results without data. Returns metadata per entry, in
    /// order.
    fn create_results_metadata(&self, session_id: &str, names: Vec<String>) -> Vec<ResultMeta>;

    /// Records that result data is ready on disk. Returns the same
    /// identifiers as acknowledgment. Purely additive and idempotent;
    /// never fails for unknown identifiers.
    fn notify_result_data(&self, result_ids: Vec<String>) -> Vec<String>;

    /// Submits derived tasks. Returns the generated task identifiers
    /// with dependency and output lists echoed back, in order.
    fn submit_tasks(
        &self,
        session_id: &str,
        default_options: Option<TaskOptions>,
        submissions: Vec<TaskSubmission>,
    ) -> Vec<TaskSubmitted>;
}

/// Recording implementation of [`ControlPlane`].
///
/// Every call mutates the shared [`AgentStorage`] and returns a
/// response shaped like the real control plane's response. Identifiers
/// are generated fresh on every creation, never derived from caller
/// input, so two replay sessions cannot collide even for logically
/// identical results.
#[derive(Debug, Clone)]
pub struct ReplayAgent {
    storage: Arc<AgentStorage>,
}

impl ReplayAgent {
    /// Creates an agent recording into the given storage.
    #[must_use]
    pub fn new(storage: Arc<AgentStorage>) -> Self {
        Self { storage }
    }

    /// The storage this agent records into.
    #[must_use]
    pub fn storage(&self) -> &Arc<AgentStorage> {
        &self.storage
    }

    fn fresh_meta(session_id: &str, name: String) -> ResultMeta {
        ResultMeta {
            result_id: Uuid::new_v4().to_string(),
            name,
            session_id: session_id.to_string(),
            status: ResultStatus::Created,
            created_at: Utc::now(),
        }
    }
}

impl ControlPlane for ReplayAgent {
    fn create_results(&self, session_id: &str, creations: Vec<ResultCreation>) -> Vec<ResultMeta> {
        debug!(session_id, count = creations.len(), "CreateResults");
        creations
            .into_iter()
            .map(|creation| {
                let meta = Self::fresh_meta(session_id, creation.name);
                let displaced = self.storage.insert_result(ResultRecord {
                    result_id: meta.result_id.clone(),
                    name: meta.name.clone(),
                    status: meta.status,
                    session_id: meta.session_id.clone(),
                    created_at: meta.created_at,
                    data: Some(creation.data),
                });
                if displaced.is_some() {
                    // Fresh UUIDs cannot collide; reaching this line means
                    // identifier generation is broken.
                    error!(
                        "{}",
                        ReplayError::DuplicateResultId {
                            id: meta.result_id.clone(),
                        }
                    );
                }
                meta
            })
            .collect()
    }

    fn create_results_metadata(&self, session_id: &str, names: Vec<String>) -> Vec<ResultMeta> {
        debug!(session_id, count = names.len(), "CreateResultsMetaData");
        names
            .into_iter()
            .map(|name| {
                let meta = Self::fresh_meta(session_id, name);
                let inserted = self.storage.insert_result_if_absent(ResultRecord {
                    result_id: meta.result_id.clone(),
                    name: meta.name.clone(),
                    status: meta.status,
                    session_id: meta.session_id.clone(),
                    created_at: meta.created_at,
                    data: None,
                });
                if !inserted {
                    warn!(
                        result_id = %meta.result_id,
                        "metadata-only creation skipped an existing identifier"
                    );
                }
                meta
            })
            .collect()
    }

    fn notify_result_data(&self, result_ids: Vec<String>) -> Vec<String> {
        debug!(count = result_ids.len(), "NotifyResultData");
        for result_id in &result_ids {
            self.storage.add_notified(result_id.clone());
        }
        result_ids
    }

    fn submit_tasks(
        &self,
        session_id: &str,
        default_options: Option<TaskOptions>,
        submissions: Vec<TaskSubmission>,
    ) -> Vec<TaskSubmitted> {
        debug!(session_id, count = submissions.len(), "SubmitTasks");
        submissions
            .into_iter()
            .map(|submission| {
                let task_id = Uuid::new_v4().to_string();
                let options = submission.task_options.or_else(|| default_options.clone());
                self.storage.insert_task(TaskRecord {
                    task_id: task_id.clone(),
                    payload_id: submission.payload_id.clone(),
                    data_dependencies: submission.data_dependencies.clone(),
                    expected_output_keys: submission.expected_output_keys.clone(),
                    task_options: options,
                });
                TaskSubmitted {
                    task_id,
                    payload_id: submission.payload_id,
                    data_dependencies: submission.data_dependencies,
                    expected_output_ids: submission.expected_output_keys,
                }
            })
            .collect()
    }
}
