//! Wire message types for the agent and worker protocols.
//!
//! These are hand-maintained prost structs (no protoc build step) for
//! the control-plane subset a worker needs during one task's execution,
//! plus the single worker-facing `Process` operation. Field numbering is
//! stable; new fields get fresh tags.
//!
//! The in-memory service layer does not consume these types directly:
//! the server adapter in [`crate::server`] translates them to and from
//! the [`crate::agent::ControlPlane`] request/response structures.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prost::Message;

// ============================================================================
// Shared option and configuration messages
// ============================================================================

/// Task options as carried on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct TaskOptions {
    /// Open extension map for non-promoted fields.
    #[prost(btree_map = "string, string", tag = "1")]
    pub options: BTreeMap<String, String>,

    /// Maximum wall-clock duration granted to the task.
    #[prost(message, optional, tag = "2")]
    pub max_duration: Option<prost_types::Duration>,

    /// Maximum number of retries.
    #[prost(int32, tag = "3")]
    pub max_retries: i32,

    /// Scheduling priority.
    #[prost(int32, tag = "4")]
    pub priority: i32,

    /// Partition the task is scheduled on.
    #[prost(string, tag = "5")]
    pub partition_id: String,

    /// Application name.
    #[prost(string, tag = "6")]
    pub application_name: String,

    /// Application version.
    #[prost(string, tag = "7")]
    pub application_version: String,

    /// Application namespace.
    #[prost(string, tag = "8")]
    pub application_namespace: String,

    /// Application service.
    #[prost(string, tag = "9")]
    pub application_service: String,

    /// Engine type requested for execution.
    #[prost(string, tag = "10")]
    pub engine_type: String,
}

/// Chunking configuration passed through to the worker.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Configuration {
    /// Maximum size of one data chunk, in bytes.
    #[prost(int32, tag = "1")]
    pub data_chunk_max_size: i32,
}

/// Status of a result object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ResultStatus {
    /// Status left unset.
    Unspecified = 0,
    /// Result object exists; data may or may not have been uploaded yet.
    Created = 1,
    /// Result data is complete.
    Completed = 2,
}

/// Metadata describing one result object, returned by the creation
/// operations. Never carries the data itself.
#[derive(Clone, PartialEq, Message)]
pub struct ResultMetaData {
    /// Creation timestamp, assigned by the service.
    #[prost(message, optional, tag = "1")]
    pub created_at: Option<prost_types::Timestamp>,

    /// Human-readable result name.
    #[prost(string, tag = "2")]
    pub name: String,

    /// Owning session.
    #[prost(string, tag = "3")]
    pub session_id: String,

    /// Result status; always `Created` from this service.
    #[prost(enumeration = "ResultStatus", tag = "4")]
    pub status: i32,

    /// Service-assigned result identifier.
    #[prost(string, tag = "5")]
    pub result_id: String,
}

// ============================================================================
// CreateResults
// ============================================================================

/// One result to create, with its data.
#[derive(Clone, PartialEq, Message)]
pub struct ResultCreate {
    /// Human-readable result name.
    #[prost(string, tag = "1")]
    pub name: String,

    /// Raw result data.
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// Request for the `CreateResults` operation.
#[derive(Clone, PartialEq, Message)]
pub struct CreateResultsRequest {
    /// Opaque session credential, echoed back unvalidated.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Session the results belong to.
    #[prost(string, tag = "2")]
    pub session_id: String,

    /// Results to create. An empty list is valid.
    #[prost(message, repeated, tag = "3")]
    pub results: Vec<ResultCreate>,
}

/// Response for the `CreateResults` operation.
#[derive(Clone, PartialEq, Message)]
pub struct CreateResultsResponse {
    /// Echo of the request's communication token.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Metadata for each created result, in request order.
    #[prost(message, repeated, tag = "2")]
    pub results: Vec<ResultMetaData>,
}

// ============================================================================
// CreateResultsMetaData
// ============================================================================

/// One result to create without data.
#[derive(Clone, PartialEq, Message)]
pub struct ResultMetaCreate {
    /// Human-readable result name.
    #[prost(string, tag = "1")]
    pub name: String,
}

/// Request for the `CreateResultsMetaData` operation.
#[derive(Clone, PartialEq, Message)]
pub struct CreateResultsMetaDataRequest {
    /// Opaque session credential, echoed back unvalidated.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Session the results belong to.
    #[prost(string, tag = "2")]
    pub session_id: String,

    /// Results to create. An empty list is valid.
    #[prost(message, repeated, tag = "3")]
    pub results: Vec<ResultMetaCreate>,
}

/// Response for the `CreateResultsMetaData` operation.
#[derive(Clone, PartialEq, Message)]
pub struct CreateResultsMetaDataResponse {
    /// Echo of the request's communication token.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Metadata for each created result, in request order.
    #[prost(message, repeated, tag = "2")]
    pub results: Vec<ResultMetaData>,
}

// ============================================================================
// NotifyResultData
// ============================================================================

/// Identifies one result within a session.
#[derive(Clone, PartialEq, Message)]
pub struct ResultIdentifier {
    /// Result identifier.
    #[prost(string, tag = "1")]
    pub result_id: String,

    /// Owning session.
    #[prost(string, tag = "2")]
    pub session_id: String,
}

/// Request for the `NotifyResultData` operation.
#[derive(Clone, PartialEq, Message)]
pub struct NotifyResultDataRequest {
    /// Opaque session credential, echoed back unvalidated.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Results whose data is ready on disk.
    #[prost(message, repeated, tag = "2")]
    pub ids: Vec<ResultIdentifier>,
}

/// Response for the `NotifyResultData` operation.
#[derive(Clone, PartialEq, Message)]
pub struct NotifyResultDataResponse {
    /// The notified result identifiers, acknowledged in request order.
    #[prost(string, repeated, tag = "1")]
    pub result_ids: Vec<String>,
}

// ============================================================================
// SubmitTasks
// ============================================================================

/// One derived task to submit.
#[derive(Clone, PartialEq, Message)]
pub struct TaskCreation {
    /// Identifier of the task's payload blob.
    #[prost(string, tag = "1")]
    pub payload_id: String,

    /// Per-task options; falls back to the request's default options
    /// when unset.
    #[prost(message, optional, tag = "2")]
    pub task_options: Option<TaskOptions>,

    /// Data-dependency identifiers, in order.
    #[prost(string, repeated, tag = "3")]
    pub data_dependencies: Vec<String>,

    /// Expected-output identifiers, in order.
    #[prost(string, repeated, tag = "4")]
    pub expected_output_keys: Vec<String>,
}

/// Request for the `SubmitTasks` operation.
#[derive(Clone, PartialEq, Message)]
pub struct SubmitTasksRequest {
    /// Opaque session credential, echoed back unvalidated.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Session the tasks belong to.
    #[prost(string, tag = "2")]
    pub session_id: String,

    /// Default options for creations that carry none.
    #[prost(message, optional, tag = "3")]
    pub task_options: Option<TaskOptions>,

    /// Tasks to submit. An empty list is valid.
    #[prost(message, repeated, tag = "4")]
    pub task_creations: Vec<TaskCreation>,
}

/// Information about one submitted task.
#[derive(Clone, PartialEq, Message)]
pub struct TaskInfo {
    /// Service-assigned task identifier.
    #[prost(string, tag = "1")]
    pub task_id: String,

    /// Echo of the creation's payload identifier.
    #[prost(string, tag = "2")]
    pub payload_id: String,

    /// Echo of the creation's data dependencies.
    #[prost(string, repeated, tag = "3")]
    pub data_dependencies: Vec<String>,

    /// Echo of the creation's expected outputs.
    #[prost(string, repeated, tag = "4")]
    pub expected_output_ids: Vec<String>,
}

/// Response for the `SubmitTasks` operation.
#[derive(Clone, PartialEq, Message)]
pub struct SubmitTasksResponse {
    /// Echo of the request's communication token.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Information about each submitted task, in request order.
    #[prost(message, repeated, tag = "2")]
    pub task_infos: Vec<TaskInfo>,
}

// ============================================================================
// Error envelope payload
// ============================================================================

/// Error payload carried under the error envelope tag.
#[derive(Clone, PartialEq, Message)]
pub struct AgentError {
    /// Failure description.
    #[prost(string, tag = "1")]
    pub message: String,
}

// ============================================================================
// Worker-facing messages
// ============================================================================

/// Request for the worker's single `Process` operation.
#[derive(Clone, PartialEq, Message)]
pub struct ProcessRequest {
    /// Opaque session credential the worker echoes on agent calls.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Session the task runs in.
    #[prost(string, tag = "2")]
    pub session_id: String,

    /// Identifier of the task being processed.
    #[prost(string, tag = "3")]
    pub task_id: String,

    /// Options the task runs with.
    #[prost(message, optional, tag = "4")]
    pub task_options: Option<TaskOptions>,

    /// Identifier of the payload blob staged in the data folder.
    #[prost(string, tag = "5")]
    pub payload_id: String,

    /// Data-dependency identifiers staged in the data folder.
    #[prost(string, repeated, tag = "6")]
    pub data_dependencies: Vec<String>,

    /// Identifiers the worker is expected to produce.
    #[prost(string, repeated, tag = "7")]
    pub expected_output_keys: Vec<String>,

    /// Folder the worker reads inputs from and writes outputs to.
    #[prost(string, tag = "8")]
    pub data_folder: String,

    /// Chunking configuration, passed through unchanged.
    #[prost(message, optional, tag = "9")]
    pub configuration: Option<Configuration>,
}

/// Empty message used as the success arm of [`TaskOutput`].
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Empty {}

/// Outcome of one worker `Process` invocation.
#[derive(Clone, PartialEq, Message)]
pub struct TaskOutput {
    /// Success or failure of the processing.
    #[prost(oneof = "task_output::Kind", tags = "1, 2")]
    pub kind: Option<task_output::Kind>,
}

/// Oneof arms for [`TaskOutput`].
pub mod task_output {
    /// Success or failure of the processing.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        /// Processing completed.
        #[prost(message, tag = "1")]
        Ok(super::Empty),
        /// Processing failed with the given reason.
        #[prost(string, tag = "2")]
        Error(String),
    }
}

/// Reply for the worker's `Process` operation.
#[derive(Clone, PartialEq, Message)]
pub struct ProcessReply {
    /// Echo of the request's communication token.
    #[prost(string, tag = "1")]
    pub communication_token: String,

    /// Processing outcome.
    #[prost(message, optional, tag = "2")]
    pub output: Option<TaskOutput>,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<replay_core::TaskOptions> for TaskOptions {
    fn from(opts: replay_core::TaskOptions) -> Self {
        Self {
            options: opts.options,
            max_duration: opts.max_duration.map(duration_to_wire),
            max_retries: opts.max_retries,
            priority: opts.priority,
            partition_id: opts.partition_id,
            application_name: opts.application_name,
            application_version: opts.application_version,
            application_namespace: opts.application_namespace,
            application_service: opts.application_service,
            engine_type: opts.engine_type,
        }
    }
}

impl From<TaskOptions> for replay_core::TaskOptions {
    fn from(opts: TaskOptions) -> Self {
        Self {
            options: opts.options,
            max_duration: opts.max_duration.and_then(duration_from_wire),
            max_retries: opts.max_retries,
            priority: opts.priority,
            partition_id: opts.partition_id,
            application_name: opts.application_name,
            application_version: opts.application_version,
            application_namespace: opts.application_namespace,
            application_service: opts.application_service,
            engine_type: opts.engine_type,
        }
    }
}

impl From<replay_core::DataChunkConfig> for Configuration {
    fn from(config: replay_core::DataChunkConfig) -> Self {
        Self {
            data_chunk_max_size: i32::try_from(config.max_chunk_size).unwrap_or(i32::MAX),
        }
    }
}

/// Converts a standard duration to its wire representation.
fn duration_to_wire(duration: Duration) -> prost_types::Duration {
    prost_types::Duration {
        seconds: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        nanos: i32::try_from(duration.subsec_nanos()).unwrap_or(0),
    }
}

/// Converts a wire duration to a standard duration. Negative wire
/// durations carry no meaning here and map to `None`.
fn duration_from_wire(duration: prost_types::Duration) -> Option<Duration> {
    let seconds = u64::try_from(duration.seconds).ok()?;
    let nanos = u32::try_from(duration.nanos).ok()?;
    Some(Duration::new(seconds, nanos))
}

/// Converts a UTC timestamp to its wire representation.
#[must_use]
pub fn timestamp_to_wire(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: i32::try_from(at.timestamp_subsec_nanos()).unwrap_or(0),
    }
}
