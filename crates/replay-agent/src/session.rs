//! Replay orchestrator: drives one session end-to-end.
//!
//! A [`ReplaySession`] takes a task descriptor, materializes the bytes
//! the worker will need, starts the mock control-plane server, invokes
//! the worker's single `Process` operation, tears the server down, and
//! exposes the recorded storage as the session's output.
//!
//! Input-validation failures (missing descriptor, unresolvable
//! identifier) abort before any side effect. A worker failure does not
//! prevent teardown: the server is shut down on every exit path and
//! whatever was recorded before the failure stays available for partial
//! diffing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use replay_core::{ReplayError, TaskDescriptor};

use crate::agent::ReplayAgent;
use crate::diff::ReplayCapture;
use crate::protocol::wire::ProcessRequest;
use crate::server::AgentServer;
use crate::storage::AgentStorage;
use crate::worker::ProcessWorker;

/// Default subdirectory under the runtime directory for harness sockets.
const DEFAULT_SUBDIR: &str = "task-replay";

/// Default agent socket path.
///
/// `$XDG_RUNTIME_DIR/task-replay/agent.sock` when `XDG_RUNTIME_DIR` is
/// set, `/tmp/task-replay/agent.sock` otherwise.
#[must_use]
pub fn default_agent_socket_path() -> PathBuf {
    runtime_dir().join("agent.sock")
}

/// Default worker socket path, next to the agent socket.
#[must_use]
pub fn default_worker_socket_path() -> PathBuf {
    runtime_dir().join("worker.sock")
}

fn runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(DEFAULT_SUBDIR)
}

/// Paths one session runs with.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint the mock control-plane server binds.
    pub agent_socket: PathBuf,

    /// Folder used to stage data when the descriptor names none.
    pub data_folder: PathBuf,
}

/// Outcome of one replay session.
///
/// Present even when the worker failed: [`worker_outcome`]
/// (Self::worker_outcome) carries the failure while the capture holds
/// whatever the mock service recorded before it.
#[derive(Debug)]
pub struct SessionOutput {
    /// Everything the mock service recorded, plus the output bytes
    /// found on disk for the descriptor's expected output keys.
    pub capture: ReplayCapture,

    /// The effective data folder the worker ran against.
    pub data_folder: PathBuf,

    /// `Ok` when the worker completed; the transport or processing
    /// error otherwise.
    pub worker_outcome: Result<(), ReplayError>,
}

/// One replay session, consumed by [`run`](Self::run).
#[derive(Debug)]
pub struct ReplaySession {
    descriptor: TaskDescriptor,
    config: SessionConfig,
}

impl ReplaySession {
    /// Creates a session from an already-loaded descriptor.
    #[must_use]
    pub fn new(descriptor: TaskDescriptor, config: SessionConfig) -> Self {
        Self { descriptor, config }
    }

    /// Loads the descriptor from a JSON dump file and creates the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::MissingInput`] when the dump is absent or
    /// unreadable.
    pub fn from_dump_file(path: &Path, config: SessionConfig) -> Result<Self, ReplayError> {
        Ok(Self::new(TaskDescriptor::from_json_file(path)?, config))
    }

    /// The session's descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// The session's configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs the session to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::IncompleteInput`] when a referenced
    /// identifier resolves to neither inline bytes nor a staged file,
    /// and [`ReplayError::RpcTransport`] when the agent endpoint cannot
    /// be bound. Worker failures are not returned as errors; they land
    /// in [`SessionOutput::worker_outcome`] with partial results intact.
    pub async fn run(mut self, worker: &dyn ProcessWorker) -> Result<SessionOutput, ReplayError> {
        let communication_token = self.descriptor.ensure_communication_token().to_string();

        let data_folder = self
            .descriptor
            .data_folder
            .clone()
            .unwrap_or_else(|| self.config.data_folder.clone());
        self.materialize_inputs(&data_folder).await?;

        let storage = Arc::new(AgentStorage::new());
        let agent = ReplayAgent::new(Arc::clone(&storage));
        let server = AgentServer::bind(&self.config.agent_socket, Arc::new(agent))
            .await
            .map_err(|e| ReplayError::transport("bind", e.to_string()))?;

        info!(
            task_id = %self.descriptor.task_id,
            session_id = %self.descriptor.session_id,
            "processing task"
        );
        let worker_outcome = worker
            .process(self.process_request(communication_token, &data_folder))
            .await;
        if let Err(e) = &worker_outcome {
            warn!("worker invocation failed: {e}");
        }

        // Teardown runs regardless of the worker outcome.
        if let Err(e) = server.shutdown().await {
            warn!("agent teardown left residue: {e}");
        }

        let snapshot = storage.snapshot();
        let outputs =
            ReplayCapture::collect_outputs(&data_folder, &self.descriptor.expected_output_keys)
                .await;
        Ok(SessionOutput {
            capture: ReplayCapture {
                storage: snapshot,
                outputs,
            },
            data_folder,
            worker_outcome,
        })
    }

    /// Writes every inline byte entry to the data folder (a `None`
    /// entry becomes an empty placeholder file), then checks that each
    /// referenced identifier resolves to a staged file.
    async fn materialize_inputs(&self, data_folder: &Path) -> Result<(), ReplayError> {
        let io_failure = |e: std::io::Error| ReplayError::MissingInput {
            path: data_folder.to_path_buf(),
            reason: format!("cannot stage data: {e}"),
        };

        tokio::fs::create_dir_all(data_folder).await.map_err(io_failure)?;

        for (id, bytes) in &self.descriptor.raw_data {
            let path = data_folder.join(id);
            if !path.exists() {
                tokio::fs::write(&path, bytes.as_deref().unwrap_or_default())
                    .await
                    .map_err(io_failure)?;
            }
        }

        for id in self.descriptor.referenced_ids() {
            if !data_folder.join(id).exists() {
                return Err(ReplayError::IncompleteInput {
                    id: id.to_string(),
                    folder: data_folder.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    fn process_request(&self, communication_token: String, data_folder: &Path) -> ProcessRequest {
        ProcessRequest {
            communication_token,
            session_id: self.descriptor.session_id.clone(),
            task_id: self.descriptor.task_id.clone(),
            task_options: self.descriptor.task_options.clone().map(Into::into),
            payload_id: self.descriptor.payload_id.clone(),
            data_dependencies: self.descriptor.data_dependencies.clone(),
            expected_output_keys: self.descriptor.expected_output_keys.clone(),
            data_folder: data_folder.to_string_lossy().into_owned(),
            configuration: Some(self.descriptor.configuration.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Worker double that records whether it ran.
    #[derive(Default)]
    struct RecordingWorker {
        invoked: AtomicBool,
    }

    #[async_trait]
    impl ProcessWorker for RecordingWorker {
        async fn process(&self, _request: ProcessRequest) -> Result<(), ReplayError> {
            self.invoked.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(dir: &Path) -> SessionConfig {
        SessionConfig {
            agent_socket: dir.join("agent.sock"),
            data_folder: dir.join("data"),
        }
    }

    #[tokio::test]
    async fn unresolvable_identifier_aborts_before_worker() {
        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = TaskDescriptor::sample();
        descriptor
            .data_dependencies
            .push("unresolvable-dep".to_string());

        let worker = RecordingWorker::default();
        let err = ReplaySession::new(descriptor, config(dir.path()))
            .run(&worker)
            .await
            .unwrap_err();

        assert!(matches!(err, ReplayError::IncompleteInput { ref id, .. } if id == "unresolvable-dep"));
        assert!(!worker.invoked.load(Ordering::SeqCst));
        assert!(
            !dir.path().join("agent.sock").exists(),
            "service never started"
        );
    }

    #[tokio::test]
    async fn inline_bytes_are_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = TaskDescriptor::sample();
        let payload_id = descriptor.payload_id.clone();

        let worker = RecordingWorker::default();
        let output = ReplaySession::new(descriptor, config(dir.path()))
            .run(&worker)
            .await
            .unwrap();

        assert!(worker.invoked.load(Ordering::SeqCst));
        assert!(output.worker_outcome.is_ok());
        let staged = std::fs::read(output.data_folder.join(&payload_id)).unwrap();
        assert_eq!(staged, b"Payload");
    }

    #[tokio::test]
    async fn worker_failure_still_tears_down_and_yields_output() {
        struct FailingWorker;

        #[async_trait]
        impl ProcessWorker for FailingWorker {
            async fn process(&self, _request: ProcessRequest) -> Result<(), ReplayError> {
                Err(ReplayError::transport("worker", "simulated crash"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let output = ReplaySession::new(TaskDescriptor::sample(), config(dir.path()))
            .run(&FailingWorker)
            .await
            .unwrap();

        assert!(output.worker_outcome.is_err());
        assert!(output.capture.storage.is_empty());
        assert!(
            !dir.path().join("agent.sock").exists(),
            "endpoint released despite worker failure"
        );
    }

    #[tokio::test]
    async fn synthesizes_missing_communication_token() {
        struct TokenAssertingWorker;

        #[async_trait]
        impl ProcessWorker for TokenAssertingWorker {
            async fn process(&self, request: ProcessRequest) -> Result<(), ReplayError> {
                assert!(!request.communication_token.is_empty());
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut descriptor = TaskDescriptor::sample();
        descriptor.communication_token = None;

        let output = ReplaySession::new(descriptor, config(dir.path()))
            .run(&TokenAssertingWorker)
            .await
            .unwrap();
        assert!(output.worker_outcome.is_ok());
    }
}
