//! Worker invocation boundary.
//!
//! The orchestrator invokes the worker through the [`ProcessWorker`]
//! trait: one operation, "process a task", blocking from the caller's
//! point of view until the worker returns or fails. The production
//! implementation is [`UdsWorkerClient`], which speaks the framed
//! worker protocol over the worker's Unix socket; tests substitute an
//! in-process worker.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::debug;

use replay_core::ReplayError;

use crate::protocol::envelope::{WorkerCall, WorkerReply};
use crate::protocol::framing::FrameCodec;
use crate::protocol::wire::{task_output, ProcessRequest};

/// The single worker-facing operation.
#[async_trait]
pub trait ProcessWorker: Send + Sync {
    /// Processes one task. The data folder path and chunking
    /// configuration inside the request pass through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::RpcTransport`] when the invocation fails
    /// at the transport or protocol level, or when the worker reports a
    /// processing failure.
    async fn process(&self, request: ProcessRequest) -> Result<(), ReplayError>;
}

/// Worker client over a Unix socket.
#[derive(Debug, Clone)]
pub struct UdsWorkerClient {
    socket_path: PathBuf,
}

impl UdsWorkerClient {
    /// Creates a client for the worker socket at `socket_path`.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Path of the worker socket this client talks to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl ProcessWorker for UdsWorkerClient {
    async fn process(&self, request: ProcessRequest) -> Result<(), ReplayError> {
        let transport = |e: &dyn std::fmt::Display| ReplayError::transport("worker", e.to_string());

        debug!(task_id = %request.task_id, "invoking worker");
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| transport(&e))?;
        let mut framed = Framed::new(stream, FrameCodec::new());

        framed
            .send(WorkerCall::Process(request).encode())
            .await
            .map_err(|e| transport(&e))?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| ReplayError::transport("worker", "connection closed before reply"))?
            .map_err(|e| transport(&e))?;

        match WorkerReply::decode(&frame).map_err(|e| transport(&e))? {
            WorkerReply::Process(reply) => match reply.output.and_then(|output| output.kind) {
                Some(task_output::Kind::Ok(_)) | None => Ok(()),
                Some(task_output::Kind::Error(reason)) => {
                    Err(ReplayError::transport("worker", reason))
                },
            },
            WorkerReply::Error(err) => Err(ReplayError::transport("worker", err.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_worker_socket_is_a_transport_error() {
        let client = UdsWorkerClient::new("/nonexistent/worker.sock");
        let err = client.process(ProcessRequest::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ReplayError::RpcTransport { stage: "worker", .. }
        ));
    }
}
