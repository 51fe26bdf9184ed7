//! Worker-side client for the agent socket.
//!
//! [`AgentClient`] issues the four control-plane operations over the
//! agent's Unix socket. Every call opens its own connection, so callers
//! that fan out parallel requests get genuinely concurrent handlers on
//! the server side. Used by the integration tests and by in-process
//! worker implementations; an external worker speaks the same frames.

use std::path::{Path, PathBuf};

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::protocol::envelope::{AgentCall, AgentReply};
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::framing::FrameCodec;
use crate::protocol::wire::{
    CreateResultsMetaDataRequest, CreateResultsMetaDataResponse, CreateResultsRequest,
    CreateResultsResponse, NotifyResultDataRequest, NotifyResultDataResponse, SubmitTasksRequest,
    SubmitTasksResponse,
};

/// Client for the mock control-plane socket.
#[derive(Debug, Clone)]
pub struct AgentClient {
    socket_path: PathBuf,
}

impl AgentClient {
    /// Creates a client for the agent socket at `socket_path`.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Path of the agent socket this client talks to.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Calls `CreateResults`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] on connection, framing, or decode
    /// failure, or when the agent replies with an error envelope.
    pub async fn create_results(
        &self,
        request: CreateResultsRequest,
    ) -> ProtocolResult<CreateResultsResponse> {
        match self.round_trip(AgentCall::CreateResults(request)).await? {
            AgentReply::CreateResults(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    /// Calls `CreateResultsMetaData`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`create_results`](Self::create_results).
    pub async fn create_results_metadata(
        &self,
        request: CreateResultsMetaDataRequest,
    ) -> ProtocolResult<CreateResultsMetaDataResponse> {
        match self
            .round_trip(AgentCall::CreateResultsMetaData(request))
            .await?
        {
            AgentReply::CreateResultsMetaData(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    /// Calls `NotifyResultData`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`create_results`](Self::create_results).
    pub async fn notify_result_data(
        &self,
        request: NotifyResultDataRequest,
    ) -> ProtocolResult<NotifyResultDataResponse> {
        match self.round_trip(AgentCall::NotifyResultData(request)).await? {
            AgentReply::NotifyResultData(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    /// Calls `SubmitTasks`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`create_results`](Self::create_results).
    pub async fn submit_tasks(
        &self,
        request: SubmitTasksRequest,
    ) -> ProtocolResult<SubmitTasksResponse> {
        match self.round_trip(AgentCall::SubmitTasks(request)).await? {
            AgentReply::SubmitTasks(resp) => Ok(resp),
            other => Err(unexpected(&other)),
        }
    }

    /// Opens a connection, sends one call frame, awaits one reply.
    async fn round_trip(&self, call: AgentCall) -> ProtocolResult<AgentReply> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let mut framed = Framed::new(stream, FrameCodec::new());

        framed.send(call.encode()).await?;
        let frame = framed
            .next()
            .await
            .ok_or(ProtocolError::ConnectionClosed)??;

        match AgentReply::decode(&frame)? {
            AgentReply::Error(err) => Err(ProtocolError::peer(err.message)),
            reply => Ok(reply),
        }
    }
}

fn unexpected(reply: &AgentReply) -> ProtocolError {
    ProtocolError::invalid_frame(format!("reply does not match call: {reply:?}"))
}
