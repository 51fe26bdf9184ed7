//! UDS server binding the mock control plane to a local endpoint.
//!
//! [`AgentServer`] owns the socket for the duration of one `Listening`
//! period: construction binds the endpoint (clearing any stale socket
//! file left by an aborted run), [`AgentServer::shutdown`] stops
//! accepting, lets in-flight calls finish, closes connections idling
//! between calls, then releases the endpoint. There are no other
//! states.
//!
//! Each accepted connection runs on its own task, so a worker fanning
//! out parallel calls over parallel connections gets concurrent
//! handlers; the shared storage behind the [`ControlPlane`] is safe for
//! that.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::agent::{ControlPlane, ResultCreation, TaskSubmission};
use crate::protocol::envelope::{AgentCall, AgentReply};
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::framing::FrameCodec;
use crate::protocol::wire::{
    self, CreateResultsMetaDataResponse, CreateResultsResponse, NotifyResultDataResponse,
    ResultMetaData, SubmitTasksResponse, TaskInfo,
};
use crate::storage::ResultStatus;

/// Listening mock control-plane server.
///
/// Dropping the server without calling [`shutdown`](Self::shutdown)
/// aborts the accept loop without draining; orchestrated sessions
/// always shut down explicitly.
pub struct AgentServer {
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl AgentServer {
    /// Binds the server to `socket_path` and starts accepting.
    ///
    /// A stale socket file at the path (from a prior aborted run) is
    /// removed before binding.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the stale file cannot be
    /// cleared or the socket cannot be bound.
    pub async fn bind(
        socket_path: impl Into<PathBuf>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> ProtocolResult<Self> {
        let socket_path = socket_path.into();

        if let Some(parent) = socket_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        match tokio::fs::remove_file(&socket_path).await {
            Ok(()) => debug!(path = %socket_path.display(), "removed stale socket file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(ProtocolError::Io(e)),
        }

        let listener = UnixListener::bind(&socket_path)?;
        info!(path = %socket_path.display(), "agent listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(listener, control_plane, shutdown_rx));

        Ok(Self {
            socket_path,
            shutdown_tx,
            accept_task,
        })
    }

    /// Path of the bound socket.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stops accepting, lets in-flight calls finish, closes idle
    /// connections, and releases the endpoint. Waiting for calls in
    /// flight avoids truncating a write to the storage aggregate; a
    /// connection a worker keeps open between calls does not delay the
    /// drain.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Io`] if the socket file cannot be
    /// removed after the drain.
    pub async fn shutdown(self) -> ProtocolResult<()> {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.accept_task.await {
            warn!("accept loop ended abnormally: {e}");
        }
        match tokio::fs::remove_file(&self.socket_path).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(ProtocolError::Io(e)),
        }
        info!(path = %self.socket_path.display(), "agent stopped");
        Ok(())
    }
}

/// Accepts connections until shutdown, then drains handler tasks.
async fn accept_loop(
    listener: UnixListener,
    control_plane: Arc<dyn ControlPlane>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    connections.spawn(handle_connection(
                        stream,
                        Arc::clone(&control_plane),
                        shutdown_rx.clone(),
                    ));
                },
                Err(e) => {
                    warn!("accept failed: {e}");
                },
            },
        }
    }
    // Stop accepting before the drain so no new handler can start.
    drop(listener);
    while connections.join_next().await.is_some() {}
}

/// Serves one connection: a sequence of call frames, each answered with
/// one reply frame.
///
/// A worker may hold its connection open between calls, so a connection
/// with no frame in flight is not a call in flight: at shutdown an idle
/// connection is closed immediately, while a call already being handled
/// still gets its reply before the drain completes.
async fn handle_connection(
    stream: UnixStream,
    control_plane: Arc<dyn ControlPlane>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut framed = Framed::new(stream, FrameCodec::new());
    loop {
        let frame = tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("closing idle connection at shutdown");
                return;
            },
            frame = framed.next() => match frame {
                Some(frame) => frame,
                None => return,
            },
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping connection on framing error: {e}");
                return;
            },
        };

        let reply = match AgentCall::decode(&frame) {
            Ok(call) => dispatch(control_plane.as_ref(), call),
            Err(e) => {
                warn!("undecodable call: {e}");
                AgentReply::error(e.to_string())
            },
        };

        if let Err(e) = framed.send(reply.encode()).await {
            warn!("dropping connection on write error: {e}");
            return;
        }
    }
}

/// Translates one wire call into a [`ControlPlane`] invocation and
/// shapes the wire reply, echoing the communication token unvalidated.
fn dispatch(control_plane: &dyn ControlPlane, call: AgentCall) -> AgentReply {
    match call {
        AgentCall::CreateResults(req) => {
            let metas = control_plane.create_results(
                &req.session_id,
                req.results
                    .into_iter()
                    .map(|rc| ResultCreation {
                        name: rc.name,
                        data: rc.data,
                    })
                    .collect(),
            );
            AgentReply::CreateResults(CreateResultsResponse {
                communication_token: req.communication_token,
                results: metas.into_iter().map(meta_to_wire).collect(),
            })
        },
        AgentCall::CreateResultsMetaData(req) => {
            let metas = control_plane.create_results_metadata(
                &req.session_id,
                req.results.into_iter().map(|rc| rc.name).collect(),
            );
            AgentReply::CreateResultsMetaData(CreateResultsMetaDataResponse {
                communication_token: req.communication_token,
                results: metas.into_iter().map(meta_to_wire).collect(),
            })
        },
        AgentCall::NotifyResultData(req) => {
            let acked = control_plane
                .notify_result_data(req.ids.into_iter().map(|id| id.result_id).collect());
            AgentReply::NotifyResultData(NotifyResultDataResponse { result_ids: acked })
        },
        AgentCall::SubmitTasks(req) => {
            let submitted = control_plane.submit_tasks(
                &req.session_id,
                req.task_options.map(Into::into),
                req.task_creations
                    .into_iter()
                    .map(|tc| TaskSubmission {
                        payload_id: tc.payload_id,
                        task_options: tc.task_options.map(Into::into),
                        data_dependencies: tc.data_dependencies,
                        expected_output_keys: tc.expected_output_keys,
                    })
                    .collect(),
            );
            AgentReply::SubmitTasks(SubmitTasksResponse {
                communication_token: req.communication_token,
                task_infos: submitted
                    .into_iter()
                    .map(|task| TaskInfo {
                        task_id: task.task_id,
                        payload_id: task.payload_id,
                        data_dependencies: task.data_dependencies,
                        expected_output_ids: task.expected_output_ids,
                    })
                    .collect(),
            })
        },
    }
}

fn meta_to_wire(meta: crate::agent::ResultMeta) -> ResultMetaData {
    ResultMetaData {
        created_at: Some(wire::timestamp_to_wire(meta.created_at)),
        name: meta.name,
        session_id: meta.session_id,
        status: status_to_wire(meta.status) as i32,
        result_id: meta.result_id,
    }
}

const fn status_to_wire(status: ResultStatus) -> wire::ResultStatus {
    match status {
        ResultStatus::Created => wire::ResultStatus::Created,
        ResultStatus::Completed => wire::ResultStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ReplayAgent;
    use crate::protocol::wire::{
        CreateResultsRequest, ResultCreate, ResultIdentifier, NotifyResultDataRequest,
    };
    use crate::storage::AgentStorage;

    fn agent() -> (Arc<AgentStorage>, ReplayAgent) {
        let storage = Arc::new(AgentStorage::new());
        (Arc::clone(&storage), ReplayAgent::new(storage))
    }

    #[test]
    fn dispatch_echoes_communication_token() {
        let (_, agent) = agent();
        let reply = dispatch(
            &agent,
            AgentCall::CreateResults(CreateResultsRequest {
                communication_token: "token-42".to_string(),
                session_id: "session".to_string(),
                results: vec![ResultCreate {
                    name: "r".to_string(),
                    data: b"x".to_vec(),
                }],
            }),
        );
        match reply {
            AgentReply::CreateResults(resp) => {
                assert_eq!(resp.communication_token, "token-42");
                assert_eq!(resp.results.len(), 1);
                assert_eq!(resp.results[0].status, wire::ResultStatus::Created as i32);
            },
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn dispatch_notify_acks_in_request_order() {
        let (storage, agent) = agent();
        let reply = dispatch(
            &agent,
            AgentCall::NotifyResultData(NotifyResultDataRequest {
                communication_token: "token".to_string(),
                ids: ["r2", "r1"]
                    .into_iter()
                    .map(|id| ResultIdentifier {
                        result_id: id.to_string(),
                        session_id: "session".to_string(),
                    })
                    .collect(),
            }),
        );
        match reply {
            AgentReply::NotifyResultData(resp) => {
                assert_eq!(resp.result_ids, ["r2", "r1"]);
            },
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(storage.notified_count(), 2);
    }

    #[tokio::test]
    async fn bind_clears_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        std::fs::write(&path, b"stale").unwrap();

        let (_, agent) = agent();
        let server = AgentServer::bind(&path, Arc::new(agent)).await.unwrap();
        assert_eq!(server.socket_path(), path);
        server.shutdown().await.unwrap();
        assert!(!path.exists(), "socket file released on shutdown");
    }
}
