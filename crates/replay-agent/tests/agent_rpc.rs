//! End-to-end RPC tests for the mock control-plane agent.
//!
//! Each test binds a real [`AgentServer`] on a socket inside a temp
//! directory and drives it with [`AgentClient`], the same wire path a
//! worker process would use.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use replay_agent::protocol::wire::{
    CreateResultsMetaDataRequest, CreateResultsRequest, NotifyResultDataRequest, ResultCreate,
    ResultIdentifier, ResultMetaCreate, ResultStatus, SubmitTasksRequest, TaskCreation,
    TaskOptions,
};
use replay_agent::protocol::{AgentCall, AgentReply, FrameCodec};
use replay_agent::{AgentClient, AgentServer, AgentStorage, ReplayAgent};

/// Maximum time to wait for any single RPC round trip.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    server: AgentServer,
    client: AgentClient,
    storage: Arc<AgentStorage>,
    _tmp: TempDir,
}

async fn start_agent() -> Harness {
    let tmp = TempDir::new().unwrap();
    let socket = tmp.path().join("agent.sock");
    let storage = Arc::new(AgentStorage::default());
    let agent = Arc::new(ReplayAgent::new(Arc::clone(&storage)));
    let server = AgentServer::bind(&socket, agent).await.unwrap();
    Harness {
        server,
        client: AgentClient::new(socket),
        storage,
        _tmp: tmp,
    }
}

#[tokio::test]
async fn create_results_stores_data_and_echoes_token() {
    let harness = start_agent().await;

    let response = timeout(
        TEST_TIMEOUT,
        harness.client.create_results(CreateResultsRequest {
            communication_token: "token-1".to_string(),
            session_id: "session-1".to_string(),
            results: vec![ResultCreate {
                name: "payload".to_string(),
                data: b"bytes".to_vec(),
            }],
        }),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(response.communication_token, "token-1");
    assert_eq!(response.results.len(), 1);
    let meta = &response.results[0];
    assert_eq!(meta.name, "payload");
    assert_eq!(meta.session_id, "session-1");
    assert_eq!(meta.status, ResultStatus::Created as i32);
    assert!(!meta.result_id.is_empty());

    let stored = harness.storage.all_results();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].data.as_deref(), Some(b"bytes".as_slice()));

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn create_results_metadata_stores_record_without_data() {
    let harness = start_agent().await;

    let response = timeout(
        TEST_TIMEOUT,
        harness
            .client
            .create_results_metadata(CreateResultsMetaDataRequest {
                communication_token: "token-2".to_string(),
                session_id: "session-2".to_string(),
                results: vec![ResultMetaCreate {
                    name: "future-output".to_string(),
                }],
            }),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(response.communication_token, "token-2");
    assert_eq!(response.results.len(), 1);

    let stored = harness.storage.all_results();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "future-output");
    assert!(stored[0].data.is_none());

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn notify_result_data_acks_in_order_and_is_idempotent() {
    let harness = start_agent().await;

    let request = NotifyResultDataRequest {
        communication_token: "token-3".to_string(),
        ids: vec![
            ResultIdentifier {
                result_id: "r-b".to_string(),
                session_id: "session-3".to_string(),
            },
            ResultIdentifier {
                result_id: "r-a".to_string(),
                session_id: "session-3".to_string(),
            },
        ],
    };

    let first = timeout(TEST_TIMEOUT, harness.client.notify_result_data(request.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.result_ids, vec!["r-b", "r-a"]);

    let second = timeout(TEST_TIMEOUT, harness.client.notify_result_data(request))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.result_ids, vec!["r-b", "r-a"]);
    assert_eq!(harness.storage.notified_count(), 2);

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn submit_tasks_falls_back_to_request_default_options() {
    let harness = start_agent().await;

    let explicit = TaskOptions {
        priority: 9,
        ..TaskOptions::default()
    };
    let default = TaskOptions {
        priority: 1,
        partition_id: "fallback".to_string(),
        ..TaskOptions::default()
    };

    let response = timeout(
        TEST_TIMEOUT,
        harness.client.submit_tasks(SubmitTasksRequest {
            communication_token: "token-4".to_string(),
            session_id: "session-4".to_string(),
            task_options: Some(default),
            task_creations: vec![
                TaskCreation {
                    payload_id: "p-1".to_string(),
                    task_options: Some(explicit),
                    data_dependencies: vec!["d-1".to_string()],
                    expected_output_keys: vec!["o-1".to_string()],
                },
                TaskCreation {
                    payload_id: "p-2".to_string(),
                    task_options: None,
                    data_dependencies: vec![],
                    expected_output_keys: vec!["o-2".to_string()],
                },
            ],
        }),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(response.task_infos.len(), 2);
    assert!(!response.task_infos[0].task_id.is_empty());
    assert_ne!(response.task_infos[0].task_id, response.task_infos[1].task_id);

    let stored = harness.storage.all_tasks();
    assert_eq!(stored.len(), 2);
    let by_payload = |id: &str| stored.iter().find(|t| t.payload_id == id).unwrap();
    assert_eq!(by_payload("p-1").task_options.as_ref().unwrap().priority, 9);
    assert_eq!(
        by_payload("p-2").task_options.as_ref().unwrap().partition_id,
        "fallback"
    );

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn concurrent_clients_are_all_recorded() {
    let harness = start_agent().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = AgentClient::new(harness.client.socket_path().to_path_buf());
        handles.push(tokio::spawn(async move {
            client
                .create_results(CreateResultsRequest {
                    communication_token: "token".to_string(),
                    session_id: "session".to_string(),
                    results: vec![ResultCreate {
                        name: format!("result-{i}"),
                        data: vec![i],
                    }],
                })
                .await
        }));
    }
    for handle in handles {
        timeout(TEST_TIMEOUT, handle).await.unwrap().unwrap().unwrap();
    }

    assert_eq!(harness.storage.result_count(), 8);

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn undecodable_call_gets_error_envelope_not_hangup() {
    let harness = start_agent().await;

    let stream = UnixStream::connect(harness.client.socket_path()).await.unwrap();
    let mut framed = Framed::new(stream, FrameCodec::new());

    // Tag 200 is not a known operation.
    framed
        .send(bytes::Bytes::from_static(&[200, 1, 2, 3]))
        .await
        .unwrap();
    let frame = timeout(TEST_TIMEOUT, framed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    match AgentReply::decode(&frame).unwrap() {
        AgentReply::Error(err) => assert!(!err.message.is_empty()),
        other => panic!("expected error envelope, got {other:?}"),
    }

    harness.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_is_not_blocked_by_an_idle_connection() {
    let harness = start_agent().await;

    // A worker may keep its connection open after its last call; an
    // idle connection is not an in-flight call and must not stall the
    // drain.
    let idle = UnixStream::connect(harness.client.socket_path())
        .await
        .unwrap();

    timeout(TEST_TIMEOUT, harness.server.shutdown())
        .await
        .expect("shutdown must complete while a connection idles")
        .unwrap();
    drop(idle);
}

#[tokio::test]
async fn shutdown_is_not_blocked_by_a_connection_held_open_after_a_call() {
    let harness = start_agent().await;

    let stream = UnixStream::connect(harness.client.socket_path()).await.unwrap();
    let mut framed = Framed::new(stream, FrameCodec::new());
    let call = AgentCall::NotifyResultData(NotifyResultDataRequest {
        communication_token: "token".to_string(),
        ids: vec![ResultIdentifier {
            result_id: "r-1".to_string(),
            session_id: "session".to_string(),
        }],
    });
    framed.send(call.encode()).await.unwrap();
    let frame = timeout(TEST_TIMEOUT, framed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(
        AgentReply::decode(&frame).unwrap(),
        AgentReply::NotifyResultData(_)
    ));

    // The connection stays open with no further frames.
    timeout(TEST_TIMEOUT, harness.server.shutdown())
        .await
        .expect("shutdown must complete after the call was answered")
        .unwrap();
    drop(framed);
}

#[tokio::test]
async fn shutdown_removes_socket_file() {
    let harness = start_agent().await;
    let socket = harness.client.socket_path().to_path_buf();
    assert!(socket.exists());

    harness.server.shutdown().await.unwrap();
    assert!(!socket.exists());
}
