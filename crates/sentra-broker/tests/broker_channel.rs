//! End-to-end tests for the broker channel over a real Unix socket.

#![cfg(unix)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;

use sentra_audit::{AuditSink, MemorySink};
use sentra_broker::{
    read_frame, write_frame, BrokerClient, BrokerConfig, BrokerErrorCode, BrokerRequest,
    BrokerResponse, BrokerServer, ClientError, PingRequest,
};
use sentra_core::RequestId;
use sentra_policy::{ActionMode, ApprovalService, PolicyEngine, ZoneRoots};

const TOKEN: &str = "integration-test-token-0123456789";

struct Harness {
    _dir: tempfile::TempDir,
    socket: std::path::PathBuf,
    workspace: std::path::PathBuf,
    home: std::path::PathBuf,
    outside: std::path::PathBuf,
    audit: Arc<MemorySink>,
    server: Arc<BrokerServer>,
}

async fn start_broker() -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let workspace = dir.path().join("ws");
    let home = dir.path().join("home");
    let outside = dir.path().join("outside");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::create_dir_all(&home).unwrap();
    std::fs::create_dir_all(&outside).unwrap();

    let socket = dir.path().join("broker.sock");
    let audit = Arc::new(MemorySink::new());
    let server = BrokerServer::new(
        BrokerConfig {
            socket_path: socket.clone(),
            token: TOKEN.to_string(),
            roots: ZoneRoots::new(&workspace, home.join(".sentra"), &home),
        },
        PolicyEngine::new(),
        ApprovalService::non_interactive(),
        Arc::clone(&audit) as Arc<dyn AuditSink>,
    );
    let server = Arc::new(server);
    tokio::spawn(Arc::clone(&server).run());

    // Wait for the socket to appear.
    for _ in 0..50 {
        if socket.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    Harness {
        _dir: dir,
        socket,
        workspace,
        home,
        outside,
        audit,
        server,
    }
}

#[tokio::test]
async fn test_handshake_and_ping() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();
    client.ping().await.unwrap();
}

#[tokio::test]
async fn test_wrong_token_fails_handshake() {
    let harness = start_broker().await;
    let result = BrokerClient::connect(&harness.socket, "wrong-token-0123456789").await;
    match result {
        Err(ClientError::Refused { code, .. }) => {
            assert_eq!(code, BrokerErrorCode::HandshakeFailed);
        },
        other => panic!("expected handshake refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn test_request_before_handshake_is_rejected() {
    let harness = start_broker().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

    let ping = BrokerRequest::Ping(PingRequest {
        id: RequestId::new(),
    });
    write_frame(&mut stream, &serde_json::to_vec(&ping).unwrap())
        .await
        .unwrap();

    let frame = read_frame(&mut stream).await.unwrap().unwrap();
    let response: BrokerResponse = serde_json::from_slice(&frame).unwrap();
    assert!(!response.success);
    assert_eq!(response.code, Some(BrokerErrorCode::HandshakeRequired));
}

#[tokio::test]
async fn test_malformed_request_is_rejected_whole() {
    let harness = start_broker().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

    write_frame(&mut stream, b"{\"type\":\"formatDisk\",\"now\":true}")
        .await
        .unwrap();

    let frame = read_frame(&mut stream).await.unwrap().unwrap();
    let response: BrokerResponse = serde_json::from_slice(&frame).unwrap();
    assert!(!response.success);
    assert_eq!(response.code, Some(BrokerErrorCode::InvalidRequest));
}

#[tokio::test]
async fn test_request_with_extra_fields_is_rejected_whole() {
    let harness = start_broker().await;
    let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

    let raw = format!(
        "{{\"type\":\"ping\",\"id\":\"{}\",\"smuggled\":true}}",
        uuid::Uuid::new_v4()
    );
    write_frame(&mut stream, raw.as_bytes()).await.unwrap();

    let frame = read_frame(&mut stream).await.unwrap().unwrap();
    let response: BrokerResponse = serde_json::from_slice(&frame).unwrap();
    assert!(!response.success);
    assert_eq!(response.code, Some(BrokerErrorCode::InvalidRequest));
}

#[tokio::test]
async fn test_workspace_exec_runs_and_captures_output() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let result = client
        .execute(
            "echo",
            vec!["hello".to_string()],
            ActionMode::Exec,
            &harness.workspace,
            Some(10_000),
        )
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout.trim(), "hello");
    assert!(!result.timed_out);
}

#[tokio::test]
async fn test_hard_stop_command_is_policy_denied() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let result = client
        .execute(
            "diskpart",
            vec![],
            ActionMode::Exec,
            &harness.workspace,
            None,
        )
        .await;
    match result {
        Err(ClientError::Refused { code, message }) => {
            assert_eq!(code, BrokerErrorCode::PolicyDenied);
            assert!(message.contains("hard-stop"));
        },
        other => panic!("expected policy denial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_level_b_is_approval_denied_without_a_user() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let result = client
        .execute("echo", vec![], ActionMode::Exec, &harness.outside, None)
        .await;
    match result {
        Err(ClientError::Refused { code, .. }) => {
            assert_eq!(code, BrokerErrorCode::ApprovalDenied);
        },
        other => panic!("expected approval denial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_file_round_trip_inside_workspace() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let path = harness.workspace.join("notes.txt");
    client.write_file(&path, "governed write").await.unwrap();
    assert_eq!(client.read_file(&path).await.unwrap(), "governed write");

    let entries = client.list_dir(&harness.workspace).await.unwrap();
    assert!(entries.contains(&"notes.txt".to_string()));
}

#[tokio::test]
async fn test_write_file_can_create_parent_directories() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let nested = harness.workspace.join("nested/dir/notes.txt");
    let result = client.write_file(&nested, "x").await;
    match result {
        Err(ClientError::Refused { code, .. }) => {
            assert_eq!(code, BrokerErrorCode::ExecutionError);
        },
        other => panic!("expected execution error, got {other:?}"),
    }

    client.write_file_opts(&nested, "x", true).await.unwrap();
    assert_eq!(client.read_file(&nested).await.unwrap(), "x");
}

#[tokio::test]
async fn test_script_argument_escalates_the_zone() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let ssh_dir = harness.home.join(".ssh");
    std::fs::create_dir_all(&ssh_dir).unwrap();
    let script = ssh_dir.join("setup.sh");
    std::fs::write(&script, "#!/bin/sh\n").unwrap();

    // Workspace cwd alone would classify as A; the secrets-zone script
    // argument must govern instead.
    let result = client
        .execute(
            "bash",
            vec![script.to_string_lossy().into_owned()],
            ActionMode::Exec,
            &harness.workspace,
            None,
        )
        .await;
    match result {
        Err(ClientError::Refused { code, .. }) => {
            assert_eq!(code, BrokerErrorCode::PolicyDenied);
        },
        other => panic!("expected policy denial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_execute_timeout_reports_timed_out() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let result = client
        .execute(
            "sleep",
            vec!["5".to_string()],
            ActionMode::Exec,
            &harness.workspace,
            Some(100),
        )
        .await
        .unwrap();

    assert!(result.timed_out);
    assert_eq!(result.exit_code, -1);
}

#[tokio::test]
async fn test_cancel_of_completed_request_is_a_noop() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let cancelled = client.cancel(RequestId::new()).await.unwrap();
    assert!(!cancelled);
}

#[tokio::test]
async fn test_classifications_reach_the_audit_trail() {
    let harness = start_broker().await;
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let _ = client
        .execute("echo", vec![], ActionMode::Exec, &harness.workspace, None)
        .await
        .unwrap();

    let entries = harness.audit.entries();
    assert!(entries
        .iter()
        .any(|entry| entry.action.kind() == "classification"));
}

#[tokio::test]
async fn test_classification_events_are_published() {
    let harness = start_broker().await;
    let mut events = harness.server.events();
    let client = BrokerClient::connect(&harness.socket, TOKEN).await.unwrap();

    let _ = client
        .execute("echo", vec![], ActionMode::Exec, &harness.workspace, None)
        .await
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind(), "classification");
}

#[tokio::test]
async fn test_pipelined_requests_resolve_independently() {
    let harness = start_broker().await;
    let client = Arc::new(BrokerClient::connect(&harness.socket, TOKEN).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..4 {
        let client = Arc::clone(&client);
        let workspace = harness.workspace.clone();
        handles.push(tokio::spawn(async move {
            client
                .execute(
                    "echo",
                    vec![format!("msg-{i}")],
                    ActionMode::Exec,
                    workspace,
                    Some(10_000),
                )
                .await
                .unwrap()
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert_eq!(result.stdout.trim(), format!("msg-{i}"));
    }
}
