//! Both wire transports against in-process mock tool servers.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use pipeline_agent::mcp_client::{McpClient, McpError, ToolRegistry, ToolServer, TransportKind};

fn names(client: &McpClient) -> Vec<String> {
    client.tools().iter().map(|t| t.name.clone()).collect()
}

// ─── Request/response ────────────────────────────────────────────────────────

#[tokio::test]
async fn streamable_handshake_captures_session_and_lists_tools() {
    let (addr, log) = common::spawn_streamable_server(&["create_issue", "list_issues"]).await;
    let mut client = McpClient::new(
        "gitea",
        &format!("http://{addr}/mcp"),
        TransportKind::StreamableHttp,
    )
    .unwrap();

    client.initialize().await.unwrap();

    assert_eq!(names(&client), vec!["create_issue", "list_issues"]);
    assert_eq!(client.tools()[0].description.as_deref(), Some("create_issue tool"));
    assert!(client.tools()[0].input_schema.is_some());
    assert_eq!(client.session_id(), Some("sess-123"));

    let seen = log.lock().unwrap().clone();
    let methods: Vec<_> = seen.iter().map(|s| s.method.as_str()).collect();
    assert_eq!(methods, vec!["initialize", "notifications/initialized", "tools/list"]);
    assert_eq!(seen[0].id, Some(1));
    assert_eq!(seen[0].session, None);
    assert_eq!(seen[1].id, None);
    assert_eq!(seen[1].session.as_deref(), Some("sess-123"));
    assert_eq!(seen[2].id, Some(2));
    assert_eq!(seen[2].session.as_deref(), Some("sess-123"));
    assert_eq!(seen[0].params["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn streamable_call_sends_session_and_increasing_ids() {
    let (addr, log) = common::spawn_streamable_server(&["create_issue"]).await;
    let mut client = McpClient::new(
        "gitea",
        &format!("http://{addr}/mcp"),
        TransportKind::StreamableHttp,
    )
    .unwrap();
    client.initialize().await.unwrap();

    let text = client
        .call_tool("create_issue", json!({"title": "OOM"}))
        .await
        .unwrap();
    assert_eq!(text, "called create_issue\n{\"title\":\"OOM\"}");

    client.call_tool("create_issue", json!({})).await.unwrap();

    let seen = log.lock().unwrap().clone();
    let call_ids: Vec<_> = seen
        .iter()
        .filter(|s| s.method == "tools/call")
        .map(|s| s.id)
        .collect();
    assert_eq!(call_ids, vec![Some(3), Some(4)]);
    assert!(seen
        .iter()
        .filter(|s| s.method == "tools/call")
        .all(|s| s.session.as_deref() == Some("sess-123")));
    assert_eq!(seen[2].params, json!({}));
    assert_eq!(client.last_request_id(), 4);
}

#[tokio::test]
async fn streamable_error_envelope_becomes_error_text() {
    let (addr, _log) = common::spawn_streamable_server(&["broken"]).await;
    let mut client = McpClient::new(
        "gitea",
        &format!("http://{addr}/mcp"),
        TransportKind::StreamableHttp,
    )
    .unwrap();
    client.initialize().await.unwrap();

    let text = client.call_tool("broken", json!({})).await.unwrap();
    assert_eq!(text, "Error: boom");
}

#[tokio::test]
async fn streamable_accepts_event_stream_reply() {
    let (addr, _log) = common::spawn_streamable_server(&["stream_reply"]).await;
    let mut client = McpClient::new(
        "gitea",
        &format!("http://{addr}/mcp"),
        TransportKind::StreamableHttp,
    )
    .unwrap();
    client.initialize().await.unwrap();

    let text = client.call_tool("stream_reply", json!({"a": 1})).await.unwrap();
    assert_eq!(text, "called stream_reply\n{\"a\":1}");
}

#[tokio::test]
async fn streamable_handshake_failure_is_fatal_for_that_server() {
    let addr = common::spawn_failing_server().await;
    let mut client = McpClient::new(
        "gitea",
        &format!("http://{addr}/mcp"),
        TransportKind::StreamableHttp,
    )
    .unwrap();

    let err = client.initialize().await.unwrap_err();
    assert!(matches!(err, McpError::InitFailed { .. }), "got {err}");
    assert!(client.tools().is_empty());
}

// ─── Event stream ────────────────────────────────────────────────────────────

#[tokio::test]
async fn sse_handshake_discovers_endpoint_and_lists_tools() {
    let (addr, log, streams) = common::spawn_sse_server(&["pods_log", "pods_list"]).await;
    let mut client =
        McpClient::new("openshift", &format!("http://{addr}/sse"), TransportKind::Sse).unwrap();

    client.initialize().await.unwrap();

    assert_eq!(names(&client), vec!["pods_log", "pods_list"]);
    assert_eq!(streams.load(Ordering::SeqCst), 1);

    let seen = log.lock().unwrap().clone();
    let methods: Vec<_> = seen.iter().map(|s| s.method.as_str()).collect();
    assert_eq!(methods, vec!["initialize", "notifications/initialized", "tools/list"]);
    assert!(seen.iter().all(|s| s.session.as_deref() == Some("1")));
    assert_eq!(seen[0].id, Some(1));
    assert_eq!(seen[2].id, Some(2));
}

#[tokio::test]
async fn sse_call_repeats_handshake_on_fresh_stream() {
    let (addr, log, streams) = common::spawn_sse_server(&["pods_log"]).await;
    let mut client =
        McpClient::new("openshift", &format!("http://{addr}/sse"), TransportKind::Sse).unwrap();
    client.initialize().await.unwrap();

    let text = client
        .call_tool("pods_log", json!({"namespace": "ci", "name": "build-1"}))
        .await
        .unwrap();

    assert!(text.starts_with("called pods_log\n"));
    assert!(text.contains("\"namespace\":\"ci\""));
    assert_eq!(streams.load(Ordering::SeqCst), 2);

    let seen = log.lock().unwrap().clone();
    let methods: Vec<_> = seen.iter().map(|s| s.method.as_str()).collect();
    assert_eq!(
        methods,
        vec![
            "initialize",
            "notifications/initialized",
            "tools/list",
            "initialize",
            "notifications/initialized",
            "tools/call",
        ]
    );
    // The second operation posts to the endpoint announced by the second stream.
    assert!(seen[3..].iter().all(|s| s.session.as_deref() == Some("2")));
    let ids: Vec<_> = seen.iter().filter_map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(client.last_request_id(), 4);
}

#[tokio::test]
async fn sse_error_envelope_becomes_error_text() {
    let (addr, _log, _streams) = common::spawn_sse_server(&["broken"]).await;
    let mut client =
        McpClient::new("openshift", &format!("http://{addr}/sse"), TransportKind::Sse).unwrap();
    client.initialize().await.unwrap();

    let text = client.call_tool("broken", json!({})).await.unwrap();
    assert_eq!(text, "Error: boom");
}

#[tokio::test]
async fn sse_unreachable_server_fails_initialization() {
    // Bind then drop a listener to get a port nobody is serving.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut client =
        McpClient::new("openshift", &format!("http://{addr}/sse"), TransportKind::Sse).unwrap();
    let err = client.initialize().await.unwrap_err();
    assert!(matches!(err, McpError::TransportError { .. }), "got {err}");
}

#[tokio::test]
async fn sse_tool_list_without_result_yields_no_tools() {
    let (addr, log, _streams) = common::spawn_sse_server_rejecting_tool_list().await;
    let mut client =
        McpClient::new("openshift", &format!("http://{addr}/sse"), TransportKind::Sse).unwrap();

    client.initialize().await.unwrap();

    assert!(client.tools().is_empty());
    let seen = log.lock().unwrap().clone();
    assert_eq!(seen.last().map(|s| s.method.as_str()), Some("tools/list"));
}

#[tokio::test]
async fn sse_silent_server_times_out_waiting_for_stream() {
    let addr = common::spawn_silent_server().await;
    let mut client =
        McpClient::new("openshift", &format!("http://{addr}/sse"), TransportKind::Sse).unwrap();

    let started = std::time::Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(30), client.initialize())
        .await
        .expect("initialize must not hang on a silent server");

    let err = outcome.unwrap_err();
    assert!(
        matches!(&err, McpError::Timeout { method, .. } if method == "endpoint"),
        "got {err}"
    );
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(client.tools().is_empty());
}

// ─── Registry over both transports ───────────────────────────────────────────

#[tokio::test]
async fn registry_routes_across_transports_and_isolates_failures() {
    let (sse_addr, _sse_log, _) = common::spawn_sse_server(&["pods_log"]).await;
    let (http_addr, http_log) = common::spawn_streamable_server(&["create_issue"]).await;
    let down = common::spawn_failing_server().await;

    let mut registry = ToolRegistry::new();
    registry.add_client(
        McpClient::new("openshift", &format!("http://{sse_addr}/sse"), TransportKind::Sse).unwrap(),
    );
    registry.add_client(
        McpClient::new("jira", &format!("http://{down}/mcp"), TransportKind::StreamableHttp)
            .unwrap(),
    );
    registry.add_client(
        McpClient::new(
            "gitea",
            &format!("http://{http_addr}/mcp"),
            TransportKind::StreamableHttp,
        )
        .unwrap(),
    );

    let failures = registry.initialize_all().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "jira");
    assert_eq!(registry.tool_names(), vec!["create_issue", "pods_log"]);
    assert_eq!(registry.server_for_tool("pods_log"), Some("openshift"));

    let before = http_log.lock().unwrap().len();
    let text = registry.call_tool("nope", json!({})).await.unwrap();
    assert_eq!(text, "Error: Unknown tool 'nope'");
    assert_eq!(http_log.lock().unwrap().len(), before);

    let text = registry
        .call_tool("create_issue", json!({"title": "t"}))
        .await
        .unwrap();
    assert!(text.starts_with("called create_issue"));
}
