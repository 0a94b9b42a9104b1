//! Shared helpers: in-process mock tool servers and a mock completion endpoint.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Serve `app` on an ephemeral local port.
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// One JSON-RPC message as the mock saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub method: String,
    pub id: Option<u64>,
    pub session: Option<String>,
    pub params: Value,
}

pub type Log = Arc<Mutex<Vec<Seen>>>;

fn record(log: &Log, body: &Value, session: Option<String>) -> Seen {
    let seen = Seen {
        method: body["method"].as_str().unwrap_or_default().to_string(),
        id: body["id"].as_u64(),
        session,
        params: body["params"].clone(),
    };
    log.lock().unwrap().push(seen.clone());
    seen
}

fn tools_result(id: Option<u64>, tools: &[&str]) -> Value {
    let tools: Vec<Value> = tools
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "description": format!("{name} tool"),
                "inputSchema": {"type": "object", "properties": {"name": {"type": "string"}}},
            })
        })
        .collect();
    json!({"jsonrpc": "2.0", "id": id, "result": {"tools": tools}})
}

/// Result envelope for a `tools/call`: `broken` yields an error envelope,
/// anything else echoes the tool name and arguments as a text block.
fn call_result(id: Option<u64>, params: &Value) -> Value {
    let name = params["name"].as_str().unwrap_or_default();
    if name == "broken" {
        return json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32000, "message": "boom"}});
    }
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {"content": [
            {"type": "text", "text": format!("called {name}")},
            {"type": "text", "text": params["arguments"].to_string()},
        ]},
    })
}

// ─── Request/response tool server ────────────────────────────────────────────

#[derive(Clone)]
struct StreamableState {
    log: Log,
    tools: Arc<Vec<&'static str>>,
}

/// Request/response tool server on `POST /mcp` issuing session `sess-123`.
///
/// A `tools/call` for `stream_reply` is answered with an event-stream body.
pub async fn spawn_streamable_server(tools: &[&'static str]) -> (SocketAddr, Log) {
    let log = Log::default();
    let state = StreamableState {
        log: Arc::clone(&log),
        tools: Arc::new(tools.to_vec()),
    };
    let app = Router::new()
        .route("/mcp", post(streamable_handler))
        .with_state(state);
    (spawn(app).await, log)
}

async fn streamable_handler(
    State(state): State<StreamableState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let session = headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let seen = record(&state.log, &body, session);

    match seen.method.as_str() {
        "initialize" => (
            [("mcp-session-id", "sess-123")],
            Json(json!({"jsonrpc": "2.0", "id": seen.id, "result": {"protocolVersion": "2024-11-05"}})),
        )
            .into_response(),
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => Json(tools_result(seen.id, &state.tools)).into_response(),
        "tools/call" if seen.params["name"] == "stream_reply" => {
            let payload = call_result(seen.id, &seen.params);
            (
                [(header::CONTENT_TYPE, "text/event-stream")],
                format!("event: message\ndata: {payload}\n\n"),
            )
                .into_response()
        }
        "tools/call" => Json(call_result(seen.id, &seen.params)).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// A server that rejects every POST.
pub async fn spawn_failing_server() -> SocketAddr {
    let app = Router::new().route(
        "/mcp",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable") }),
    );
    spawn(app).await
}

/// Accepts TCP connections and holds them open without ever answering.
pub async fn spawn_silent_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

// ─── Event-stream tool server ────────────────────────────────────────────────

#[derive(Clone)]
struct SseState {
    log: Log,
    tools: Arc<Vec<&'static str>>,
    streams: Arc<AtomicUsize>,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    reject_tool_list: bool,
}

/// Event-stream tool server: `GET /sse` announces `/messages?session_id=N`;
/// responses to `POST /messages` arrive on the most recent stream, each
/// preceded by an undecodable event.
pub async fn spawn_sse_server(tools: &[&'static str]) -> (SocketAddr, Log, Arc<AtomicUsize>) {
    start_sse_server(tools, false).await
}

/// Event-stream tool server whose `tools/list` reply is an error envelope.
pub async fn spawn_sse_server_rejecting_tool_list() -> (SocketAddr, Log, Arc<AtomicUsize>) {
    start_sse_server(&["pods_log"], true).await
}

async fn start_sse_server(
    tools: &[&'static str],
    reject_tool_list: bool,
) -> (SocketAddr, Log, Arc<AtomicUsize>) {
    let log = Log::default();
    let streams = Arc::new(AtomicUsize::new(0));
    let state = SseState {
        log: Arc::clone(&log),
        tools: Arc::new(tools.to_vec()),
        streams: Arc::clone(&streams),
        current: Arc::new(Mutex::new(None)),
        reject_tool_list,
    };
    let app = Router::new()
        .route("/sse", get(sse_stream))
        .route("/messages", post(sse_message))
        .with_state(state);
    (spawn(app).await, log, streams)
}

async fn sse_stream(State(state): State<SseState>) -> Response {
    let n = state.streams.fetch_add(1, Ordering::SeqCst) + 1;
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    tx.send(format!("event: endpoint\ndata: /messages?session_id={n}\n\n"))
        .unwrap();
    *state.current.lock().unwrap() = Some(tx);

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(events),
    )
        .into_response()
}

async fn sse_message(
    State(state): State<SseState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    let seen = record(&state.log, &body, query.get("session_id").cloned());

    let reply = match seen.method.as_str() {
        "initialize" => Some(json!({"jsonrpc": "2.0", "id": seen.id, "result": {"protocolVersion": "2024-11-05"}})),
        "tools/list" if state.reject_tool_list => Some(json!({
            "jsonrpc": "2.0",
            "id": seen.id,
            "error": {"code": -32601, "message": "tools/list not supported"}
        })),
        "tools/list" => Some(tools_result(seen.id, &state.tools)),
        "tools/call" => Some(call_result(seen.id, &seen.params)),
        _ => None,
    };

    if let Some(reply) = reply {
        if let Some(tx) = state.current.lock().unwrap().as_ref() {
            let _ = tx.send("data: this is not json\n\n".to_string());
            let _ = tx.send(format!("event: message\ndata: {reply}\n\n"));
        }
    }
    StatusCode::ACCEPTED
}

// ─── Completion endpoint ─────────────────────────────────────────────────────

/// A captured completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

pub type CompletionLog = Arc<Mutex<Vec<CompletionRequest>>>;

#[derive(Clone)]
struct CompletionState {
    log: CompletionLog,
    replies: Arc<Vec<Value>>,
}

/// `POST /v1/chat/completions` answering with `replies` in order; the last
/// reply repeats once the list is exhausted.
pub async fn spawn_completion_server(replies: Vec<Value>) -> (SocketAddr, CompletionLog) {
    let log = CompletionLog::default();
    let state = CompletionState {
        log: Arc::clone(&log),
        replies: Arc::new(replies),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(completion_handler))
        .with_state(state);
    (spawn(app).await, log)
}

async fn completion_handler(
    State(state): State<CompletionState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let index = {
        let mut log = state.log.lock().unwrap();
        log.push(CompletionRequest {
            authorization,
            body,
        });
        log.len() - 1
    };
    let reply = state
        .replies
        .get(index)
        .or_else(|| state.replies.last())
        .cloned()
        .unwrap_or_else(|| json!({"choices": []}));
    Json(reply)
}

/// A completion whose first choice carries structured tool calls.
pub fn tool_call_reply(calls: &[(&str, &str, Value)]) -> Value {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| {
            json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": args.to_string()},
            })
        })
        .collect();
    json!({"choices": [{
        "message": {"role": "assistant", "content": null, "tool_calls": calls},
        "finish_reason": "tool_calls",
    }]})
}

/// A completion whose first choice is plain text.
pub fn text_reply(content: &str) -> Value {
    json!({"choices": [{
        "message": {"role": "assistant", "content": content},
        "finish_reason": "stop",
    }]})
}
