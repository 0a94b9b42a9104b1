//! Request/response transport ("streamable-http").
//!
//! Every JSON-RPC message is one HTTP POST to the server URL. The server may
//! assign a session during `initialize` via the `mcp-session-id` header; once
//! captured it is echoed on every later request.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;

use super::errors::McpError;
use super::types::{
    initialize_params, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Header carrying the server-assigned session token.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Accept header for POSTs: servers may answer with plain JSON or an SSE body.
const ACCEPT_JSON_OR_STREAM: &str = "application/json, text/event-stream";

/// Timeout for each handshake POST.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a `tools/call` POST.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Request IDs ─────────────────────────────────────────────────────────────

/// Per-client monotonic request ID counter.
///
/// Starts at 0 and is incremented before use, so the first ID is 1. IDs are
/// never reused or reset for the lifetime of the client.
#[derive(Debug, Default)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next request ID.
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The most recently issued ID (0 if none).
    pub fn last_id(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ─── Transport kind ──────────────────────────────────────────────────────────

/// Which wire transport a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One POST per JSON-RPC message.
    StreamableHttp,
    /// Long-lived event stream plus POSTs to a server-announced endpoint.
    Sse,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::StreamableHttp => "streamable-http",
            TransportKind::Sse => "sse",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streamable-http" | "streamable_http" | "http" => Ok(TransportKind::StreamableHttp),
            "sse" => Ok(TransportKind::Sse),
            other => Err(McpError::ConfigError {
                reason: format!("unknown transport '{other}' (expected 'sse' or 'streamable-http')"),
            }),
        }
    }
}

// ─── StreamableHttpTransport ─────────────────────────────────────────────────

/// JSON-RPC over plain HTTP POSTs.
pub struct StreamableHttpTransport {
    server: String,
    url: String,
    http: HttpClient,
    session_id: Option<String>,
}

impl StreamableHttpTransport {
    pub fn new(server: &str, url: &str, http: HttpClient) -> Self {
        Self {
            server: server.to_string(),
            url: url.to_string(),
            http,
            session_id: None,
        }
    }

    /// Session token captured during the handshake, if the server issued one.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Run `initialize` → `notifications/initialized` → `tools/list`.
    ///
    /// Any non-success status on `initialize` or `tools/list` aborts the
    /// handshake for this server.
    pub async fn handshake(
        &mut self,
        ids: &RequestIds,
    ) -> Result<Vec<McpToolDefinition>, McpError> {
        let init = JsonRpcRequest::new(ids.next_id(), "initialize", Some(initialize_params()));
        let response = self.post(&init, HANDSHAKE_TIMEOUT).await?;
        let response = self.require_success(response, "initialize").await?;

        self.session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        tracing::debug!(
            server = %self.server,
            session = self.session_id.as_deref().unwrap_or("(none)"),
            "initialize accepted"
        );

        // The notification expects no response body; its status is not checked.
        let initialized = JsonRpcNotification::new("notifications/initialized");
        self.post(&initialized, HANDSHAKE_TIMEOUT).await?;

        let list = JsonRpcRequest::new(ids.next_id(), "tools/list", None);
        let response = self.post(&list, HANDSHAKE_TIMEOUT).await?;
        let response = self.require_success(response, "tools/list").await?;
        let envelope = decode_response(&self.server, response).await?;

        Ok(envelope.tool_descriptors())
    }

    /// Send one request and decode its response envelope.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        ids: &RequestIds,
    ) -> Result<JsonRpcResponse, McpError> {
        let request = JsonRpcRequest::new(ids.next_id(), method, Some(params));
        let response = self.post(&request, CALL_TIMEOUT).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                server: self.server.clone(),
                status: status.as_u16(),
                body,
            });
        }

        decode_response(&self.server, response).await
    }

    async fn post<T: Serialize>(
        &self,
        body: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response, McpError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(ACCEPT, ACCEPT_JSON_OR_STREAM)
            .timeout(timeout)
            .json(body);

        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }

        request
            .send()
            .await
            .map_err(|e| McpError::transport(&self.server, e))
    }

    async fn require_success(
        &self,
        response: reqwest::Response,
        method: &str,
    ) -> Result<reqwest::Response, McpError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(McpError::InitFailed {
            name: self.server.clone(),
            reason: format!("{method} returned HTTP {}: {body}", status.as_u16()),
        })
    }
}

// ─── Response decoding ───────────────────────────────────────────────────────

/// Decode a POST response into a JSON-RPC envelope.
///
/// Plain JSON bodies are decoded directly. `text/event-stream` bodies yield
/// the first `data:` payload that decodes as an envelope.
pub(crate) async fn decode_response(
    server: &str,
    response: reqwest::Response,
) -> Result<JsonRpcResponse, McpError> {
    let is_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));

    let body = response
        .text()
        .await
        .map_err(|e| McpError::transport(server, format!("failed to read body: {e}")))?;

    decode_body(server, &body, is_stream)
}

fn decode_body(server: &str, body: &str, is_stream: bool) -> Result<JsonRpcResponse, McpError> {
    if is_stream {
        return body
            .lines()
            .filter_map(super::sse::data_payload)
            .find_map(|data| serde_json::from_str::<JsonRpcResponse>(data).ok())
            .ok_or_else(|| McpError::InvalidResponse {
                server: server.to_string(),
                reason: "event-stream body carried no JSON-RPC message".into(),
            });
    }

    serde_json::from_str(body).map_err(|e| McpError::InvalidResponse {
        server: server.to_string(),
        reason: format!("response is not valid JSON: {e}"),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
