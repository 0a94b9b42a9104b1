//! Event-stream transport ("sse").
//!
//! The client opens a streamed GET and reads `data:` lines. The first payload
//! is not JSON-RPC: it names the endpoint that JSON-RPC requests must be
//! POSTed to. Every later payload is a JSON-RPC response, handed to the
//! waiting request in arrival order.
//!
//! Responses are matched to requests by order only, not by `id`, so at most
//! one request may be outstanding per stream.
//!
//! No session is reused across operations: the handshake and each tool call
//! open a fresh stream and run `initialize` again.

use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client as HttpClient;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use super::errors::McpError;
use super::transport::RequestIds;
use super::types::{
    initialize_params, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Wait for the endpoint event and for handshake responses.
const HANDSHAKE_EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait for a `tools/call` response.
const CALL_EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after `notifications/initialized` so the server can process it.
const NOTIFICATION_SETTLE: Duration = Duration::from_millis(100);

/// Timeout for each POST to the message endpoint.
const POST_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the reader → waiter handoff queue.
const EVENT_QUEUE_CAPACITY: usize = 32;

// ─── SseTransport ────────────────────────────────────────────────────────────

/// JSON-RPC over an event stream with a side-channel POST endpoint.
pub struct SseTransport {
    server: String,
    url: Url,
    http: HttpClient,
    /// Endpoint announced during initialization; reused when a later stream
    /// closes without announcing one.
    message_endpoint: Option<String>,
}

impl SseTransport {
    pub fn new(server: &str, url: Url, http: HttpClient) -> Self {
        Self {
            server: server.to_string(),
            url,
            http,
            message_endpoint: None,
        }
    }

    /// Endpoint captured by the last handshake.
    pub fn message_endpoint(&self) -> Option<&str> {
        self.message_endpoint.as_deref()
    }

    /// Open a stream, run `initialize`, and list tools.
    ///
    /// A `tools/list` event without a `result` yields no tools rather than an
    /// error.
    pub async fn handshake(
        &mut self,
        ids: &RequestIds,
    ) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut session = EventStreamSession::open(&self.server, &self.http, &self.url).await?;
        let endpoint = session
            .endpoint()
            .map(String::from)
            .unwrap_or_else(|| fallback_message_endpoint(&self.url));

        tracing::info!(server = %self.server, endpoint = %endpoint, "SSE message endpoint");
        self.message_endpoint = Some(endpoint.clone());

        let outcome = async {
            self.initialize_session(&mut session, &endpoint, ids).await?;
            let list = JsonRpcRequest::new(ids.next_id(), "tools/list", None);
            self.post(&endpoint, &list).await?;
            session
                .next_event("tools/list", HANDSHAKE_EVENT_TIMEOUT)
                .await
        }
        .await;

        session.close().await;
        let list = outcome?;

        if list.result.is_none() {
            tracing::warn!(
                server = %self.server,
                error = ?list.error.as_ref().and_then(|e| e.message.as_deref()),
                "tools/list event carried no result"
            );
            return Ok(Vec::new());
        }
        Ok(list.tool_descriptors())
    }

    /// Open a fresh stream, re-run `initialize`, send one request, and await
    /// the next event as its response.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        ids: &RequestIds,
    ) -> Result<JsonRpcResponse, McpError> {
        let mut session = EventStreamSession::open(&self.server, &self.http, &self.url).await?;
        let endpoint = session
            .endpoint()
            .or(self.message_endpoint.as_deref())
            .map(String::from)
            .unwrap_or_else(|| fallback_message_endpoint(&self.url));

        let outcome = async {
            self.initialize_session(&mut session, &endpoint, ids).await?;
            let request = JsonRpcRequest::new(ids.next_id(), method, Some(params));
            self.post(&endpoint, &request).await?;
            session.next_event(method, CALL_EVENT_TIMEOUT).await
        }
        .await;

        session.close().await;
        outcome
    }

    async fn initialize_session(
        &self,
        session: &mut EventStreamSession,
        endpoint: &str,
        ids: &RequestIds,
    ) -> Result<(), McpError> {
        let init = JsonRpcRequest::new(ids.next_id(), "initialize", Some(initialize_params()));
        self.post(endpoint, &init).await?;
        let init_result = session
            .next_event("initialize", HANDSHAKE_EVENT_TIMEOUT)
            .await?;
        tracing::debug!(server = %self.server, result = ?init_result.result, "SSE initialize result");

        self.post(endpoint, &JsonRpcNotification::new("notifications/initialized"))
            .await?;
        tokio::time::sleep(NOTIFICATION_SETTLE).await;
        Ok(())
    }

    async fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<(), McpError> {
        let response = self
            .http
            .post(endpoint)
            .timeout(POST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| McpError::transport(&self.server, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                server: self.server.clone(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// ─── EventStreamSession ──────────────────────────────────────────────────────

/// One open event stream with its background reader.
///
/// The reader decodes events into a bounded queue. `close` aborts the reader
/// and waits for it to finish; dropping the session aborts it as well.
pub(crate) struct EventStreamSession {
    server: String,
    endpoint: Option<String>,
    events: mpsc::Receiver<JsonRpcResponse>,
    reader: Option<JoinHandle<()>>,
}

impl EventStreamSession {
    /// Open the stream and read the endpoint announcement.
    ///
    /// `endpoint()` is `None` when the stream ended before announcing one.
    pub(crate) async fn open(
        server: &str,
        http: &HttpClient,
        url: &Url,
    ) -> Result<Self, McpError> {
        let endpoint_timeout = || McpError::Timeout {
            server: server.to_string(),
            method: "endpoint".into(),
            timeout_secs: HANDSHAKE_EVENT_TIMEOUT.as_secs(),
        };

        // Bound only the wait for headers; a request timeout would also cut
        // off the long-lived body.
        let response = tokio::time::timeout(
            HANDSHAKE_EVENT_TIMEOUT,
            http.get(url.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| endpoint_timeout())?
        .map_err(|e| McpError::transport(server, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::HttpStatus {
                server: server.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let mut lines = SseLines::new(Box::pin(response.bytes_stream()));

        let announced = tokio::time::timeout(HANDSHAKE_EVENT_TIMEOUT, lines.next_data())
            .await
            .map_err(|_| endpoint_timeout())?;
        let endpoint = announced.map(|token| resolve_endpoint(url, &token));

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let reader = tokio::spawn(read_events(server.to_string(), lines, tx));

        Ok(Self {
            server: server.to_string(),
            endpoint,
            events: rx,
            reader: Some(reader),
        })
    }

    pub(crate) fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Take the next decoded event, waiting at most `wait`.
    pub(crate) async fn next_event(
        &mut self,
        method: &str,
        wait: Duration,
    ) -> Result<JsonRpcResponse, McpError> {
        match tokio::time::timeout(wait, self.events.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(McpError::StreamClosed {
                server: self.server.clone(),
                method: method.to_string(),
            }),
            Err(_) => Err(McpError::Timeout {
                server: self.server.clone(),
                method: method.to_string(),
                timeout_secs: wait.as_secs(),
            }),
        }
    }

    /// Cancel the reader and wait until it has stopped.
    pub(crate) async fn close(mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            let _ = reader.await;
        }
    }
}

impl Drop for EventStreamSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Background reader: decode each `data:` payload and queue it.
///
/// Payloads that are not JSON-RPC envelopes are dropped.
async fn read_events<S, B, E>(
    server: String,
    mut lines: SseLines<S>,
    events: mpsc::Sender<JsonRpcResponse>,
) where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    while let Some(data) = lines.next_data().await {
        match serde_json::from_str::<JsonRpcResponse>(&data) {
            Ok(event) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "dropping undecodable event");
            }
        }
    }
}

// ─── Line framing ────────────────────────────────────────────────────────────

/// Splits a byte stream into lines, buffering across chunk boundaries.
pub(crate) struct SseLines<S> {
    stream: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S, B, E> SseLines<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Next complete line without its terminator, or `None` at end of stream.
    pub(crate) async fn next_line(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                return Some(line.trim_end_matches(['\n', '\r']).to_string());
            }

            if self.done {
                if self.buffer.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut self.buffer);
                return Some(String::from_utf8_lossy(&rest).trim_end().to_string());
            }

            match self.stream.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "event stream read error");
                    self.done = true;
                }
                None => self.done = true,
            }
        }
    }

    /// Next non-empty `data:` payload.
    pub(crate) async fn next_data(&mut self) -> Option<String> {
        while let Some(line) = self.next_line().await {
            if let Some(data) = data_payload(&line) {
                return Some(data.to_string());
            }
        }
        None
    }
}

/// The payload of a `data:` line, trimmed; `None` for other lines or empty data.
pub(crate) fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:")
        .map(str::trim)
        .filter(|data| !data.is_empty())
}

// ─── Endpoint resolution ─────────────────────────────────────────────────────

/// Resolve an endpoint announcement against the stream URL.
///
/// - absolute URL (`http…`) → used as-is
/// - absolute path (`/messages?…`) → stream scheme + host + path
/// - bare segment (`messages?…`) → stream scheme + host + `/` + segment
pub(crate) fn resolve_endpoint(stream_url: &Url, token: &str) -> String {
    let origin = stream_url.origin().ascii_serialization();
    if token.starts_with("http") {
        token.to_string()
    } else if token.starts_with('/') {
        format!("{origin}{token}")
    } else {
        format!("{origin}/{token}")
    }
}

/// POST target used when the stream never announced an endpoint.
fn fallback_message_endpoint(stream_url: &Url) -> String {
    stream_url.as_str().replace("/sse", "/message")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
