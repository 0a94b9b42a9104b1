//! MCP Client: one tool server behind one wire transport.
//!
//! `McpClient` owns the server name (the registry's routing key), the chosen
//! transport, the request-ID counter, and the catalogue from the most recent
//! handshake. The `ToolServer` trait is the seam the registry routes through.

use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;
use url::Url;

use super::errors::McpError;
use super::sse::SseTransport;
use super::transport::{RequestIds, StreamableHttpTransport, TransportKind};
use super::types::{JsonRpcResponse, McpToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Connect timeout for the shared HTTP client. Per-request and per-event
/// timeouts are applied by each transport.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ─── ToolServer ──────────────────────────────────────────────────────────────

/// A named server that lists tools and executes tool calls.
pub trait ToolServer: Send + Sync {
    /// Routing key in the registry.
    fn name(&self) -> &str;

    /// Tools discovered by the most recent `initialize`.
    fn tools(&self) -> &[McpToolDefinition];

    /// Run the handshake and refresh the catalogue.
    fn initialize(&mut self) -> impl Future<Output = Result<(), McpError>> + Send;

    /// Execute one tool and reduce the response to text.
    ///
    /// A JSON-RPC error envelope is returned as `Ok("Error: …")`; only
    /// transport-level failures are `Err`.
    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = Result<String, McpError>> + Send;
}

// ─── McpClient ───────────────────────────────────────────────────────────────

enum Transport {
    StreamableHttp(StreamableHttpTransport),
    Sse(SseTransport),
}

/// Client for one remote tool server.
pub struct McpClient {
    name: String,
    url: Url,
    kind: TransportKind,
    transport: Transport,
    ids: RequestIds,
    tools: Vec<McpToolDefinition>,
}

impl McpClient {
    /// Create a client. No network traffic happens until `initialize`.
    pub fn new(name: &str, url: &str, kind: TransportKind) -> Result<Self, McpError> {
        let parsed = Url::parse(url).map_err(|e| McpError::ConfigError {
            reason: format!("invalid URL for server '{name}': {e}"),
        })?;

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::transport(name, e))?;

        let transport = match kind {
            TransportKind::StreamableHttp => {
                Transport::StreamableHttp(StreamableHttpTransport::new(name, url, http))
            }
            TransportKind::Sse => Transport::Sse(SseTransport::new(name, parsed.clone(), http)),
        };

        Ok(Self {
            name: name.to_string(),
            url: parsed,
            kind,
            transport,
            ids: RequestIds::new(),
            tools: Vec::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    /// The most recently issued JSON-RPC request ID (0 before any request).
    pub fn last_request_id(&self) -> u64 {
        self.ids.last_id()
    }

    /// Session token from the request/response handshake, if any.
    pub fn session_id(&self) -> Option<&str> {
        match &self.transport {
            Transport::StreamableHttp(t) => t.session_id(),
            Transport::Sse(_) => None,
        }
    }
}

impl ToolServer for McpClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> &[McpToolDefinition] {
        &self.tools
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        let start = Instant::now();
        tracing::info!(
            server = %self.name,
            url = %self.url,
            transport = %self.kind,
            "initializing MCP server"
        );

        let tools = match &mut self.transport {
            Transport::StreamableHttp(t) => t.handshake(&self.ids).await?,
            Transport::Sse(t) => t.handshake(&self.ids).await?,
        };

        tracing::info!(
            server = %self.name,
            tools = tools.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "MCP server initialized"
        );
        self.tools = tools;
        Ok(())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        tracing::debug!(server = %self.name, tool = name, "tools/call");

        let response = match &self.transport {
            Transport::StreamableHttp(t) => t.request("tools/call", params, &self.ids).await?,
            Transport::Sse(t) => t.request("tools/call", params, &self.ids).await?,
        };

        Ok(response_text(response))
    }
}

// ─── Result reduction ────────────────────────────────────────────────────────

/// Reduce a `tools/call` response to text.
///
/// - error envelope → `"Error: <message>"`
/// - `result.content` blocks → their `text` fields joined by newlines (a block
///   without a string `text` contributes its JSON form; entries that are not
///   objects are skipped, and a list with no object entries is returned as JSON)
/// - any other result → its JSON form
pub(crate) fn response_text(response: JsonRpcResponse) -> String {
    if let Some(error) = response.error {
        let message = error.message.unwrap_or_else(|| "Unknown error".to_string());
        return format!("Error: {message}");
    }

    let Some(result) = response.result else {
        return "No result".to_string();
    };

    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return result.to_string();
    };
    if content.is_empty() {
        return result.to_string();
    }

    let texts: Vec<String> = content
        .iter()
        .filter_map(Value::as_object)
        .map(|block| match block.get("text") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => Value::Object(block.clone()).to_string(),
        })
        .collect();

    if texts.is_empty() {
        Value::Array(content.clone()).to_string()
    } else {
        texts.join("\n")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
