//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed {
        name: String,
        reason: String,
    },

    /// HTTP-level communication error (connect, send, body read).
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// Server answered with a non-success HTTP status.
    #[error("server '{server}' returned HTTP {status}: {body}")]
    HttpStatus {
        server: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded as a JSON-RPC envelope.
    #[error("invalid response from server '{server}': {reason}")]
    InvalidResponse {
        server: String,
        reason: String,
    },

    /// No event arrived on the stream within the allotted time.
    #[error("server '{server}' sent no response to '{method}' within {timeout_secs}s")]
    Timeout {
        server: String,
        method: String,
        timeout_secs: u64,
    },

    /// The event stream closed before the awaited event arrived.
    #[error("event stream for server '{server}' closed while awaiting '{method}'")]
    StreamClosed {
        server: String,
        method: String,
    },

    /// Configuration error (bad URL, unknown transport).
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl McpError {
    pub(crate) fn transport(server: &str, reason: impl std::fmt::Display) -> Self {
        McpError::TransportError {
            server: server.to_string(),
            reason: reason.to_string(),
        }
    }
}
