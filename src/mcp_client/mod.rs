//! MCP Client: JSON-RPC over HTTP for remote tool servers.
//!
//! This module handles:
//! - The request/response ("streamable-http") and event-stream ("sse") transports
//! - The per-server handshake and tool discovery
//! - Tool call execution and reduction of results to text
//! - Aggregation and name routing across servers
//!
//! The registry is used by the orchestration loop to dispatch tool calls
//! requested by the language model.

pub mod client;
pub mod errors;
pub mod registry;
pub mod sse;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use client::{McpClient, ToolServer};
pub use errors::McpError;
pub use registry::ToolRegistry;
pub use transport::TransportKind;
pub use types::McpToolDefinition;
