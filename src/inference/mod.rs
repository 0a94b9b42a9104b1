//! Inference Client: OpenAI-compatible chat completions with tool calling.
//!
//! This module handles all communication with the completion endpoint:
//! - Non-streaming chat completions carrying the tool catalogue
//! - Parsing structured tool calls from the response
//! - Recovering tool calls the model wrote inline as JSON text
//!
//! The client speaks the OpenAI Chat Completions API, so the model behind
//! the proxy is a configuration change, not a code change.

pub mod client;
pub mod errors;
pub mod tool_call_parser;
pub mod types;

// Re-exports for convenience
pub use client::{CompletionService, InferenceClient};
pub use errors::InferenceError;
pub use types::{AssistantMessage, ChatMessage, Role, ToolDefinition, ToolInvocation};
