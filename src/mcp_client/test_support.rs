//! In-memory `ToolServer` used by unit tests.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::client::ToolServer;
use super::errors::McpError;
use super::types::McpToolDefinition;

/// Recorded `(tool, arguments)` pairs.
pub type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

pub struct FakeServer {
    name: String,
    advertised: Vec<McpToolDefinition>,
    tools: Vec<McpToolDefinition>,
    reply: String,
    fail_init: bool,
    fail_calls: bool,
    calls: CallLog,
}

impl FakeServer {
    pub fn new(name: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            advertised: tools
                .iter()
                .map(|t| McpToolDefinition {
                    name: t.to_string(),
                    description: None,
                    input_schema: None,
                })
                .collect(),
            tools: Vec::new(),
            reply: "ok".to_string(),
            fail_init: false,
            fail_calls: false,
            calls: CallLog::default(),
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_calls(mut self) -> Self {
        self.fail_calls = true;
        self
    }

    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

impl ToolServer for FakeServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> &[McpToolDefinition] {
        &self.tools
    }

    async fn initialize(&mut self) -> Result<(), McpError> {
        if self.fail_init {
            return Err(McpError::InitFailed {
                name: self.name.clone(),
                reason: "connection refused".into(),
            });
        }
        self.tools = self.advertised.clone();
        Ok(())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        if self.fail_calls {
            return Err(McpError::transport(&self.name, "connection reset"));
        }
        Ok(self.reply.clone())
    }
}
