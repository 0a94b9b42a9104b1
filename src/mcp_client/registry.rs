//! Tool registry: aggregates tool servers behind one name-routed surface.
//!
//! Provides:
//! - Server registration (last registration for a name wins)
//! - Failure-isolated initialization of every server
//! - Tool name → server routing (last initialized server wins on collision)
//! - The function-calling schema sent to the completion service

use std::collections::HashMap;

use serde_json::Value;

use super::client::{McpClient, ToolServer};
use super::errors::McpError;
use crate::inference::types::{FunctionDefinition, ToolDefinition};

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Aggregated tool catalogue across every configured server.
///
/// Built once at startup and read-only while handling requests.
pub struct ToolRegistry<S = McpClient> {
    /// Servers in registration order.
    clients: Vec<S>,
    /// `tool_name → index into clients`.
    tool_to_client: HashMap<String, usize>,
    /// Servers whose initialization failed; they contribute no tools.
    unavailable: Vec<String>,
}

impl<S> Default for ToolRegistry<S> {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            tool_to_client: HashMap::new(),
            unavailable: Vec::new(),
        }
    }
}

impl<S: ToolServer> ToolRegistry<S> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server under its name. A server already registered under
    /// the same name is replaced.
    pub fn add_client(&mut self, client: S) {
        match self.clients.iter().position(|c| c.name() == client.name()) {
            Some(index) => {
                tracing::debug!(server = client.name(), "replacing registered server");
                self.clients[index] = client;
            }
            None => self.clients.push(client),
        }
    }

    /// Initialize every server, then rebuild the routing index.
    ///
    /// A server whose handshake fails is marked unavailable and contributes
    /// no tools; the remaining servers are still initialized. Returns the
    /// failures.
    pub async fn initialize_all(&mut self) -> Vec<(String, McpError)> {
        let mut failures = Vec::new();
        self.unavailable.clear();

        for client in &mut self.clients {
            if let Err(e) = client.initialize().await {
                tracing::warn!(server = client.name(), error = %e, "MCP server unavailable");
                self.unavailable.push(client.name().to_string());
                failures.push((client.name().to_string(), e));
            }
        }

        self.tool_to_client.clear();
        for (index, client) in self.clients.iter().enumerate() {
            if self.unavailable.iter().any(|n| n == client.name()) {
                continue;
            }
            for tool in client.tools() {
                if let Some(previous) = self.tool_to_client.insert(tool.name.clone(), index) {
                    tracing::debug!(
                        tool = %tool.name,
                        previous = self.clients[previous].name(),
                        server = client.name(),
                        "tool name collision, later server wins"
                    );
                }
            }
        }

        tracing::info!(
            servers = self.clients.len(),
            unavailable = self.unavailable.len(),
            tools = self.tool_to_client.len(),
            "tool registry initialized"
        );
        failures
    }

    /// Function-calling schema for every routable tool.
    ///
    /// One entry per tool name, in first-seen order; on a name collision the
    /// later server's descriptor replaces the earlier one in place.
    pub fn get_all_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for client in self.available_clients() {
            for tool in client.tools() {
                let definition = ToolDefinition {
                    r#type: "function".to_string(),
                    function: FunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone().unwrap_or_default(),
                        parameters: tool
                            .input_schema
                            .clone()
                            .unwrap_or_else(empty_object_schema),
                    },
                };
                match positions.get(&tool.name) {
                    Some(&at) => tools[at] = definition,
                    None => {
                        positions.insert(tool.name.clone(), tools.len());
                        tools.push(definition);
                    }
                }
            }
        }
        tools
    }

    /// Names of all routable tools, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tool_to_client.keys().cloned().collect();
        names.sort();
        names
    }

    /// Name of the server a tool routes to.
    pub fn server_for_tool(&self, tool_name: &str) -> Option<&str> {
        self.tool_to_client
            .get(tool_name)
            .map(|&i| self.clients[i].name())
    }

    /// Servers whose last initialization failed.
    pub fn unavailable_servers(&self) -> &[String] {
        &self.unavailable
    }

    /// Number of routable tools.
    pub fn len(&self) -> usize {
        self.tool_to_client.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tool_to_client.is_empty()
    }

    /// Route a call to the owning server.
    ///
    /// An unknown name yields `Ok("Error: Unknown tool '<name>'")` without
    /// contacting any server. Server failures propagate as `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, McpError> {
        let Some(&index) = self.tool_to_client.get(name) else {
            tracing::warn!(tool = name, "unknown tool");
            return Ok(format!("Error: Unknown tool '{name}'"));
        };

        let client = &self.clients[index];
        tracing::info!(tool = name, server = client.name(), "routing tool call");
        client.call_tool(name, arguments).await
    }

    fn available_clients(&self) -> impl Iterator<Item = &S> {
        self.clients
            .iter()
            .filter(|c| !self.unavailable.iter().any(|n| n == c.name()))
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

// ─── Tests ───────────────────────────────────────────────────────────────────
