//! Shared types for the agent core.
//!
//! The inbound failure report, run settings, and the report returned by one
//! orchestration run.

use serde::{Deserialize, Serialize};

/// Iteration budget for one run.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Tool whose successful textual invocation ends a run.
pub const DEFAULT_TERMINAL_TOOL: &str = "create_issue";

// ─── Failure report ─────────────────────────────────────────────────────────

/// A failing pod to diagnose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub namespace: String,
    pub pod_name: String,
    #[serde(default)]
    pub container_name: Option<String>,
}

impl FailureReport {
    /// Names the first required field that is empty or whitespace.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.namespace.trim().is_empty() {
            Some("namespace")
        } else if self.pod_name.trim().is_empty() {
            Some("pod_name")
        } else {
            None
        }
    }

    /// Container name, if one was given and is non-empty.
    pub fn container(&self) -> Option<&str> {
        self.container_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

// ─── Settings ───────────────────────────────────────────────────────────────

/// Per-run behaviour of the orchestration loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub terminal_tool: String,
    /// Issue tracker owner placed in the diagnostic prompt.
    pub issue_owner: String,
    /// Issue tracker repository placed in the diagnostic prompt.
    pub issue_repo: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            terminal_tool: DEFAULT_TERMINAL_TOOL.to_string(),
            issue_owner: "user1".to_string(),
            issue_repo: "mcp".to_string(),
        }
    }
}

// ─── Run report ─────────────────────────────────────────────────────────────

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The model answered with text that carried no tool call.
    Completed,
    /// The terminal tool succeeded via the textual path.
    IssueCreated,
    /// No tools were available, so the model was never called.
    NoTools,
    /// The completion call failed.
    ModelError,
    /// The iteration budget ran out.
    MaxIterations,
}

/// Result of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Final text handed back to the caller.
    pub result: String,
    /// Completion calls made.
    pub iterations: usize,
    /// Tool invocations routed through the registry.
    pub tool_calls: usize,
}
