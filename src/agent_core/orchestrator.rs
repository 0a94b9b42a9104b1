//! Orchestration loop: drives the model and the tool registry for one run.
//!
//! Each iteration sends the full conversation plus the tool catalogue to the
//! completion service and handles one of three answers:
//!
//! - **Structured tool calls**: every call runs in the order issued, and its
//!   result (or error text) is appended as a tool message tagged to the call.
//!   The loop always continues, even after the terminal tool.
//! - **Text with an inline tool call**: the call runs once. A successful
//!   terminal tool ends the run; anything else is fed back as a user turn.
//! - **Plain text**: the run ends with that text.
//!
//! A failed completion call ends the run with an error text. Running out of
//! iterations ends it with a fixed message. Neither is an `Err`: every run
//! produces a `RunReport`.

use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::conversation::Conversation;
use super::prompts::{diagnostic_prompt, SYSTEM_PROMPT};
use super::types::{AgentSettings, FailureReport, RunOutcome, RunReport};
use crate::inference::tool_call_parser::{extract_tool_call, parse_arguments_lenient};
use crate::inference::CompletionService;
use crate::mcp_client::{ToolRegistry, ToolServer};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Returned when no server contributed any tools.
pub const NO_TOOLS_MESSAGE: &str = "Error: No tools available from MCP servers";

/// Returned when the iteration budget runs out.
pub const MAX_ITERATIONS_MESSAGE: &str = "Agent reached maximum iterations without completing.";

/// Characters of a tool result shown in logs.
const RESULT_PREVIEW_CHARS: usize = 200;

// ─── Run ─────────────────────────────────────────────────────────────────────

/// Diagnose one failing pod.
pub async fn run_agent<L, S>(
    llm: &L,
    registry: &ToolRegistry<S>,
    settings: &AgentSettings,
    report: &FailureReport,
) -> RunReport
where
    L: CompletionService,
    S: ToolServer,
{
    let span = tracing::info_span!(
        "agent_run",
        run_id = %Uuid::new_v4(),
        namespace = %report.namespace,
        pod = %report.pod_name,
    );
    run_loop(llm, registry, settings, report).instrument(span).await
}

async fn run_loop<L, S>(
    llm: &L,
    registry: &ToolRegistry<S>,
    settings: &AgentSettings,
    report: &FailureReport,
) -> RunReport
where
    L: CompletionService,
    S: ToolServer,
{
    let tools = registry.get_all_tools();
    if tools.is_empty() {
        tracing::warn!("no tools available, not calling the model");
        return RunReport {
            outcome: RunOutcome::NoTools,
            result: NO_TOOLS_MESSAGE.to_string(),
            iterations: 0,
            tool_calls: 0,
        };
    }
    let tool_names: Vec<String> = tools.iter().map(|t| t.function.name.clone()).collect();

    let prompt = diagnostic_prompt(report, &settings.issue_owner, &settings.issue_repo);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, &prompt);
    let mut tool_calls = 0usize;

    tracing::info!(
        tools = tools.len(),
        max_iterations = settings.max_iterations,
        prompt_chars = prompt.len(),
        "starting agent loop"
    );

    for iteration in 1..=settings.max_iterations {
        tracing::info!(iteration, "calling language model");

        let message = match llm.complete(conversation.messages(), &tools).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(iteration, error = %e, "language model call failed");
                return RunReport {
                    outcome: RunOutcome::ModelError,
                    result: format!("Error calling language model: {e}"),
                    iterations: iteration,
                    tool_calls,
                };
            }
        };

        // ── Structured tool calls ──────────────────────────────────────

        if !message.tool_calls.is_empty() {
            tracing::info!(
                iteration,
                tool_count = message.tool_calls.len(),
                finish_reason = message.finish_reason.as_deref().unwrap_or("-"),
                "executing structured tool calls"
            );
            conversation.add_assistant_message(&message);

            for call in &message.tool_calls {
                let arguments = parse_arguments_lenient(&call.function.arguments);
                let result = invoke(registry, &call.function.name, arguments)
                    .await
                    .unwrap_or_else(|failure| failure);
                tool_calls += 1;
                conversation.add_tool_result(&call.id, &result);
            }
            continue;
        }

        // ── Text answer ────────────────────────────────────────────────

        let content = message.content.unwrap_or_default();
        let Some(call) = extract_tool_call(&content, Some(&tool_names)) else {
            tracing::info!(iteration, chars = content.len(), "agent completed with final response");
            return RunReport {
                outcome: RunOutcome::Completed,
                result: content,
                iterations: iteration,
                tool_calls,
            };
        };

        tracing::info!(iteration, tool = %call.name, "found inline tool call in text");
        let (result, failed) = match invoke(registry, &call.name, call.arguments).await {
            Ok(result) => {
                let failed = is_error_result(&result);
                (result, failed)
            }
            Err(failure) => (failure, true),
        };
        tool_calls += 1;

        if call.name == settings.terminal_tool && !failed {
            tracing::info!(iteration, tool = %call.name, "terminal tool succeeded, run complete");
            return RunReport {
                outcome: RunOutcome::IssueCreated,
                result: format!("Issue created: {result}"),
                iterations: iteration,
                tool_calls,
            };
        }

        conversation.add_assistant_text(&content);
        conversation.add_user_message(&format!(
            "Tool result:\n{result}\n\nPlease continue with your analysis and create the issue."
        ));
    }

    tracing::warn!(
        max_iterations = settings.max_iterations,
        tool_calls,
        "agent reached maximum iterations"
    );
    RunReport {
        outcome: RunOutcome::MaxIterations,
        result: MAX_ITERATIONS_MESSAGE.to_string(),
        iterations: settings.max_iterations,
        tool_calls,
    }
}

/// Route one call. A server failure comes back as `Err` carrying the error
/// text for the conversation.
async fn invoke<S: ToolServer>(
    registry: &ToolRegistry<S>,
    name: &str,
    arguments: Value,
) -> Result<String, String> {
    tracing::debug!(tool = name, arguments = %arguments, "invoking tool");

    match registry.call_tool(name, arguments).await {
        Ok(result) => {
            tracing::info!(
                tool = name,
                chars = result.len(),
                preview = %preview(&result),
                "tool completed"
            );
            Ok(result)
        }
        Err(e) => {
            tracing::warn!(tool = name, error = %e, "tool call failed");
            Err(format!("Error calling tool: {e}"))
        }
    }
}

/// Whether a tool result reports failure: an `Error:` prefix, or a JSON
/// `"error":` key anywhere (case-insensitive).
pub fn is_error_result(result: &str) -> bool {
    result.starts_with("Error:") || result.to_lowercase().contains("\"error\":")
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(RESULT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
