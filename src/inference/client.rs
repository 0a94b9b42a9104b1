//! OpenAI-compatible completion client.
//!
//! Sends non-streaming chat completion requests, with the tool catalogue
//! attached, to a LiteLLM-style proxy or any OpenAI-compatible endpoint.

use std::future::Future;
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::errors::InferenceError;
use super::types::{
    AssistantMessage, ChatCompletionRequest, ChatMessage, FunctionCallResponse, ToolCallResponse,
    ToolDefinition,
};
use crate::config::ModelConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total request timeout. Remote models with a long conversation and a full
/// tool catalogue can take well over 30s to answer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider prefix used by LiteLLM model identifiers.
const PROVIDER_PREFIX: &str = "openai/";

// ─── CompletionService ───────────────────────────────────────────────────────

/// A chat completion backend that supports function calling.
pub trait CompletionService: Send + Sync {
    /// Send the full conversation plus tool catalogue; return the assistant
    /// message from the first choice.
    fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> impl Future<Output = Result<AssistantMessage, InferenceError>> + Send;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for the completion endpoint.
pub struct InferenceClient {
    http: HttpClient,
    /// Full `…/chat/completions` URL.
    endpoint: String,
    api_key: Option<String>,
    /// Model name as sent on the wire (provider prefix removed).
    model: String,
}

impl InferenceClient {
    /// Create a client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn new(config: &ModelConfig) -> Result<Self, InferenceError> {
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: endpoint.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            model: wire_model_name(&config.model).to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

impl CompletionService for InferenceClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<AssistantMessage, InferenceError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            tools: (!tools.is_empty()).then_some(tools),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            stream: false,
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "sending chat completion"
        );

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: REQUEST_TIMEOUT.as_secs(),
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: self.endpoint.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::ResponseError {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_response(&body_text)
    }
}

/// Strip the LiteLLM provider prefix: the base URL already selects the
/// provider, so the endpoint expects the bare model name.
fn wire_model_name(model: &str) -> &str {
    model.strip_prefix(PROVIDER_PREFIX).unwrap_or(model)
}

// ─── Response parsing ────────────────────────────────────────────────────────

/// Parse a non-streaming completion body into the first choice's message.
///
/// Tool call arguments are kept as the raw strings the model produced; a
/// backend that sends them as a JSON value instead gets that value's JSON
/// text. Calls without an `id` get a generated one.
pub fn parse_completion_response(body: &str) -> Result<AssistantMessage, InferenceError> {
    #[derive(Deserialize)]
    struct CompletionResponse {
        #[serde(default)]
        choices: Vec<CompletionChoice>,
    }

    #[derive(Deserialize)]
    struct CompletionChoice {
        message: CompletionMessage,
        #[serde(default)]
        finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct CompletionMessage {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        tool_calls: Option<Vec<CompletionToolCall>>,
    }

    #[derive(Deserialize)]
    struct CompletionToolCall {
        #[serde(default)]
        id: Option<String>,
        function: CompletionFunction,
    }

    #[derive(Deserialize)]
    struct CompletionFunction {
        name: String,
        #[serde(default)]
        arguments: Option<Value>,
    }

    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::ResponseError {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::ResponseError {
            reason: "empty choices array".into(),
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallResponse {
            id: tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            r#type: "function".to_string(),
            function: FunctionCallResponse {
                name: tc.function.name,
                arguments: match tc.function.arguments {
                    Some(Value::String(raw)) => raw,
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                },
            },
        })
        .collect();

    Ok(AssistantMessage {
        content: choice.message.content.filter(|c| !c.is_empty()),
        tool_calls,
        finish_reason: choice.finish_reason,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
