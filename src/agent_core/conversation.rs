//! Conversation: the ordered message history of one orchestration run.
//!
//! Append-only while the run is in progress and dropped when it ends; nothing
//! is persisted across runs.

use crate::inference::types::{AssistantMessage, ChatMessage};

/// Role-tagged messages sent with every completion call.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Start a conversation with a system prompt and the task prompt.
    pub fn new(system_prompt: &str, task_prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(task_prompt)],
        }
    }

    /// Append the assistant turn verbatim, structured tool calls included.
    pub fn add_assistant_message(&mut self, message: &AssistantMessage) {
        self.messages.push(ChatMessage::from_assistant(message));
    }

    pub fn add_assistant_text(&mut self, text: &str) {
        self.messages.push(ChatMessage::assistant(text));
    }

    pub fn add_user_message(&mut self, text: &str) {
        self.messages.push(ChatMessage::user(text));
    }

    /// Append a tool result tagged to the structured call that produced it.
    pub fn add_tool_result(&mut self, tool_call_id: &str, result: &str) {
        self.messages.push(ChatMessage::tool_result(tool_call_id, result));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
