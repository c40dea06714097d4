//! Backend trait — the abstraction over the chat-completion service.
//!
//! A Backend knows how to send a conversation (plus tool descriptors) to a
//! chat-completion endpoint and return the response as content blocks with
//! a stop reason. The agent loop drives it without knowing which endpoint
//! is configured.

use crate::content::{ChatMessage, ContentBlock};
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A request to the chat-completion backend.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The model to use (e.g. "deepseek-chat")
    pub model: String,

    /// System prompt, prepended on the wire as a system message
    pub system: Option<String>,

    /// The conversation history
    pub messages: Vec<ChatMessage>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Tools the model may call
    pub tools: Vec<ToolDescriptor>,

    /// Tool-choice policy ("auto" when tools are present)
    pub tool_choice: Option<String>,
}

/// A complete response from the backend.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The response content as ordered blocks (text and/or tool_use)
    pub blocks: Vec<ContentBlock>,

    /// The backend's stop reason. `"tool_calls"` means the agent loop must
    /// execute tools and continue.
    pub stop_reason: String,
}

impl CompletionResponse {
    /// Whether this response asks for tool execution.
    pub fn wants_tools(&self) -> bool {
        self.stop_reason == "tool_calls" && self.blocks.iter().any(|b| b.is_tool_use())
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        crate::content::concat_text(&self.blocks)
    }
}

/// The core Backend trait.
///
/// Implementations: the OpenAI-compatible HTTP client, and scripted mocks
/// in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend (e.g. "deepseek").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wants_tools_requires_both_signals() {
        let with_tools = CompletionResponse {
            blocks: vec![ContentBlock::tool_use("t1", "shell", serde_json::json!({}))],
            stop_reason: "tool_calls".into(),
        };
        assert!(with_tools.wants_tools());

        // stop_reason alone is not enough
        let no_blocks = CompletionResponse {
            blocks: vec![ContentBlock::text("done")],
            stop_reason: "tool_calls".into(),
        };
        assert!(!no_blocks.wants_tools());

        let stopped = CompletionResponse {
            blocks: vec![ContentBlock::tool_use("t1", "shell", serde_json::json!({}))],
            stop_reason: "stop".into(),
        };
        assert!(!stopped.wants_tools());
    }

    #[test]
    fn response_text_concatenates() {
        let resp = CompletionResponse {
            blocks: vec![ContentBlock::text("hello "), ContentBlock::text("world")],
            stop_reason: "stop".into(),
        };
        assert_eq!(resp.text(), "hello world");
    }
}
