//! Message and content-block domain types.
//!
//! These are the core value objects that flow through the entire system:
//! a channel receives user text → the agent loop builds `ChatMessage`
//! history → the backend client converts it to the wire format → the
//! session store replays transcripts back into the same shape.

use serde::{Deserialize, Serialize};

/// The role of a message in a conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (also carries tool results back to the model)
    User,
    /// The model
    Assistant,
}

/// A typed piece of a message.
///
/// The `type` discriminator is part of both the storage format (transcript
/// entries) and the wire format (chat-completion requests), so the tag set
/// is closed: `text`, `tool_use`, `tool_result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain model or user text
    Text { text: String },

    /// A structured tool invocation requested by the model
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The result of executing a tool, keyed back to its request
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }
}

/// Message content is either plain text or an ordered block list.
///
/// Storage and the wire both infer the variant from JSON shape, so this is
/// untagged: a string deserializes as `Text`, an array as `Blocks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Concatenated text of all `Text` blocks (or the plain string itself).
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => concat_text(blocks),
        }
    }
}

/// A single message in a conversation history.
///
/// Invariant: an assistant message whose last block is a `ToolUse` must be
/// immediately followed by a user message whose content starts with the
/// matching `ToolResult` blocks, one per outstanding id, in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Create a plain-text user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create an assistant message from content blocks.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Create the user message that carries tool results back to the model.
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// The tool_use blocks of this message, in order.
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks.iter().filter(|b| b.is_tool_use()).collect(),
        }
    }
}

/// Concatenated text of all `Text` blocks in a block list.
pub fn concat_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}
