//! OpenAI-compatible backend client.
//!
//! Works with DeepSeek, OpenAI, OpenRouter, Ollama, vLLM, and any other
//! endpoint that exposes `/v1/chat/completions`. Translates the internal
//! content-block message model to and from the chat-completion wire format:
//!
//! - string-content messages pass through unchanged
//! - an assistant block list becomes one assistant message with a
//!   `tool_calls[]` array
//! - a user block list of tool results becomes separate `role: "tool"`
//!   messages, one per result
//! - the soul's system prompt is prepended as a system message
//!
//! The response's `choices[0].finish_reason` is surfaced as the stop
//! reason; `tool_calls` tells the agent loop to execute tools and continue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchboard_core::{
    Backend, BackendError, ChatMessage, CompletionRequest, CompletionResponse, ContentBlock,
    MessageContent, Role, ToolDescriptor,
};
use tracing::{debug, warn};

/// An OpenAI-compatible chat-completion backend.
pub struct OpenAiBackend {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new backend client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| BackendError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create a DeepSeek backend (convenience constructor).
    pub fn deepseek(api_key: impl Into<String>) -> Result<Self, BackendError> {
        Self::new("deepseek", "https://api.deepseek.com/v1", api_key)
    }

    /// Convert internal messages to the wire format.
    fn to_api_messages(system: Option<&str>, messages: &[ChatMessage]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system {
            out.push(ApiMessage {
                role: "system".into(),
                content: Some(system.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for message in messages {
            match (&message.role, &message.content) {
                (Role::User, MessageContent::Text(text)) => out.push(ApiMessage {
                    role: "user".into(),
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                (Role::Assistant, MessageContent::Text(text)) => out.push(ApiMessage {
                    role: "assistant".into(),
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                (Role::Assistant, MessageContent::Blocks(blocks)) => {
                    let text = switchboard_core::content::concat_text(blocks);
                    let tool_calls: Vec<ApiToolCall> = blocks
                        .iter()
                        .filter_map(|b| match b {
                            ContentBlock::ToolUse { id, name, input } => Some(ApiToolCall {
                                id: id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: name.clone(),
                                    arguments: input.to_string(),
                                },
                            }),
                            _ => None,
                        })
                        .collect();

                    out.push(ApiMessage {
                        role: "assistant".into(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    });
                }
                (Role::User, MessageContent::Blocks(blocks)) => {
                    // Tool results travel as separate role=tool messages
                    for block in blocks {
                        match block {
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                            } => out.push(ApiMessage {
                                role: "tool".into(),
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            }),
                            ContentBlock::Text { text } => out.push(ApiMessage {
                                role: "user".into(),
                                content: Some(text.clone()),
                                tool_calls: None,
                                tool_call_id: None,
                            }),
                            ContentBlock::ToolUse { .. } => {}
                        }
                    }
                }
            }
        }

        out
    }

    /// Convert tool descriptors to the wire format.
    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Convert a wire response choice into content blocks + stop reason.
    fn from_api_choice(choice: ApiChoice) -> CompletionResponse {
        let mut blocks = Vec::new();

        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                blocks.push(ContentBlock::Text { text });
            }
        }

        for tc in choice.message.tool_calls.unwrap_or_default() {
            let input = serde_json::from_str(&tc.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            blocks.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }

        CompletionResponse {
            blocks,
            stop_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system.as_deref(), &request.messages),
            "max_tokens": request.max_tokens,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] =
                serde_json::json!(request.tool_choice.as_deref().unwrap_or("auto"));
        }

        debug!(backend = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(BackendError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend returned error");
            return Err(BackendError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::MalformedResponse("No choices in response".into()))?;

        Ok(Self::from_api_choice(choice))
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}
