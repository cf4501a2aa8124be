//! LLM client layer: chat message types, the streaming client trait and the
//! Azure OpenAI implementation.

mod azure;
mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use azure::AzureOpenAiClient;
pub use sse::{data_payloads, parse_chunk};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed stream chunk: {0}")]
    Decode(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single chat message in OpenAI wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant message requesting tool calls. Empty text is sent as `null`.
    pub fn assistant_tool_calls(content: String, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: (!content.is_empty()).then_some(content),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Tool schema advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function",
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// One decoded event from a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Assistant text being streamed.
    TextDelta(String),
    /// A fragment of a tool call; fragments sharing `index` belong together.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// The choice finished (`stop`, `tool_calls`, `length`, ...).
    Finished { reason: String },
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send>>;

/// Streaming chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a streamed completion for `messages`, advertising `tools` when
    /// non-empty.
    async fn chat_completion_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatStream, LlmError>;
}

/// Reassembles streamed tool-call fragments into complete calls.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<(usize, ToolCall)>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, index: usize, id: Option<String>, name: Option<String>, arguments: &str) {
        let pos = match self.calls.iter().position(|(i, _)| *i == index) {
            Some(pos) => pos,
            None => {
                self.calls.push((
                    index,
                    ToolCall {
                        id: String::new(),
                        kind: function_kind(),
                        function: FunctionCall {
                            name: String::new(),
                            arguments: String::new(),
                        },
                    },
                ));
                self.calls.len() - 1
            }
        };
        let call = &mut self.calls[pos].1;
        if let Some(id) = id {
            call.id = id;
        }
        if let Some(name) = name {
            call.function.name.push_str(&name);
        }
        call.function.arguments.push_str(arguments);
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Finished calls ordered by stream index.
    pub fn finish(mut self) -> Vec<ToolCall> {
        self.calls.sort_by_key(|(index, _)| *index);
        self.calls
            .into_iter()
            .enumerate()
            .map(|(n, (_, mut call))| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", n);
                }
                call
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_serialize_in_openai_shape() {
        let user = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(user, json!({"role": "user", "content": "hi"}));

        let tool = serde_json::to_value(ChatMessage::tool("call_1", "{}")).unwrap();
        assert_eq!(
            tool,
            json!({"role": "tool", "content": "{}", "tool_call_id": "call_1"})
        );

        let call = ToolCall {
            id: "call_1".to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: "get_user_profile".to_string(),
                arguments: "{}".to_string(),
            },
        };
        let assistant =
            serde_json::to_value(ChatMessage::assistant_tool_calls(String::new(), vec![call])).unwrap();
        assert_eq!(assistant["content"], Value::Null);
        assert_eq!(assistant["tool_calls"][0]["type"], "function");
        assert_eq!(assistant["tool_calls"][0]["function"]["name"], "get_user_profile");
    }

    #[test]
    fn accumulator_joins_fragments_by_index() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(1, Some("call_b".into()), Some("get_issues".into()), "");
        acc.push(0, Some("call_a".into()), Some("get_repository".into()), "{\"owner\":");
        acc.push(0, None, None, "\"rust-lang\"}");
        acc.push(1, None, None, "{}");

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "get_repository");
        assert_eq!(calls[0].function.arguments, "{\"owner\":\"rust-lang\"}");
        assert_eq!(calls[1].function.name, "get_issues");
        assert_eq!(calls[1].function.arguments, "{}");
    }

    #[test]
    fn accumulator_fills_missing_ids() {
        let mut acc = ToolCallAccumulator::default();
        acc.push(0, None, Some("get_user_profile".into()), "{}");
        assert_eq!(acc.finish()[0].id, "call_0");
    }
}
