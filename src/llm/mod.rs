//! Chat model abstraction.
//!
//! The engine talks to a language model exclusively through [`ChatPort`].
//! Every turn comes back as a [`Message`] whose content blocks are in
//! canonical order (reasoning, text, tool uses), whether it was produced by
//! a blocking request or assembled from a stream of deltas.

mod assembler;
mod error;
mod openrouter;
#[cfg(test)]
pub(crate) mod scripted;

pub use assembler::{ResponseAssembler, StreamDelta, ToolCallDelta};
pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};
pub use openrouter::{OpenRouterClient, SseBuffer, SseEvent};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolName;

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
///
/// `name` is kept as emitted; it is only resolved against [`ToolName`] at
/// dispatch time so that a misspelled name becomes an observation rather
/// than a decode failure. `arguments` is the raw JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One typed piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolUse { call: ToolCall },
}

/// One conversational turn.
///
/// `content` always equals the concatenation of the text blocks, and
/// `tool_calls` mirrors the tool-use blocks in order. Both are derived by the
/// constructors, so build messages through them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-role messages: id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool-role messages: name of the tool that produced the observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn text_message(role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        let blocks = if text.is_empty() {
            Vec::new()
        } else {
            vec![ContentBlock::Text { text: text.clone() }]
        };
        Self {
            role,
            content: text,
            blocks,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::text_message(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text_message(Role::User, text)
    }

    /// Build an assistant turn from ordered blocks.
    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in &blocks {
            match block {
                ContentBlock::Text { text } => content.push_str(text),
                ContentBlock::ToolUse { call } => tool_calls.push(call.clone()),
                ContentBlock::Thinking { .. } => {}
            }
        }
        Self {
            role: Role::Assistant,
            content,
            blocks,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    /// Plain-text assistant turn.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::text_message(Role::Assistant, text)
    }

    /// Observation for `call`, keyed by the call's id.
    pub fn tool_result(call: &ToolCall, observation: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::text_message(Role::Tool, observation)
        }
    }

    /// Concatenated reasoning text, if the turn carried any.
    pub fn thinking(&self) -> Option<String> {
        let thinking: String = self
            .blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Thinking { thinking } => Some(thinking.as_str()),
                _ => None,
            })
            .collect();
        (!thinking.is_empty()).then_some(thinking)
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: String,
    /// JSON schema of the argument object
    pub parameters: Value,
}

/// Sampling options for a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl ChatOptions {
    pub fn with_temperature(temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
            ..Self::default()
        }
    }
}

/// Callback invoked for every streamed delta.
pub type ChunkCallback<'a> = dyn Fn(&StreamDelta) + Send + Sync + 'a;

/// Port to a chat-completion model.
///
/// Transport failures and an empty choice list are reported as distinct
/// [`LlmErrorKind`]s.
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Blocking request/response call.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<Message, LlmError>;

    /// Streaming call. `on_chunk` sees every delta as it arrives; the return
    /// value is the fully assembled turn.
    ///
    /// The default implementation performs a blocking call and reports the
    /// whole turn as a single delta.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
        on_chunk: &ChunkCallback<'_>,
    ) -> Result<Message, LlmError> {
        let message = self.chat(messages, tools, options).await?;
        on_chunk(&StreamDelta::from_message(&message));
        Ok(message)
    }
}
