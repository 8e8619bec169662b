//! Scripted chat model for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatOptions, ChatPort, ContentBlock, LlmError, Message, ToolCall, ToolDefinition};
use crate::tools::ToolName;

/// One request as seen by [`ScriptedChat`].
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolName>,
    pub options: ChatOptions,
}

/// Replays queued replies in order and records every request.
///
/// Once the queue is empty, `repeat` (if set) is returned forever; otherwise
/// the call fails with a parse error.
#[derive(Default)]
pub(crate) struct ScriptedChat {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    repeat: Option<Message>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    pub fn with_results(replies: Vec<Result<Message, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn repeating(message: Message) -> Self {
        Self {
            repeat: Some(message),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPort for ScriptedChat {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<Message, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name).collect(),
            options: options.clone(),
        });

        let next = self.replies.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(reply), _) => reply,
            (None, Some(message)) => Ok(message.clone()),
            (None, None) => Err(LlmError::parse_error("script exhausted")),
        }
    }
}

/// Assistant turn that requests the given tool calls.
pub(crate) fn tool_turn(calls: &[(&str, &str, &str)]) -> Message {
    Message::assistant(
        calls
            .iter()
            .map(|(id, name, args)| ContentBlock::ToolUse {
                call: ToolCall::new(*id, *name, *args),
            })
            .collect(),
    )
}
