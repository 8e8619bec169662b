//! Reconstruction of one model turn from streamed deltas.
//!
//! Tool-call fragments are keyed by their stream index, which is stable for
//! one call but may arrive interleaved with other calls and out of order.
//! The assembled message always lists reasoning, then text, then tool uses
//! in ascending index order.

use std::collections::BTreeMap;

use super::{ContentBlock, Message, ToolCall};

/// One incremental piece of a streamed turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(fragment: ToolCallDelta) -> Self {
        Self {
            tool_calls: vec![fragment],
            ..Self::default()
        }
    }

    /// Express a complete turn as a single delta.
    pub fn from_message(message: &Message) -> Self {
        Self {
            content: (!message.content.is_empty()).then(|| message.content.clone()),
            reasoning: message.thinking(),
            tool_calls: message
                .tool_calls
                .iter()
                .enumerate()
                .map(|(index, call)| ToolCallDelta {
                    index: Some(index),
                    id: Some(call.id.clone()),
                    name: Some(call.name.clone()),
                    arguments: Some(call.arguments.clone()),
                })
                .collect(),
        }
    }
}

/// Partial tool call. Only the first fragment of a call usually carries
/// `id` and `name`; later ones carry argument substrings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: Option<usize>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn at(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// Accumulates deltas into a single assistant [`Message`].
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    text: String,
    reasoning: String,
    calls: BTreeMap<usize, ToolCall>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &StreamDelta) {
        if let Some(text) = &delta.content {
            self.text.push_str(text);
        }
        if let Some(reasoning) = &delta.reasoning {
            self.reasoning.push_str(reasoning);
        }
        for fragment in &delta.tool_calls {
            self.push_tool_call(fragment);
        }
    }

    fn push_tool_call(&mut self, fragment: &ToolCallDelta) {
        let Some(index) = fragment.index else {
            tracing::debug!(
                id = fragment.id.as_deref().unwrap_or(""),
                "Ignoring tool call fragment without stream index"
            );
            return;
        };

        let call = self
            .calls
            .entry(index)
            .or_insert_with(|| ToolCall::new(String::new(), String::new(), String::new()));

        if let Some(id) = fragment.id.as_deref().filter(|s| !s.is_empty()) {
            call.id = id.to_string();
        }
        if let Some(name) = fragment.name.as_deref().filter(|s| !s.is_empty()) {
            call.name = name.to_string();
        }
        if let Some(arguments) = &fragment.arguments {
            call.arguments.push_str(arguments);
        }
    }

    /// True if nothing has been accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.reasoning.is_empty() && self.calls.is_empty()
    }

    pub fn finish(self) -> Message {
        let mut blocks = Vec::with_capacity(self.calls.len() + 2);
        if !self.reasoning.is_empty() {
            blocks.push(ContentBlock::Thinking {
                thinking: self.reasoning,
            });
        }
        if !self.text.is_empty() {
            blocks.push(ContentBlock::Text { text: self.text });
        }
        blocks.extend(
            self.calls
                .into_values()
                .map(|call| ContentBlock::ToolUse { call }),
        );
        Message::assistant(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_kinds(message: &Message) -> Vec<String> {
        message
            .blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Thinking { .. } => "thinking".to_string(),
                ContentBlock::Text { .. } => "text".to_string(),
                ContentBlock::ToolUse { call } => format!("tool:{}", call.id),
            })
            .collect()
    }

    fn permutations(items: &[StreamDelta]) -> Vec<Vec<StreamDelta>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn block_order_is_independent_of_arrival_order() {
        let deltas = vec![
            StreamDelta::reasoning("thinking about it"),
            StreamDelta::text("answer"),
            StreamDelta::tool_call(
                ToolCallDelta::at(2)
                    .with_id("c2")
                    .with_name("browser_scroll")
                    .with_arguments("{}"),
            ),
            StreamDelta::tool_call(
                ToolCallDelta::at(0)
                    .with_id("c0")
                    .with_name("browser_observe")
                    .with_arguments("{}"),
            ),
            StreamDelta::tool_call(
                ToolCallDelta::at(1)
                    .with_id("c1")
                    .with_name("browser_search")
                    .with_arguments("{}"),
            ),
        ];

        for order in permutations(&deltas) {
            let mut assembler = ResponseAssembler::new();
            for delta in &order {
                assembler.push(delta);
            }
            let message = assembler.finish();
            assert_eq!(
                block_kinds(&message),
                vec!["thinking", "text", "tool:c0", "tool:c1", "tool:c2"]
            );
            assert_eq!(message.content, "answer");
        }
    }

    #[test]
    fn interleaved_argument_fragments_accumulate_per_index() {
        let mut assembler = ResponseAssembler::new();
        assembler.push(&StreamDelta::tool_call(
            ToolCallDelta::at(2)
                .with_id("call_b")
                .with_name("echo")
                .with_arguments("{\"a\":"),
        ));
        assembler.push(&StreamDelta::tool_call(
            ToolCallDelta::at(0)
                .with_id("call_a")
                .with_name("browser_observe")
                .with_arguments("{\"mode\":"),
        ));
        assembler.push(&StreamDelta::tool_call(
            ToolCallDelta::at(2).with_arguments("1}"),
        ));
        assembler.push(&StreamDelta::tool_call(
            ToolCallDelta::at(0).with_arguments("\"all\"}"),
        ));

        let message = assembler.finish();
        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(
            message.tool_calls[0],
            ToolCall::new("call_a", "browser_observe", "{\"mode\":\"all\"}")
        );
        assert_eq!(message.tool_calls[1], ToolCall::new("call_b", "echo", "{\"a\":1}"));
    }

    #[test]
    fn empty_id_and_name_do_not_overwrite() {
        let mut assembler = ResponseAssembler::new();
        assembler.push(&StreamDelta::tool_call(
            ToolCallDelta::at(0).with_id("call_1").with_name("echo"),
        ));
        assembler.push(&StreamDelta::tool_call(
            ToolCallDelta::at(0)
                .with_id("")
                .with_name("")
                .with_arguments("{}"),
        ));

        let message = assembler.finish();
        assert_eq!(message.tool_calls, vec![ToolCall::new("call_1", "echo", "{}")]);
    }

    #[test]
    fn fragments_without_index_are_ignored() {
        let mut assembler = ResponseAssembler::new();
        assembler.push(&StreamDelta::tool_call(ToolCallDelta {
            index: None,
            id: Some("orphan".to_string()),
            name: Some("echo".to_string()),
            arguments: Some("{}".to_string()),
        }));
        assert!(assembler.is_empty());
        assembler.push(&StreamDelta::text("Hello!"));

        let message = assembler.finish();
        assert!(message.tool_calls.is_empty());
        assert_eq!(message.content, "Hello!");
    }

    #[test]
    fn text_and_reasoning_use_separate_buffers() {
        let mut assembler = ResponseAssembler::new();
        assembler.push(&StreamDelta::text("Hel"));
        assembler.push(&StreamDelta::reasoning("step "));
        assembler.push(&StreamDelta {
            content: Some("lo".to_string()),
            reasoning: Some("one".to_string()),
            tool_calls: Vec::new(),
        });

        let message = assembler.finish();
        assert_eq!(message.content, "Hello");
        assert_eq!(message.thinking().as_deref(), Some("step one"));
    }

    #[test]
    fn from_message_round_trips_through_assembler() {
        let original = Message::assistant(vec![
            ContentBlock::Text {
                text: "calling".to_string(),
            },
            ContentBlock::ToolUse {
                call: ToolCall::new("x", "echo", "{\"msg\":\"hi\"}"),
            },
        ]);
        let mut assembler = ResponseAssembler::new();
        assembler.push(&StreamDelta::from_message(&original));
        assert_eq!(assembler.finish(), original);
    }
}
