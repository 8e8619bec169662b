//! OpenRouter (OpenAI-compatible) chat adapter.
//!
//! Blocking requests are retried on transient failures. Streaming requests
//! are consumed as server-sent events on the calling task and are never
//! retried, since deltas may already have been reported to the caller.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

use super::assembler::{ResponseAssembler, StreamDelta, ToolCallDelta};
use super::error::{LlmError, RetryConfig};
use super::{ChatOptions, ChatPort, ChunkCallback, ContentBlock, Message, Role, ToolDefinition};
use crate::config::Config;

use crate::config::DEFAULT_BASE_URL;

/// OpenRouter API client.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry_config: RetryConfig,
}

impl OpenRouterClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            retry_config: RetryConfig::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_key.clone(), config.default_model.clone())
            .with_base_url(config.base_url.clone())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
        stream: bool,
    ) -> WireRequest {
        WireRequest {
            model: self.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream,
        }
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Send the request and turn connection failures and non-success
    /// statuses into [`LlmError`]s.
    async fn send(&self, request: &WireRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://github.com/browser-agent")
            .header("X-Title", "browser-agent")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network_error(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    LlmError::network_error(format!("Connection failed: {}", e))
                } else {
                    LlmError::network_error(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = Self::parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(LlmError::from_status(status.as_u16(), &body, retry_after))
    }

    async fn execute_request(&self, request: &WireRequest) -> Result<Message, LlmError> {
        let body = self
            .send(request)
            .await?
            .text()
            .await
            .map_err(|e| LlmError::network_error(format!("Failed to read body: {}", e)))?;

        let parsed: WireResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::parse_error(format!("Failed to parse response: {}, body: {}", e, body))
        })?;
        parsed.into_message()
    }

    async fn execute_with_retry(&self, request: &WireRequest) -> Result<Message, LlmError> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match self.execute_request(request).await {
                Ok(message) => {
                    if attempt > 0 {
                        tracing::info!(
                            attempts = attempt + 1,
                            elapsed = ?start.elapsed(),
                            "Chat request succeeded after retry"
                        );
                    }
                    return Ok(message);
                }
                Err(error) => error,
            };

            let remaining = self
                .retry_config
                .max_retry_duration
                .saturating_sub(start.elapsed());
            let delay = error.suggested_delay(attempt).min(remaining);

            if !self.retry_config.should_retry(&error)
                || attempt >= self.retry_config.max_retries
                || delay.is_zero()
            {
                tracing::error!(attempts = attempt + 1, "Chat request failed: {}", error);
                return Err(error);
            }

            tracing::warn!(
                attempt = attempt + 1,
                kind = %error.kind,
                delay = ?delay,
                "Chat request failed, retrying: {}",
                error.message
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn execute_stream(
        &self,
        request: &WireRequest,
        on_chunk: &ChunkCallback<'_>,
    ) -> Result<Message, LlmError> {
        let response = self.send(request).await?;
        let mut bytes = response.bytes_stream();
        let mut sse = SseBuffer::default();
        let mut assembler = ResponseAssembler::new();
        let mut saw_choice = false;

        'read: while let Some(chunk) = bytes.next().await {
            let chunk =
                chunk.map_err(|e| LlmError::stream_error(format!("Stream interrupted: {}", e)))?;
            for event in sse.feed(&chunk) {
                match event {
                    SseEvent::Done => break 'read,
                    SseEvent::Data(payload) => {
                        saw_choice |= apply_stream_payload(&payload, &mut assembler, on_chunk)?;
                    }
                }
            }
        }

        // A server that closes without [DONE] may leave an unterminated line.
        if let Some(SseEvent::Data(payload)) = sse.finish() {
            saw_choice |= apply_stream_payload(&payload, &mut assembler, on_chunk)?;
        }

        if !saw_choice {
            return Err(LlmError::empty_response());
        }
        Ok(assembler.finish())
    }
}

#[async_trait]
impl ChatPort for OpenRouterClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<Message, LlmError> {
        let request = self.build_request(messages, tools, options, false);
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat request"
        );
        self.execute_with_retry(&request).await
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
        on_chunk: &ChunkCallback<'_>,
    ) -> Result<Message, LlmError> {
        let request = self.build_request(messages, tools, options, true);
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending streaming chat request"
        );
        self.execute_stream(&request, on_chunk).await
    }
}

/// Feed one SSE `data:` payload into the assembler. Returns whether the
/// payload carried at least one choice.
fn apply_stream_payload(
    payload: &str,
    assembler: &mut ResponseAssembler,
    on_chunk: &ChunkCallback<'_>,
) -> Result<bool, LlmError> {
    let chunk: WireStreamChunk = serde_json::from_str(payload).map_err(|e| {
        LlmError::parse_error(format!("Failed to parse stream chunk: {}, data: {}", e, payload))
    })?;

    if let Some(error) = chunk.error {
        return Err(LlmError::stream_error(error.message));
    }

    let mut saw_choice = false;
    for choice in chunk.choices {
        saw_choice = true;
        let delta = choice.delta.into_delta();
        assembler.push(&delta);
        on_chunk(&delta);
    }
    Ok(saw_choice)
}

// ============================================================================
// Server-sent events
// ============================================================================

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line buffer that turns raw network chunks into SSE data events.
///
/// Chunks may split lines (and multi-byte characters) anywhere, so bytes are
/// held until a newline arrives.
#[derive(Debug, Default)]
pub struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = parse_sse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.pending);
        parse_sse_line(&String::from_utf8_lossy(&line))
    }
}

fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    // comments (": OPENROUTER PROCESSING") and non-data fields
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(data.to_string()))
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        // The API has no reasoning input field, so prior reasoning is
        // replayed inline ahead of the visible text.
        let mut content = String::new();
        if message.role == Role::Assistant {
            for block in &message.blocks {
                if let ContentBlock::Thinking { thinking } = block {
                    content.push_str(&format!("<thinking>\n{}\n</thinking>\n", thinking));
                }
            }
        }
        content.push_str(&message.content);

        let tool_calls: Vec<WireToolCall> = message
            .tool_calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                call_type: "function".to_string(),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect();

        Self {
            role: message.role,
            content: (!content.is_empty() || tool_calls.is_empty()).then_some(content),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
            name: message.name.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: WireFunction {
                name: def.name.to_string(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

impl WireResponse {
    fn into_message(self) -> Result<Message, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(LlmError::empty_response)?;

        let message = choice.message;
        let delta = StreamDelta {
            content: message.content,
            reasoning: message.reasoning,
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .map(|(index, call)| ToolCallDelta {
                    index: Some(index),
                    id: Some(call.id),
                    name: Some(call.function.name),
                    arguments: Some(call.function.arguments),
                })
                .collect(),
        };

        let mut assembler = ResponseAssembler::new();
        assembler.push(&delta);
        Ok(assembler.finish())
    }
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    reasoning: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    error: Option<WireStreamError>,
}

#[derive(Debug, Deserialize)]
struct WireStreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCallDelta>,
}

impl WireDelta {
    fn into_delta(self) -> StreamDelta {
        StreamDelta {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls: self
                .tool_calls
                .into_iter()
                .map(|fragment| {
                    let function = fragment.function.unwrap_or_default();
                    ToolCallDelta {
                        index: fragment.index,
                        id: fragment.id,
                        name: function.name,
                        arguments: function.arguments,
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct WireFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, ToolCall};
    use std::sync::Mutex;

    #[test]
    fn sse_buffer_handles_split_lines() {
        let mut sse = SseBuffer::default();
        assert!(sse.feed(b": OPENROUTER PROCESSING\n\nda").is_empty());
        assert!(sse.feed(b"ta: {\"a\"").is_empty());
        let events = sse.feed(b":1}\r\n\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
        assert!(sse.finish().is_none());
    }

    #[test]
    fn sse_buffer_flushes_unterminated_line() {
        let mut sse = SseBuffer::default();
        assert!(sse.feed("data: {\"t\":\"é".as_bytes()).is_empty());
        assert_eq!(
            sse.finish(),
            Some(SseEvent::Data("{\"t\":\"é".to_string()))
        );
    }

    #[test]
    fn response_without_choices_is_empty_response() {
        let parsed: WireResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let err = parsed.into_message().unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::EmptyResponse);
    }

    #[test]
    fn response_is_assembled_in_canonical_order() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": "Navigating",
                    "reasoning": "need the page",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "browser_navigate", "arguments": "{\"url\":\"https://example.com\"}"}
                    }]
                }
            }]
        }"#;
        let parsed: WireResponse = serde_json::from_str(body).unwrap();
        let message = parsed.into_message().unwrap();

        assert_eq!(message.content, "Navigating");
        assert_eq!(message.thinking().as_deref(), Some("need the page"));
        assert_eq!(
            message.tool_calls,
            vec![ToolCall::new(
                "call_1",
                "browser_navigate",
                "{\"url\":\"https://example.com\"}"
            )]
        );
        assert!(matches!(message.blocks[0], ContentBlock::Thinking { .. }));
    }

    #[test]
    fn stream_payloads_feed_assembler_and_callback() {
        let seen = Mutex::new(Vec::new());
        let on_chunk = |delta: &StreamDelta| {
            seen.lock().unwrap().push(delta.clone());
        };
        let mut assembler = ResponseAssembler::new();

        let payloads = [
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"echo","arguments":"{\"msg\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"hi\"}"}}]}}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":3}}"#,
        ];
        let mut saw_choice = false;
        for payload in payloads {
            saw_choice |= apply_stream_payload(payload, &mut assembler, &on_chunk).unwrap();
        }

        assert!(saw_choice);
        assert_eq!(seen.lock().unwrap().len(), 2);
        let message = assembler.finish();
        assert_eq!(
            message.tool_calls,
            vec![ToolCall::new("c1", "echo", "{\"msg\":\"hi\"}")]
        );
    }

    #[test]
    fn stream_error_payload_is_stream_error() {
        let mut assembler = ResponseAssembler::new();
        let err = apply_stream_payload(
            r#"{"error":{"message":"upstream overloaded"}}"#,
            &mut assembler,
            &|_: &StreamDelta| {},
        )
        .unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::StreamError);
        assert!(err.message.contains("overloaded"));
    }

    #[test]
    fn assistant_thinking_is_replayed_inline() {
        let message = Message::assistant(vec![
            ContentBlock::Thinking {
                thinking: "look first".to_string(),
            },
            ContentBlock::ToolUse {
                call: ToolCall::new("c1", "browser_observe", "{}"),
            },
        ]);
        let wire = WireMessage::from(&message);
        assert_eq!(
            wire.content.as_deref(),
            Some("<thinking>\nlook first\n</thinking>\n")
        );
        assert_eq!(wire.tool_calls.len(), 1);

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn tool_only_assistant_message_omits_content() {
        let message = Message::assistant(vec![ContentBlock::ToolUse {
            call: ToolCall::new("c1", "browser_observe", "{}"),
        }]);
        let json = serde_json::to_value(WireMessage::from(&message)).unwrap();
        assert!(json.get("content").is_none());
    }

    #[test]
    fn request_omits_tools_when_none_are_offered() {
        let client = OpenRouterClient::new("key", "test/model");
        let request = client.build_request(
            &[Message::user("hi")],
            &[],
            &ChatOptions::with_temperature(0.0),
            false,
        );
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
        assert!(json.get("stream").is_none());
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(client.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }
}
