//! Task-execution loop - the reasoning/tool-call cycle shared by every agent.
//!
//! # Algorithm
//! 1. Start the transcript with the system prompt and the user task
//! 2. Send the transcript and tool definitions to the model
//! 3. If the turn requests tools: run them in order, append observations
//! 4. Repeat until a turn requests no tools or the iteration ceiling is hit
//!
//! Unknown tools and tool failures become `Error: ...` observations so the
//! model can correct itself. Only transport errors, cancellation and the
//! ceiling end the loop early.

use std::sync::Arc;

use async_trait::async_trait;

use super::context::{AgentContext, AgentEvent};
use super::types::{AgentError, ExecutionResult};
use super::TaskExecutor;
use crate::llm::{Message, StreamDelta, ToolCall, ToolDefinition};
use crate::tools::{ToolName, ToolRegistry, ToolSet};
use crate::util::truncate_observation;

pub const DEFAULT_MAX_OBSERVATION_LEN: usize = 20_000;

/// Phase of a running loop, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    AwaitingModel,
    DispatchingTools,
    Done,
    Failed,
}

/// How [`TaskLoop::drive`] ended without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Answered(ExecutionResult),
    /// The ceiling was reached while the model was still calling tools.
    Exhausted,
}

/// Result of [`TaskLoop::run`], with the transcript that produced it.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub result: ExecutionResult,
    pub transcript: Vec<Message>,
}

/// Iteration-bounded reasoning loop.
#[derive(Debug, Clone)]
pub struct TaskLoop {
    label: String,
    max_iterations: usize,
    max_observation_len: usize,
    streaming: bool,
}

impl TaskLoop {
    /// `label` names the agent in logs and events.
    pub fn new(label: impl Into<String>, max_iterations: usize) -> Self {
        Self {
            label: label.into(),
            max_iterations,
            max_observation_len: DEFAULT_MAX_OBSERVATION_LEN,
            streaming: false,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_max_observation_len(mut self, max_observation_len: usize) -> Self {
        self.max_observation_len = max_observation_len;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run a fresh conversation. Hitting the ceiling is an error.
    pub async fn run(
        &self,
        ctx: &AgentContext,
        tools: &dyn ToolSet,
        system_prompt: &str,
        task: &str,
    ) -> Result<LoopOutcome, AgentError> {
        let mut transcript = vec![Message::system(system_prompt), Message::user(task)];
        match self.drive(ctx, tools, &mut transcript).await? {
            LoopExit::Answered(result) => Ok(LoopOutcome { result, transcript }),
            LoopExit::Exhausted => Err(AgentError::MaxIterations(self.max_iterations)),
        }
    }

    /// Run the loop over a caller-owned transcript.
    ///
    /// On [`LoopExit::Exhausted`] the transcript holds everything that
    /// happened, so the caller may continue the conversation.
    pub async fn drive(
        &self,
        ctx: &AgentContext,
        tools: &dyn ToolSet,
        transcript: &mut Vec<Message>,
    ) -> Result<LoopExit, AgentError> {
        let mut state = LoopState::Running;
        tracing::info!(
            agent = %self.label,
            max_iterations = self.max_iterations,
            "Task loop started"
        );

        for iteration in 1..=self.max_iterations {
            if ctx.is_cancelled() {
                self.transition(&mut state, LoopState::Failed);
                return Err(AgentError::Cancelled);
            }

            ctx.emit(AgentEvent::Iteration {
                agent: self.label.clone(),
                iteration,
                max_iterations: self.max_iterations,
            });
            tracing::debug!(agent = %self.label, iteration, "Loop iteration");

            self.transition(&mut state, LoopState::AwaitingModel);
            let definitions = tools.definitions();
            let response = match self.call_model(ctx, transcript, &definitions).await {
                Ok(response) => response,
                Err(e) => {
                    self.transition(&mut state, LoopState::Failed);
                    return Err(e);
                }
            };

            if let Some(thinking) = response.thinking() {
                ctx.emit(AgentEvent::Thinking {
                    agent: self.label.clone(),
                    content: thinking,
                });
            }

            let calls = response.tool_calls.clone();
            let final_answer = response.content.clone();
            transcript.push(response);

            if calls.is_empty() {
                self.transition(&mut state, LoopState::Done);
                tracing::info!(agent = %self.label, iterations = iteration, "Task loop finished");
                return Ok(LoopExit::Answered(ExecutionResult {
                    final_answer,
                    iterations: iteration,
                }));
            }

            self.transition(&mut state, LoopState::DispatchingTools);
            for call in &calls {
                let observation = match self.dispatch(ctx, tools, call).await {
                    Ok(observation) => observation,
                    Err(e) => {
                        self.transition(&mut state, LoopState::Failed);
                        return Err(e);
                    }
                };
                transcript.push(Message::tool_result(call, observation));
            }
            self.transition(&mut state, LoopState::Running);
        }

        self.transition(&mut state, LoopState::Failed);
        tracing::warn!(
            agent = %self.label,
            max_iterations = self.max_iterations,
            "Iteration ceiling reached without a final answer"
        );
        Ok(LoopExit::Exhausted)
    }

    fn transition(&self, state: &mut LoopState, next: LoopState) {
        tracing::trace!(agent = %self.label, from = ?state, to = ?next, "Loop state");
        *state = next;
    }

    async fn call_model(
        &self,
        ctx: &AgentContext,
        transcript: &[Message],
        definitions: &[ToolDefinition],
    ) -> Result<Message, AgentError> {
        let request = async {
            if self.streaming {
                let on_chunk = |delta: &StreamDelta| {
                    if let Some(text) = delta.content.as_ref().filter(|t| !t.is_empty()) {
                        ctx.emit(AgentEvent::TextDelta {
                            agent: self.label.clone(),
                            content: text.clone(),
                        });
                    }
                };
                ctx.llm
                    .chat_stream(transcript, definitions, &ctx.options, &on_chunk)
                    .await
            } else {
                ctx.llm.chat(transcript, definitions, &ctx.options).await
            }
        };

        Ok(ctx.cancellable(request).await??)
    }

    /// Execute one tool call and produce its (truncated) observation.
    ///
    /// Fails only on cancellation.
    async fn dispatch(
        &self,
        ctx: &AgentContext,
        tools: &dyn ToolSet,
        call: &ToolCall,
    ) -> Result<String, AgentError> {
        ctx.emit(AgentEvent::ToolStart {
            agent: self.label.clone(),
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let tool = call
            .name
            .parse::<ToolName>()
            .ok()
            .and_then(|name| tools.resolve(name));

        let (observation, is_error) = match tool {
            None => {
                tracing::warn!(agent = %self.label, tool = %call.name, "Model called unknown tool");
                (format!("Error: unknown tool '{}'", call.name), true)
            }
            Some(tool) => {
                tracing::info!(agent = %self.label, tool = %call.name, "Executing tool");
                match ctx.cancellable(tool.execute(ctx, &call.arguments)).await? {
                    Ok(output) => (output, false),
                    Err(e) => {
                        tracing::warn!(agent = %self.label, tool = %call.name, "Tool failed: {}", e);
                        (format!("Error: {}", e), true)
                    }
                }
            }
        };

        let observation = truncate_observation(&observation, self.max_observation_len);
        ctx.emit(AgentEvent::ToolResult {
            agent: self.label.clone(),
            tool: call.name.clone(),
            observation: observation.clone(),
            is_error,
        });
        Ok(observation)
    }
}

/// Single-agent deployment: one loop over the full tool registry.
pub struct SingleAgent {
    tools: Arc<ToolRegistry>,
    task_loop: TaskLoop,
    system_prompt: String,
}

impl SingleAgent {
    pub fn new(tools: Arc<ToolRegistry>, task_loop: TaskLoop) -> Self {
        let system_prompt = super::prompts::single_agent_prompt(&tools);
        Self {
            tools,
            task_loop,
            system_prompt,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[async_trait]
impl TaskExecutor for SingleAgent {
    async fn execute(&self, ctx: &AgentContext, task: &str) -> Result<ExecutionResult, AgentError> {
        let outcome = self
            .task_loop
            .run(ctx, self.tools.as_ref(), &self.system_prompt, task)
            .await?;
        Ok(outcome.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::{tool_turn, ScriptedChat};
    use crate::llm::{ChatOptions, ChatPort, LlmError, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::tools::{EchoTool, Tool};
    use crate::util::TRUNCATION_MARKER;
    use serde_json::{json, Value};
    use tokio::sync::broadcast;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> ToolName {
            ToolName::BrowserClick
        }

        fn description(&self) -> String {
            "always fails".to_string()
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _ctx: &AgentContext, _args: &str) -> anyhow::Result<String> {
            anyhow::bail!("element not found")
        }
    }

    struct StallingTool;

    #[async_trait]
    impl Tool for StallingTool {
        fn name(&self) -> ToolName {
            ToolName::UserWaitAction
        }

        fn description(&self) -> String {
            "never returns".to_string()
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _ctx: &AgentContext, _args: &str) -> anyhow::Result<String> {
            futures::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry
    }

    fn context(chat: &Arc<ScriptedChat>) -> AgentContext {
        AgentContext::new(chat.clone())
    }

    fn tool_messages(transcript: &[Message]) -> Vec<&Message> {
        transcript.iter().filter(|m| m.role == Role::Tool).collect()
    }

    #[tokio::test]
    async fn say_hello_finishes_in_one_iteration() {
        let chat = Arc::new(ScriptedChat::new(vec![Message::assistant_text("Hello!")]));
        let agent = SingleAgent::new(Arc::new(echo_registry()), TaskLoop::new("main", 50));

        let result = agent.execute(&context(&chat), "say hello").await.unwrap();
        assert_eq!(
            result,
            ExecutionResult {
                final_answer: "Hello!".to_string(),
                iterations: 1
            }
        );
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn echo_round_trip_uses_two_iterations() {
        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[("call_1", "echo", r#"{"msg":"hi"}"#)]),
            Message::assistant_text("Done: hi"),
        ]));
        let registry = echo_registry();
        let task_loop = TaskLoop::new("main", 50);

        let outcome = task_loop
            .run(&context(&chat), &registry, "system", "echo hi")
            .await
            .unwrap();

        assert_eq!(outcome.result.final_answer, "Done: hi");
        assert_eq!(outcome.result.iterations, 2);
        let tools = tool_messages(&outcome.transcript);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].content, "hi");
        assert_eq!(tools[0].tool_call_id.as_deref(), Some("call_1"));

        // the second request carried the observation back to the model
        let second = &chat.requests()[1];
        assert_eq!(second.messages.len(), 4);
        assert_eq!(second.messages[3].content, "hi");
        assert_eq!(second.tools, vec![ToolName::Echo]);
    }

    #[tokio::test]
    async fn ceiling_is_hit_after_exactly_max_iterations() {
        let chat = Arc::new(ScriptedChat::repeating(tool_turn(&[(
            "call",
            "echo",
            r#"{"msg":"again"}"#,
        )])));
        let registry = echo_registry();
        let task_loop = TaskLoop::new("main", 4);

        let err = task_loop
            .run(&context(&chat), &registry, "system", "loop forever")
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::MaxIterations(4)));
        assert_eq!(chat.calls(), 4);
    }

    #[tokio::test]
    async fn drive_reports_exhaustion_with_full_transcript() {
        let chat = Arc::new(ScriptedChat::repeating(tool_turn(&[(
            "call",
            "echo",
            r#"{"msg":"x"}"#,
        )])));
        let registry = echo_registry();
        let mut transcript = vec![Message::system("s"), Message::user("t")];

        let exit = TaskLoop::new("main", 2)
            .drive(&context(&chat), &registry, &mut transcript)
            .await
            .unwrap();

        assert_eq!(exit, LoopExit::Exhausted);
        // system, user, then (assistant, tool) twice
        assert_eq!(transcript.len(), 6);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_observation() {
        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[("c1", "browser_teleport", "{}")]),
            tool_turn(&[("c2", "browser_click", "{}")]),
            Message::assistant_text("recovered"),
        ]));
        let registry = echo_registry();

        let outcome = TaskLoop::new("main", 10)
            .run(&context(&chat), &registry, "system", "task")
            .await
            .unwrap();

        assert_eq!(outcome.result.final_answer, "recovered");
        let tools = tool_messages(&outcome.transcript);
        assert_eq!(tools[0].content, "Error: unknown tool 'browser_teleport'");
        // valid name, but not registered
        assert_eq!(tools[1].content, "Error: unknown tool 'browser_click'");
    }

    #[tokio::test]
    async fn tool_failure_becomes_observation() {
        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[("c1", "browser_click", r##"{"selector":"#go"}"##)]),
            Message::assistant_text("gave up"),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));

        let outcome = TaskLoop::new("main", 10)
            .run(&context(&chat), &registry, "system", "click it")
            .await
            .unwrap();

        assert_eq!(outcome.result.iterations, 2);
        assert_eq!(
            tool_messages(&outcome.transcript)[0].content,
            "Error: element not found"
        );
    }

    #[tokio::test]
    async fn tool_calls_run_in_emitted_order() {
        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[
                ("a", "echo", r#"{"msg":"first"}"#),
                ("b", "echo", r#"{"msg":"second"}"#),
                ("c", "echo", r#"{"msg":"third"}"#),
            ]),
            Message::assistant_text("done"),
        ]));
        let registry = echo_registry();

        let outcome = TaskLoop::new("main", 10)
            .run(&context(&chat), &registry, "system", "task")
            .await
            .unwrap();

        let observed: Vec<(&str, &str)> = tool_messages(&outcome.transcript)
            .iter()
            .map(|m| (m.tool_call_id.as_deref().unwrap_or(""), m.content.as_str()))
            .collect();
        assert_eq!(observed, vec![("a", "first"), ("b", "second"), ("c", "third")]);
    }

    #[tokio::test]
    async fn long_observations_are_truncated() {
        let args = json!({ "msg": "z".repeat(100) }).to_string();
        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[("c1", "echo", args.as_str())]),
            Message::assistant_text("ok"),
        ]));
        let registry = echo_registry();

        let outcome = TaskLoop::new("main", 10)
            .with_max_observation_len(10)
            .run(&context(&chat), &registry, "system", "task")
            .await
            .unwrap();

        assert_eq!(
            tool_messages(&outcome.transcript)[0].content,
            format!("{}{}", "z".repeat(10), TRUNCATION_MARKER)
        );
    }

    #[tokio::test]
    async fn transport_error_is_fatal() {
        let chat = Arc::new(ScriptedChat::with_results(vec![Err(
            LlmError::network_error("connection refused"),
        )]));
        let registry = echo_registry();

        let err = TaskLoop::new("main", 10)
            .run(&context(&chat), &registry, "system", "task")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn cancelled_context_makes_no_model_call() {
        let chat = Arc::new(ScriptedChat::new(vec![Message::assistant_text("never")]));
        let ctx = context(&chat);
        ctx.cancel_token.cancel();

        let err = TaskLoop::new("main", 10)
            .run(&ctx, &echo_registry(), "system", "task")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_aborts_running_tool() {
        let chat = Arc::new(ScriptedChat::repeating(tool_turn(&[(
            "c1",
            "user_wait_action",
            "{}",
        )])));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(StallingTool));
        let ctx = context(&chat);
        let token = ctx.cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = TaskLoop::new("main", 10)
            .run(&ctx, &registry, "system", "task")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(chat.calls(), 1);
    }

    /// Model whose calls never complete.
    #[derive(Default)]
    struct HangingChat {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatPort for HangingChat {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _options: &ChatOptions,
        ) -> Result<Message, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures::future::pending::<()>().await;
            Err(LlmError::empty_response())
        }
    }

    #[tokio::test]
    async fn cancellation_aborts_pending_model_call() {
        for streaming in [false, true] {
            let chat = Arc::new(HangingChat::default());
            let ctx = AgentContext::new(chat.clone());
            let token = ctx.cancel_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                token.cancel();
            });

            let err = TaskLoop::new("main", 10)
                .with_streaming(streaming)
                .run(&ctx, &echo_registry(), "system", "task")
                .await
                .unwrap_err();
            assert!(err.is_cancelled(), "streaming={}", streaming);
            assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn streaming_publishes_progress_events() {
        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[("c1", "echo", r#"{"msg":"hi"}"#)]),
            Message::assistant_text("Done: hi"),
        ]));
        let (tx, mut rx) = broadcast::channel(32);
        let ctx = context(&chat).with_events(tx);

        let outcome = TaskLoop::new("main", 10)
            .with_streaming(true)
            .run(&ctx, &echo_registry(), "system", "task")
            .await
            .unwrap();
        assert_eq!(outcome.result.final_answer, "Done: hi");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolResult { observation, is_error: false, .. } if observation == "hi"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::TextDelta { content, .. } if content == "Done: hi"
        )));
        let iterations = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Iteration { .. }))
            .count();
        assert_eq!(iterations, 2);
    }
}
