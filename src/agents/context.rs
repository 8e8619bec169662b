//! Agent execution context and progress events.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::AgentError;
use crate::llm::{ChatOptions, ChatPort};

/// Progress notification published while a task runs.
///
/// Events are for presentation and logging only; nothing in the engine
/// reads them back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Iteration {
        agent: String,
        iteration: usize,
        max_iterations: usize,
    },
    Thinking {
        agent: String,
        content: String,
    },
    TextDelta {
        agent: String,
        content: String,
    },
    ToolStart {
        agent: String,
        tool: String,
        arguments: String,
    },
    ToolResult {
        agent: String,
        tool: String,
        observation: String,
        is_error: bool,
    },
    Evaluation {
        agent: String,
        attempt: usize,
        success: bool,
        confidence: f64,
        should_retry: bool,
    },
}

/// Shared context passed to executors and tools.
///
/// Cloning is cheap; clones share the model, the cancellation token and the
/// event channel.
#[derive(Clone)]
pub struct AgentContext {
    /// Chat model for all calls made during this run
    pub llm: Arc<dyn ChatPort>,

    /// Sampling options for loop turns
    pub options: ChatOptions,

    /// Cancelling this token aborts in-flight model and tool calls
    pub cancel_token: CancellationToken,

    pub events: Option<broadcast::Sender<AgentEvent>>,

    /// Identifies one task run in logs
    pub run_id: Uuid,
}

impl AgentContext {
    pub fn new(llm: Arc<dyn ChatPort>) -> Self {
        Self {
            llm,
            options: ChatOptions::with_temperature(0.0),
            cancel_token: CancellationToken::new(),
            events: None,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Drive `fut` to completion unless the run is cancelled first.
    pub async fn cancellable<F, T>(&self, fut: F) -> Result<T, AgentError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(AgentError::Cancelled),
            out = fut => Ok(out),
        }
    }
}
