//! Agents module - task execution system.
//!
//! # Agent Types
//! - **SingleAgent**: one task loop over the full tool registry
//! - **Orchestrator**: a task loop whose tools are sub-agents
//! - **SubAgent**: a narrow loop over an allow-listed tool subset, optionally
//!   judged by the **Evaluator** and retried with its feedback
//!
//! # Invariants
//! - Every loop is bounded by its iteration ceiling
//! - Sub-agent attempts are bounded by `max_retries + 1`
//! - Cancellation is never retried

mod context;
mod evaluator;
mod executor;
mod orchestrator;
pub mod prompts;
mod registry;
mod subagent;
mod types;

pub use context::{AgentContext, AgentEvent};
pub use evaluator::{parse_verdict, EvaluationCriteria, EvaluationResult, Evaluator, VerdictParseError};
pub use executor::{LoopExit, LoopOutcome, LoopState, SingleAgent, TaskLoop, DEFAULT_MAX_OBSERVATION_LEN};
pub use orchestrator::{Orchestrator, DEFAULT_ORCHESTRATOR_ITERATIONS};
pub use registry::SubAgentRegistry;
pub use subagent::{retry_task, ExhaustionPolicy, SubAgent};
pub use types::{AgentError, AgentKind, ExecutionResult};

use async_trait::async_trait;

/// Entry point for running a task end to end.
///
/// # Postconditions
/// - `Ok` carries the model's final answer
/// - `Err` is a transport failure, the iteration ceiling, or cancellation
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: &AgentContext, task: &str) -> Result<ExecutionResult, AgentError>;
}
