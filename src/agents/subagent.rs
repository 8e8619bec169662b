//! Sub-agents: narrow task loops over an allow-listed slice of the tools.
//!
//! A sub-agent optionally consults an [`Evaluator`] after each attempt. A
//! verdict asking for a retry re-runs the agent on the original task
//! augmented with the judge's feedback, until the retry budget is spent.
//! The number of attempts is therefore bounded by `max_retries + 1`.

use std::sync::Arc;

use super::context::{AgentContext, AgentEvent};
use super::evaluator::{EvaluationCriteria, EvaluationResult, Evaluator};
use super::executor::{LoopExit, TaskLoop};
use super::prompts::{sub_agent_description, sub_agent_prompt, FINAL_REPORT_REQUEST};
use super::types::{AgentError, AgentKind, ExecutionResult};
use crate::llm::{Message, ToolDefinition};
use crate::tools::{ToolName, ToolRegistry, ToolSet};

/// What happens when the iteration ceiling is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Return [`AgentError::MaxIterations`].
    Fail,
    /// Ask the model for a final report with tools withheld.
    FinalReport,
}

/// A specialised agent exposed to the orchestrator as one tool.
pub struct SubAgent {
    kind: AgentKind,
    description: String,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    allowed: Vec<ToolName>,
    task_loop: TaskLoop,
    max_retries: usize,
    evaluator: Option<Evaluator>,
    /// Explicit policy; otherwise derived from whether a judge is attached
    exhaustion: Option<ExhaustionPolicy>,
}

impl SubAgent {
    pub fn new(
        kind: AgentKind,
        tools: Arc<ToolRegistry>,
        allowed: Vec<ToolName>,
        max_iterations: usize,
    ) -> Self {
        Self {
            kind,
            description: sub_agent_description(kind).to_string(),
            system_prompt: sub_agent_prompt(kind).to_string(),
            tools,
            allowed,
            task_loop: TaskLoop::new(kind.tool_name().as_str(), max_iterations),
            max_retries: 0,
            evaluator: None,
            exhaustion: None,
        }
    }

    pub fn navigation(tools: Arc<ToolRegistry>) -> Self {
        Self::new(
            AgentKind::Navigation,
            tools,
            vec![
                ToolName::BrowserNavigate,
                ToolName::BrowserObserve,
                ToolName::BrowserScroll,
                ToolName::BrowserSearch,
            ],
            10,
        )
        .with_exhaustion_policy(ExhaustionPolicy::FinalReport)
    }

    pub fn extraction(tools: Arc<ToolRegistry>) -> Self {
        Self::new(
            AgentKind::Extraction,
            tools,
            vec![
                ToolName::BrowserQueryElements,
                ToolName::BrowserSearch,
                ToolName::BrowserObserve,
                ToolName::BrowserScroll,
            ],
            5,
        )
        .with_evaluator(Evaluator::new(), 2)
    }

    pub fn form(tools: Arc<ToolRegistry>) -> Self {
        Self::new(
            AgentKind::Form,
            tools,
            vec![
                ToolName::BrowserFill,
                ToolName::BrowserClick,
                ToolName::BrowserPressEnter,
                ToolName::BrowserObserve,
                ToolName::BrowserSearch,
                ToolName::UserWaitAction,
                ToolName::UserAskQuestion,
            ],
            5,
        )
        .with_evaluator(Evaluator::new(), 2)
    }

    pub fn analysis(tools: Arc<ToolRegistry>) -> Self {
        Self::new(
            AgentKind::Analysis,
            tools,
            vec![
                ToolName::BrowserObserve,
                ToolName::BrowserSearch,
                ToolName::BrowserQueryElements,
                ToolName::BrowserScreenshot,
            ],
            5,
        )
        .with_evaluator(Evaluator::new(), 1)
    }

    pub fn preset(kind: AgentKind, tools: Arc<ToolRegistry>) -> Self {
        match kind {
            AgentKind::Navigation => Self::navigation(tools),
            AgentKind::Extraction => Self::extraction(tools),
            AgentKind::Form => Self::form(tools),
            AgentKind::Analysis => Self::analysis(tools),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Attach a judge with a retry budget. Unless a policy was set
    /// explicitly, exhaustion then yields a final report so the judge always
    /// has a result.
    pub fn with_evaluator(mut self, evaluator: Evaluator, max_retries: usize) -> Self {
        self.evaluator = Some(evaluator);
        self.max_retries = max_retries;
        self
    }

    pub fn without_evaluator(mut self) -> Self {
        self.evaluator = None;
        self.max_retries = 0;
        self
    }

    pub fn with_exhaustion_policy(mut self, exhaustion: ExhaustionPolicy) -> Self {
        self.exhaustion = Some(exhaustion);
        self
    }

    /// `FinalReport` with a judge attached, `Fail` without one, unless set
    /// explicitly.
    pub fn exhaustion_policy(&self) -> ExhaustionPolicy {
        match (self.exhaustion, &self.evaluator) {
            (Some(policy), _) => policy,
            (None, Some(_)) => ExhaustionPolicy::FinalReport,
            (None, None) => ExhaustionPolicy::Fail,
        }
    }

    pub fn with_max_observation_len(mut self, max_observation_len: usize) -> Self {
        self.task_loop = self.task_loop.with_max_observation_len(max_observation_len);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.task_loop = self.task_loop.with_streaming(streaming);
        self
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn name(&self) -> ToolName {
        self.kind.tool_name()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn allowed_tools(&self) -> &[ToolName] {
        &self.allowed
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn max_iterations(&self) -> usize {
        self.task_loop.max_iterations()
    }

    /// Definitions of the tools this agent may call, in registry order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.filtered(&self.allowed).definitions()
    }

    /// Run the task, retrying on the judge's request.
    ///
    /// A low-confidence verdict never turns into an error: once the budget is
    /// spent the last result is returned as is.
    pub async fn execute(&self, ctx: &AgentContext, task: &str) -> Result<ExecutionResult, AgentError> {
        let mut current_task = task.to_string();
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::info!(agent = %self.kind, attempt, "Sub-agent attempt started");
            let result = self.attempt(ctx, &current_task).await?;

            let Some(evaluator) = &self.evaluator else {
                return Ok(result);
            };

            let criteria = EvaluationCriteria {
                task,
                result: &result.final_answer,
                kind: self.kind,
            };
            let verdict = match evaluator.evaluate(ctx, &criteria).await {
                Ok(verdict) => verdict,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        agent = %self.kind,
                        attempt,
                        "Evaluation failed, returning result anyway: {}",
                        e
                    );
                    return Ok(result);
                }
            };

            ctx.emit(AgentEvent::Evaluation {
                agent: self.name().to_string(),
                attempt,
                success: verdict.success,
                confidence: verdict.confidence,
                should_retry: verdict.should_retry,
            });

            if verdict.success {
                return Ok(result);
            }
            if !verdict.should_retry {
                tracing::info!(agent = %self.kind, attempt, "Evaluator advised against retry");
                return Ok(result);
            }
            if attempt > self.max_retries {
                tracing::warn!(
                    agent = %self.kind,
                    attempts = attempt,
                    confidence = verdict.confidence,
                    "Retry budget exhausted, returning last result"
                );
                return Ok(result);
            }

            tracing::info!(
                agent = %self.kind,
                attempt,
                issues = verdict.issues.len(),
                "Retrying with evaluator feedback"
            );
            current_task = retry_task(task, &verdict);
        }
    }

    async fn attempt(&self, ctx: &AgentContext, task: &str) -> Result<ExecutionResult, AgentError> {
        let tools = self.tools.filtered(&self.allowed);
        let mut transcript = vec![Message::system(&self.system_prompt), Message::user(task)];

        match self.task_loop.drive(ctx, &tools, &mut transcript).await? {
            LoopExit::Answered(result) => Ok(result),
            LoopExit::Exhausted => match self.exhaustion_policy() {
                ExhaustionPolicy::Fail => Err(AgentError::MaxIterations(self.max_iterations())),
                ExhaustionPolicy::FinalReport => self.final_report(ctx, &mut transcript).await,
            },
        }
    }

    async fn final_report(
        &self,
        ctx: &AgentContext,
        transcript: &mut Vec<Message>,
    ) -> Result<ExecutionResult, AgentError> {
        tracing::warn!(agent = %self.kind, "Requesting final report after iteration ceiling");
        transcript.push(Message::user(FINAL_REPORT_REQUEST));

        let reply = ctx
            .cancellable(ctx.llm.chat(transcript, &[], &ctx.options))
            .await??;

        Ok(ExecutionResult {
            final_answer: reply.content,
            iterations: self.max_iterations() + 1,
        })
    }
}

/// Build the task for the next attempt from the original task and a verdict.
pub fn retry_task(original: &str, verdict: &EvaluationResult) -> String {
    let mut task = format!(
        "{}\n\nPREVIOUS ATTEMPT FEEDBACK:\n{}\n\nIssues to fix:\n",
        original, verdict.feedback
    );
    for (i, issue) in verdict.issues.iter().enumerate() {
        task.push_str(&format!("{}. {}\n", i + 1, issue));
    }
    task
}
