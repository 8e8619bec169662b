//! Core types for the agent system.

use serde::{Deserialize, Serialize};

use crate::llm::LlmError;
use crate::tools::ToolName;

/// Capability domain of a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Navigation,
    Extraction,
    Form,
    Analysis,
}

impl AgentKind {
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Navigation,
        AgentKind::Extraction,
        AgentKind::Form,
        AgentKind::Analysis,
    ];

    /// The tool through which the orchestrator delegates to this agent.
    pub fn tool_name(&self) -> ToolName {
        match self {
            AgentKind::Navigation => ToolName::AgentNavigate,
            AgentKind::Extraction => ToolName::AgentExtract,
            AgentKind::Form => ToolName::AgentForm,
            AgentKind::Analysis => ToolName::AgentAnalyze,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Navigation => "navigation",
            AgentKind::Extraction => "extraction",
            AgentKind::Form => "form",
            AgentKind::Analysis => "analysis",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub final_answer: String,
    /// Number of model turns used, counting the final one
    pub iterations: usize,
}

/// Fatal errors of a task execution.
///
/// Unknown tools and tool failures are not errors at this level: they are
/// reported back to the model as observations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Max iterations reached: {0}")]
    MaxIterations(usize),

    #[error("Execution cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_kinds_map_to_distinct_tools() {
        let names: std::collections::HashSet<ToolName> =
            AgentKind::ALL.iter().map(|k| k.tool_name()).collect();
        assert_eq!(names.len(), AgentKind::ALL.len());
        assert!(!names.contains(&ToolName::BrowserClick));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            AgentError::MaxIterations(5).to_string(),
            "Max iterations reached: 5"
        );
        let err: AgentError = LlmError::empty_response().into();
        assert_eq!(err.to_string(), "LLM error: Empty response: no choices returned");
        assert!(AgentError::Cancelled.is_cancelled());
    }
}
