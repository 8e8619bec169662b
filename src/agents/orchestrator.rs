//! Orchestrator - a task loop whose tools are sub-agents.

use std::sync::Arc;

use async_trait::async_trait;

use super::context::AgentContext;
use super::executor::TaskLoop;
use super::prompts::{render_orchestrator_prompt, ORCHESTRATOR_TEMPLATE};
use super::registry::SubAgentRegistry;
use super::types::{AgentError, ExecutionResult};
use super::TaskExecutor;
use crate::tools::{AgentTool, Tool, ToolName, ToolRegistry};

pub const DEFAULT_ORCHESTRATOR_ITERATIONS: usize = 30;

/// Delegates the task to sub-agents through `agent_*` tools.
///
/// Sub-agent retries happen inside each delegation; the orchestrator itself
/// only sees the final report of every sub-agent.
pub struct Orchestrator {
    tools: ToolRegistry,
    task_loop: TaskLoop,
    system_prompt: String,
}

impl Orchestrator {
    /// Wrap every registered sub-agent as a tool, followed by `extra_tools`.
    pub fn new(
        agents: &SubAgentRegistry,
        extra_tools: Vec<Arc<dyn Tool>>,
        max_iterations: usize,
    ) -> Self {
        let mut tools = ToolRegistry::new();
        for agent in agents.all() {
            tools.register(Arc::new(AgentTool::new(agent.clone())));
        }
        tools.extend(extra_tools);

        tracing::info!(
            agents = agents.len(),
            tools = tools.len(),
            max_iterations,
            "Orchestrator configured"
        );

        Self {
            tools,
            task_loop: TaskLoop::new("orchestrator", max_iterations),
            system_prompt: render_orchestrator_prompt(ORCHESTRATOR_TEMPLATE, agents),
        }
    }

    /// Replace the prompt template. `{{agents}}` is substituted with the
    /// sub-agent listing.
    pub fn with_prompt_template(mut self, template: &str, agents: &SubAgentRegistry) -> Self {
        self.system_prompt = render_orchestrator_prompt(template, agents);
        self
    }

    pub fn with_max_observation_len(mut self, max_observation_len: usize) -> Self {
        self.task_loop = self.task_loop.with_max_observation_len(max_observation_len);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tool_names(&self) -> Vec<ToolName> {
        self.tools.names()
    }
}

#[async_trait]
impl TaskExecutor for Orchestrator {
    async fn execute(&self, ctx: &AgentContext, task: &str) -> Result<ExecutionResult, AgentError> {
        let outcome = self
            .task_loop
            .run(ctx, &self.tools, &self.system_prompt, task)
            .await?;
        Ok(outcome.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SubAgent;
    use crate::llm::scripted::{tool_turn, ScriptedChat};
    use crate::llm::{Message, Role};
    use crate::tools::EchoTool;

    fn agents() -> SubAgentRegistry {
        let tools = Arc::new(ToolRegistry::new());
        let mut agents = SubAgentRegistry::new();
        agents.register(Arc::new(SubAgent::navigation(tools.clone())));
        agents.register(Arc::new(SubAgent::extraction(tools).without_evaluator()));
        agents
    }

    #[test]
    fn tools_are_agents_then_extras() {
        let orchestrator = Orchestrator::new(&agents(), vec![Arc::new(EchoTool) as Arc<dyn Tool>], 30);
        assert_eq!(
            orchestrator.tool_names(),
            vec![ToolName::AgentNavigate, ToolName::AgentExtract, ToolName::Echo]
        );
        let prompt = orchestrator.system_prompt();
        let nav = prompt.find("- agent_navigate: ").unwrap();
        let ext = prompt.find("- agent_extract: ").unwrap();
        assert!(nav < ext);
        assert!(!prompt.contains("{{agents}}"));
    }

    #[test]
    fn custom_template_is_rendered() {
        let agents = agents();
        let orchestrator =
            Orchestrator::new(&agents, Vec::new(), 30).with_prompt_template("Use:\n{{agents}}", &agents);
        assert!(orchestrator.system_prompt().starts_with("Use:\n- agent_navigate: "));
    }

    #[tokio::test]
    async fn delegates_task_to_sub_agent() {
        let chat = Arc::new(ScriptedChat::new(vec![
            // orchestrator turn 1
            tool_turn(&[("d1", "agent_extract", r#"{"task":"List the headlines"}"#)]),
            // extraction agent answers directly
            Message::assistant_text("1. First\n2. Second"),
            // orchestrator turn 2
            Message::assistant_text("Headlines: First, Second"),
        ]));
        let ctx = AgentContext::new(chat.clone());
        let orchestrator = Orchestrator::new(&agents(), Vec::new(), 30);

        let result = orchestrator.execute(&ctx, "Get headlines").await.unwrap();
        assert_eq!(result.final_answer, "Headlines: First, Second");
        assert_eq!(result.iterations, 2);

        let requests = chat.requests();
        assert_eq!(requests.len(), 3);
        // the sub-agent saw only the delegated task
        assert_eq!(requests[1].messages[1].content, "List the headlines");
        assert_eq!(requests[1].messages[1].role, Role::User);
        // and its report came back as the observation
        let observation = requests[2].messages.last().unwrap();
        assert_eq!(observation.role, Role::Tool);
        assert_eq!(observation.content, "1. First\n2. Second");
        assert_eq!(observation.tool_call_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn unregistered_agent_is_unknown_tool() {
        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[("d1", "agent_form", r#"{"task":"Submit"}"#)]),
            Message::assistant_text("cannot submit"),
        ]));
        let ctx = AgentContext::new(chat.clone());
        let orchestrator = Orchestrator::new(&agents(), Vec::new(), 30);

        let result = orchestrator.execute(&ctx, "Submit form").await.unwrap();
        assert_eq!(result.final_answer, "cannot submit");
        assert_eq!(
            chat.requests()[1].messages.last().map(|m| m.content.clone()),
            Some("Error: unknown tool 'agent_form'".to_string())
        );
    }
}
