//! Wiring: builds the tool registry, the sub-agents and the task executor
//! from a [`Config`].

use std::sync::Arc;

use crate::agents::{
    AgentKind, Orchestrator, SingleAgent, SubAgent, SubAgentRegistry, TaskExecutor, TaskLoop,
};
use crate::browser::BrowserPort;
use crate::config::{AgentMode, Config};
use crate::interaction::UserInteractionPort;
use crate::tools::{browser_tools, user_tools, EchoTool, ToolRegistry};

/// Browser tools, then user tools, then `echo` when enabled.
pub fn build_tool_registry(
    config: &Config,
    browser: Arc<dyn BrowserPort>,
    user: Arc<dyn UserInteractionPort>,
) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.extend(browser_tools(browser));
    tools.extend(user_tools(user));
    if config.echo_tool_enabled {
        tools.register(Arc::new(EchoTool));
    }
    tools
}

/// One preset sub-agent per [`AgentKind`], sharing `tools`.
pub fn build_sub_agents(config: &Config, tools: Arc<ToolRegistry>) -> SubAgentRegistry {
    let mut agents = SubAgentRegistry::new();
    for kind in AgentKind::ALL {
        let mut agent = SubAgent::preset(kind, tools.clone())
            .with_max_observation_len(config.max_observation_len)
            .with_streaming(config.streaming);
        if !config.evaluator_enabled {
            agent = agent.without_evaluator();
        }
        agents.register(Arc::new(agent));
    }
    agents
}

/// Build the executor selected by `config.mode`.
pub fn build_executor(
    config: &Config,
    browser: Arc<dyn BrowserPort>,
    user: Arc<dyn UserInteractionPort>,
) -> Box<dyn TaskExecutor> {
    let tools = Arc::new(build_tool_registry(config, browser, user.clone()));

    match config.mode {
        AgentMode::Single => {
            let task_loop = TaskLoop::new("agent", config.max_iterations)
                .with_streaming(config.streaming)
                .with_max_observation_len(config.max_observation_len);
            tracing::info!(tools = tools.len(), max_iterations = config.max_iterations, "Using single agent");
            Box::new(SingleAgent::new(tools, task_loop))
        }
        AgentMode::Orchestrator => {
            let agents = build_sub_agents(config, tools);
            let orchestrator = Orchestrator::new(&agents, user_tools(user), config.orchestrator_max_iterations)
                .with_max_observation_len(config.max_observation_len);
            Box::new(orchestrator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentContext;
    use crate::browser::HttpBrowser;
    use crate::llm::scripted::{tool_turn, ScriptedChat};
    use crate::llm::Message;
    use crate::tools::ToolName;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SilentUser;

    #[async_trait]
    impl UserInteractionPort for SilentUser {
        async fn ask_question(&self, _question: &str) -> anyhow::Result<String> {
            Ok("yes".to_string())
        }

        async fn wait_for_user_action(&self, _message: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn ports() -> (Arc<dyn BrowserPort>, Arc<dyn UserInteractionPort>) {
        let browser = HttpBrowser::new(Duration::from_secs(1)).unwrap();
        (Arc::new(browser), Arc::new(SilentUser))
    }

    fn config() -> Config {
        Config::new("sk-test".into(), "test/model".into())
    }

    #[test]
    fn registry_holds_browser_then_user_tools() {
        let (browser, user) = ports();
        let tools = build_tool_registry(&config(), browser, user);
        let mut expected = ToolName::ALL[..9].to_vec();
        expected.extend([ToolName::UserAskQuestion, ToolName::UserWaitAction]);
        assert_eq!(tools.names(), expected);
        assert!(!tools.has_tool(ToolName::Echo));
    }

    #[test]
    fn echo_tool_is_opt_in() {
        let (browser, user) = ports();
        let mut config = config();
        config.echo_tool_enabled = true;
        let tools = build_tool_registry(&config, browser, user);
        assert!(tools.has_tool(ToolName::Echo));
    }

    #[test]
    fn evaluator_can_be_disabled() {
        let (browser, user) = ports();
        let tools = Arc::new(build_tool_registry(&config(), browser.clone(), user.clone()));

        let agents = build_sub_agents(&config(), tools.clone());
        assert_eq!(agents.len(), 4);
        assert_eq!(agents.get(AgentKind::Extraction).unwrap().max_retries(), 2);

        let mut disabled = config();
        disabled.evaluator_enabled = false;
        let agents = build_sub_agents(&disabled, tools);
        assert!(agents.all().iter().all(|a| a.max_retries() == 0));
    }

    #[tokio::test]
    async fn single_mode_answers_directly() {
        let (browser, user) = ports();
        let mut config = config();
        config.mode = AgentMode::Single;
        config.streaming = false;
        let executor = build_executor(&config, browser, user);

        let chat = Arc::new(ScriptedChat::new(vec![Message::assistant_text("Done")]));
        let result = executor.execute(&AgentContext::new(chat.clone()), "Say done").await.unwrap();

        assert_eq!(result.final_answer, "Done");
        let tools = &chat.requests()[0].tools;
        assert!(tools.contains(&ToolName::BrowserNavigate));
        assert!(!tools.contains(&ToolName::AgentNavigate));
    }

    #[tokio::test]
    async fn orchestrator_mode_offers_agent_tools() {
        let (browser, user) = ports();
        let mut config = config();
        config.streaming = false;
        let executor = build_executor(&config, browser, user);

        let chat = Arc::new(ScriptedChat::new(vec![
            tool_turn(&[("c1", "user_ask_question", r#"{"question":"Which site?"}"#)]),
            Message::assistant_text("The user said yes"),
        ]));
        let result = executor.execute(&AgentContext::new(chat.clone()), "Ask first").await.unwrap();

        assert_eq!(result.final_answer, "The user said yes");
        assert_eq!(
            chat.requests()[0].tools,
            vec![
                ToolName::AgentNavigate,
                ToolName::AgentExtract,
                ToolName::AgentForm,
                ToolName::AgentAnalyze,
                ToolName::UserAskQuestion,
                ToolName::UserWaitAction,
            ]
        );
        assert_eq!(chat.requests()[1].messages.last().unwrap().content, "yes");
    }
}
