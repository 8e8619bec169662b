//! System prompts.

use super::registry::SubAgentRegistry;
use super::types::AgentKind;
use crate::tools::ToolRegistry;

/// Placeholder replaced with the sub-agent listing.
pub const AGENTS_PLACEHOLDER: &str = "{{agents}}";

/// Appended after a sub-agent runs out of iterations. The next call is made
/// without tool definitions.
pub const FINAL_REPORT_REQUEST: &str = r#"CRITICAL: Maximum iterations reached. You MUST provide your FINAL REPORT now.

Format your response as:
- If the task was completed: give your success report as instructed
- If the task failed: start with "FAILED:" and explain what went wrong
- If the task was partially completed: start with "PARTIAL SUCCESS:" and describe what was done

This is your LAST response. Do NOT call any tools. Reply with text only."#;

pub const ORCHESTRATOR_TEMPLATE: &str = r#"You are a browser automation orchestrator. You accomplish the user's task by delegating focused sub-tasks to specialised agents and combining their reports.

## Available agents
{{agents}}

## How to work
1. Split the task into small steps, each handled by exactly one agent.
2. Give every agent a self-contained instruction: it sees only what you pass in "task".
3. Pass along the concrete selectors, URLs and values that earlier agents reported.
4. Read each report before deciding the next step. A report starting with "FAILED:" or "PARTIAL SUCCESS:" needs a different approach, not the same request again.
5. Ask the user only when information is missing or a manual step (login, captcha) is required.

## Finishing
When the task is done, or cannot be done, reply without calling any tool. State the result clearly and include the data the user asked for."#;

const SINGLE_AGENT_TEMPLATE: &str = r#"You are an autonomous browser agent. You complete the user's task by operating a web browser through tools.

## Available tools
{tools}

## Rules
1. Act with tools; do not just describe what you would do.
2. Observe the page before interacting with it, and again after actions that change it.
3. Prefer specific selectors reported by observation over guesses.
4. If a tool fails, read the error and adjust instead of repeating the same call.
5. Ask the user when you need credentials, a decision, or a manual step.

## Response
When the task is complete, reply without calling any tool and give the result the user asked for."#;

const NAVIGATION_PROMPT: &str = r#"You are a navigation agent. Your job is to open pages and confirm they loaded.

- Use browser_navigate to open URLs and browser_observe to confirm the page.
- Use browser_scroll and browser_search to find the region the task refers to.
- Report the final URL, the page title, and any specific selectors you were asked to locate.
- Do not fill forms, click buttons, or extract data; other agents do that.

Finish with a short report. If you could not reach the page, start the report with "FAILED:" and say why."#;

const EXTRACTION_PROMPT: &str = r#"You are an extraction agent. Your job is to read structured data from the current page.

- Use browser_query_elements to pull values from repeated elements (lists, tables, cards).
- Use browser_search and browser_observe to locate the data first, and browser_scroll for content below the fold.
- Return the actual values, not a description of where they are, as a numbered list or table.
- Include selectors for interactive elements next to the data when the task may need them later.
- Never navigate away from the page or change it.

If the data is not on the page, start your answer with "FAILED:" and describe what you saw instead."#;

const FORM_PROMPT: &str = r#"You are a form agent. Your job is to fill fields and press buttons on the current page.

- Observe the page first to get exact selectors for the fields and buttons involved.
- Use browser_fill for inputs, browser_click for buttons and checkboxes, browser_press_enter to submit.
- After acting, observe again and report the evidence that it worked (new URL, confirmation message).
- Ask the user for values you were not given, and let the user complete logins or captchas with user_wait_action.
- Never navigate to a new URL yourself.

If an action fails, start your answer with "FAILED:" and report the exact error."#;

const ANALYSIS_PROMPT: &str = r#"You are an analysis agent. Your job is to answer questions about the current page without changing it.

- Use browser_observe for the page layout and browser_search or browser_query_elements for details.
- Use browser_screenshot when visual appearance matters.
- Base every statement on what the tools returned and cite selectors where useful.

Finish with a concise answer. If the page does not contain what is needed, start with "FAILED:" and explain."#;

/// Default system prompt of a sub-agent.
pub fn sub_agent_prompt(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Navigation => NAVIGATION_PROMPT,
        AgentKind::Extraction => EXTRACTION_PROMPT,
        AgentKind::Form => FORM_PROMPT,
        AgentKind::Analysis => ANALYSIS_PROMPT,
    }
}

/// Default one-line description of a sub-agent, shown to the orchestrator.
pub fn sub_agent_description(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Navigation => {
            "Navigate to URLs and verify pages loaded. Does NOT fill forms or extract data."
        }
        AgentKind::Extraction => {
            "Extract and read structured data from the current page (lists, tables, text). Does NOT modify the page or navigate."
        }
        AgentKind::Form => {
            "Fill forms, click buttons and change page state. Does NOT navigate to new URLs."
        }
        AgentKind::Analysis => {
            "Answer questions about the current page, including its visual appearance. Does NOT modify the page."
        }
    }
}

/// Render the orchestrator prompt, listing agents in registry order.
pub fn render_orchestrator_prompt(template: &str, agents: &SubAgentRegistry) -> String {
    let listing = agents
        .all()
        .iter()
        .map(|agent| format!("- {}: {}", agent.name(), agent.description()))
        .collect::<Vec<_>>()
        .join("\n");
    template.replace(AGENTS_PLACEHOLDER, &listing)
}

/// System prompt for the single-agent deployment.
pub fn single_agent_prompt(tools: &ToolRegistry) -> String {
    let listing = tools
        .all()
        .iter()
        .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
        .collect::<Vec<_>>()
        .join("\n");
    SINGLE_AGENT_TEMPLATE.replace("{tools}", &listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::SubAgent;
    use crate::tools::EchoTool;
    use std::sync::Arc;

    #[test]
    fn orchestrator_prompt_lists_agents_in_registry_order() {
        let tools = Arc::new(ToolRegistry::new());
        let mut agents = SubAgentRegistry::new();
        agents.register(Arc::new(SubAgent::preset(AgentKind::Form, tools.clone())));
        agents.register(Arc::new(SubAgent::preset(AgentKind::Navigation, tools)));

        let prompt = render_orchestrator_prompt("Agents:\n{{agents}}\nEnd", &agents);
        assert_eq!(
            prompt,
            format!(
                "Agents:\n- agent_form: {}\n- agent_navigate: {}\nEnd",
                sub_agent_description(AgentKind::Form),
                sub_agent_description(AgentKind::Navigation)
            )
        );
    }

    #[test]
    fn default_template_has_placeholder() {
        assert!(ORCHESTRATOR_TEMPLATE.contains(AGENTS_PLACEHOLDER));
    }

    #[test]
    fn single_agent_prompt_lists_tools() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        let prompt = single_agent_prompt(&tools);
        assert!(prompt.contains("- echo: "));
        assert!(!prompt.contains("{tools}"));
    }
}
