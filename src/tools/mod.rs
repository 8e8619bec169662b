//! Tool system for the agent.
//!
//! Tools are the agent's hands: browser actions, questions to the user, and
//! delegation to sub-agents all sit behind the same [`Tool`] contract. Every
//! tool is identified by a member of the closed [`ToolName`] enumeration, so a
//! name the model invents simply fails to resolve.
//!
//! ## Ordering
//!
//! [`ToolRegistry`] keeps insertion order. Tool definitions sent to the model
//! and tool listings in prompts are therefore identical across runs.

mod agent;
mod browser;
mod echo;
mod user;

pub use agent::AgentTool;
pub use browser::{
    browser_tools, ClickTool, FillTool, NavigateTool, ObserveTool, PressEnterTool,
    QueryElementsTool, ScreenshotTool, ScrollTool, SearchTool,
};
pub use echo::EchoTool;
pub use user::{user_tools, AskQuestionTool, WaitActionTool};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::agents::AgentContext;
use crate::llm::ToolDefinition;

// ============================================================================
// Tool Identity
// ============================================================================

/// Every tool the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolName {
    BrowserNavigate,
    BrowserClick,
    BrowserFill,
    BrowserScroll,
    BrowserScreenshot,
    BrowserPressEnter,
    BrowserObserve,
    BrowserQueryElements,
    BrowserSearch,
    AgentNavigate,
    AgentExtract,
    AgentForm,
    AgentAnalyze,
    UserAskQuestion,
    UserWaitAction,
    Echo,
}

impl ToolName {
    pub const ALL: [ToolName; 16] = [
        ToolName::BrowserNavigate,
        ToolName::BrowserClick,
        ToolName::BrowserFill,
        ToolName::BrowserScroll,
        ToolName::BrowserScreenshot,
        ToolName::BrowserPressEnter,
        ToolName::BrowserObserve,
        ToolName::BrowserQueryElements,
        ToolName::BrowserSearch,
        ToolName::AgentNavigate,
        ToolName::AgentExtract,
        ToolName::AgentForm,
        ToolName::AgentAnalyze,
        ToolName::UserAskQuestion,
        ToolName::UserWaitAction,
        ToolName::Echo,
    ];

    /// Wire name, as sent to and received from the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::BrowserNavigate => "browser_navigate",
            ToolName::BrowserClick => "browser_click",
            ToolName::BrowserFill => "browser_fill",
            ToolName::BrowserScroll => "browser_scroll",
            ToolName::BrowserScreenshot => "browser_screenshot",
            ToolName::BrowserPressEnter => "browser_press_enter",
            ToolName::BrowserObserve => "browser_observe",
            ToolName::BrowserQueryElements => "browser_query_elements",
            ToolName::BrowserSearch => "browser_search",
            ToolName::AgentNavigate => "agent_navigate",
            ToolName::AgentExtract => "agent_extract",
            ToolName::AgentForm => "agent_form",
            ToolName::AgentAnalyze => "agent_analyze",
            ToolName::UserAskQuestion => "user_ask_question",
            ToolName::UserWaitAction => "user_wait_action",
            ToolName::Echo => "echo",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownTool(pub String);

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}

impl Serialize for ToolName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Tool Trait and Registry
// ============================================================================

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    /// A description of what this tool does, shown to the model.
    fn description(&self) -> String;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the raw JSON argument payload.
    ///
    /// Errors are reported to the model as observations; they never abort
    /// the calling loop.
    async fn execute(&self, ctx: &AgentContext, args: &str) -> anyhow::Result<String>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: self.description(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A set of tools a loop can dispatch to.
pub trait ToolSet: Send + Sync {
    fn resolve(&self, name: ToolName) -> Option<Arc<dyn Tool>>;

    /// Definitions in stable order.
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// Registry of available tools.
///
/// Registering a name that is already present replaces the earlier tool in
/// place, keeping its position; the replaced tool is returned.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<ToolName, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name();
        match self.index.get(&name) {
            Some(&slot) => {
                tracing::warn!(tool = %name, "Replacing already registered tool");
                Some(std::mem::replace(&mut self.tools[slot], tool))
            }
            None => {
                tracing::debug!(tool = %name, "Registered tool");
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
                None
            }
        }
    }

    pub fn extend(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: ToolName) -> Option<&Arc<dyn Tool>> {
        self.index.get(&name).map(|&slot| &self.tools[slot])
    }

    pub fn has_tool(&self, name: ToolName) -> bool {
        self.index.contains_key(&name)
    }

    pub fn all(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn names(&self) -> Vec<ToolName> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Read-only projection limited to `allowed`, in registry order.
    pub fn filtered<'a>(&'a self, allowed: &'a [ToolName]) -> FilteredTools<'a> {
        FilteredTools {
            registry: self,
            allowed,
        }
    }
}

impl ToolSet for ToolRegistry {
    fn resolve(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.get(name).cloned()
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }
}

/// Allow-listed view over a [`ToolRegistry`].
pub struct FilteredTools<'a> {
    registry: &'a ToolRegistry,
    allowed: &'a [ToolName],
}

impl FilteredTools<'_> {
    fn permits(&self, name: ToolName) -> bool {
        self.allowed.contains(&name)
    }
}

impl ToolSet for FilteredTools<'_> {
    fn resolve(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        if self.permits(name) {
            self.registry.resolve(name)
        } else {
            None
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .all()
            .iter()
            .filter(|t| self.permits(t.name()))
            .map(|t| t.definition())
            .collect()
    }
}

/// Decode a tool's JSON argument payload.
///
/// An empty payload is treated as `{}` since some models omit arguments for
/// parameterless tools.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &str) -> anyhow::Result<T> {
    let args = if args.trim().is_empty() { "{}" } else { args };
    serde_json::from_str(args).map_err(|e| anyhow::anyhow!("invalid arguments: {}", e))
}
