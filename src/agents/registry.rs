//! Registry of sub-agents available to the orchestrator.

use std::collections::HashMap;
use std::sync::Arc;

use super::subagent::SubAgent;
use super::types::AgentKind;

/// Insertion-ordered set of sub-agents, one per [`AgentKind`].
///
/// Registering a kind twice replaces the earlier agent in its original
/// position and returns it.
#[derive(Default)]
pub struct SubAgentRegistry {
    agents: Vec<Arc<SubAgent>>,
    index: HashMap<AgentKind, usize>,
}

impl SubAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Arc<SubAgent>) -> Option<Arc<SubAgent>> {
        let kind = agent.kind();
        match self.index.get(&kind) {
            Some(&slot) => {
                tracing::warn!(agent = %kind, "Replacing already registered sub-agent");
                Some(std::mem::replace(&mut self.agents[slot], agent))
            }
            None => {
                self.index.insert(kind, self.agents.len());
                self.agents.push(agent);
                None
            }
        }
    }

    pub fn get(&self, kind: AgentKind) -> Option<&Arc<SubAgent>> {
        self.index.get(&kind).map(|&slot| &self.agents[slot])
    }

    pub fn all(&self) -> &[Arc<SubAgent>] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
