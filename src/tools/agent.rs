//! Delegation tool: exposes a sub-agent to the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolName};
use crate::agents::{AgentContext, SubAgent};
use crate::util::preview;

pub struct AgentTool {
    agent: Arc<SubAgent>,
}

impl AgentTool {
    pub fn new(agent: Arc<SubAgent>) -> Self {
        Self { agent }
    }
}

#[derive(Deserialize)]
struct DelegateArgs {
    task: String,
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> ToolName {
        self.agent.name()
    }

    fn description(&self) -> String {
        self.agent.description().to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The specific task for this agent to perform"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: DelegateArgs = parse_args(args)?;
        if args.task.trim().is_empty() {
            anyhow::bail!("task must not be empty");
        }

        tracing::info!(agent = %self.agent.kind(), task = %preview(&args.task, 120), "Delegating to sub-agent");
        match self.agent.execute(ctx, &args.task).await {
            Ok(result) => Ok(result.final_answer),
            Err(e) => {
                tracing::error!(agent = %self.agent.kind(), "Sub-agent failed: {}", e);
                Err(e.into())
            }
        }
    }
}
