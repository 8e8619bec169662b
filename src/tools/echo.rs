//! Diagnostic tool that returns its input.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolName};
use crate::agents::AgentContext;

pub struct EchoTool;

#[derive(Deserialize)]
struct EchoArgs {
    msg: String,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> ToolName {
        ToolName::Echo
    }

    fn description(&self) -> String {
        "Echo a message back unchanged. Useful for checking that tool calls work.".to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "msg": {
                    "type": "string",
                    "description": "The message to echo back"
                }
            },
            "required": ["msg"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: EchoArgs = parse_args(args)?;
        Ok(args.msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedChat;
    use std::sync::Arc;

    #[tokio::test]
    async fn echoes_message() {
        let ctx = AgentContext::new(Arc::new(ScriptedChat::default()));
        assert_eq!(EchoTool.execute(&ctx, r#"{"msg":"hi"}"#).await.unwrap(), "hi");
        let err = EchoTool.execute(&ctx, "{}").await.unwrap_err();
        assert!(err.to_string().starts_with("invalid arguments"));
    }
}
