//! Tools that reach the human operator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, Tool, ToolName};
use crate::agents::AgentContext;
use crate::interaction::UserInteractionPort;

/// Both user tools over one interaction port.
pub fn user_tools(user: Arc<dyn UserInteractionPort>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(AskQuestionTool::new(user.clone())) as Arc<dyn Tool>,
        Arc::new(WaitActionTool::new(user)),
    ]
}

pub struct AskQuestionTool {
    user: Arc<dyn UserInteractionPort>,
}

impl AskQuestionTool {
    pub fn new(user: Arc<dyn UserInteractionPort>) -> Self {
        Self { user }
    }
}

#[derive(Deserialize)]
struct QuestionArgs {
    question: String,
}

#[async_trait]
impl Tool for AskQuestionTool {
    fn name(&self) -> ToolName {
        ToolName::UserAskQuestion
    }

    fn description(&self) -> String {
        "Ask the user a question and wait for the answer. Use this whenever you lack information \
         needed to continue, such as credentials, choices or missing details."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the user"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: QuestionArgs = parse_args(args)?;
        self.user.ask_question(&args.question).await
    }
}

pub struct WaitActionTool {
    user: Arc<dyn UserInteractionPort>,
}

impl WaitActionTool {
    pub fn new(user: Arc<dyn UserInteractionPort>) -> Self {
        Self { user }
    }
}

#[derive(Deserialize)]
struct WaitArgs {
    message: String,
}

#[async_trait]
impl Tool for WaitActionTool {
    fn name(&self) -> ToolName {
        ToolName::UserWaitAction
    }

    fn description(&self) -> String {
        "Pause and wait for the user to complete a manual action in the browser, such as solving \
         a CAPTCHA, finishing 2FA or logging in. Explain clearly what the user must do."
            .to_string()
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Instructions explaining what the user needs to do"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, _ctx: &AgentContext, args: &str) -> anyhow::Result<String> {
        let args: WaitArgs = parse_args(args)?;
        self.user.wait_for_user_action(&args.message).await?;
        Ok("User confirmed action completion".to_string())
    }
}
