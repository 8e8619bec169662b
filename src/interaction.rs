//! User interaction - questions to the user and manual-action pauses.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::agents::AgentEvent;
use crate::util::preview;

/// Port through which tools reach the human operator.
#[async_trait]
pub trait UserInteractionPort: Send + Sync {
    async fn ask_question(&self, question: &str) -> anyhow::Result<String>;

    /// Block until the user confirms a manual action is done.
    async fn wait_for_user_action(&self, message: &str) -> anyhow::Result<()>;
}

/// Terminal implementation reading answers from stdin.
pub struct ConsoleInteraction {
    input: Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for ConsoleInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleInteraction {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    /// Read one line from stdin.
    pub async fn read_line(&self) -> anyhow::Result<String> {
        let mut input = self.input.lock().await;
        match input.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => anyhow::bail!("stdin closed"),
        }
    }
}

#[async_trait]
impl UserInteractionPort for ConsoleInteraction {
    async fn ask_question(&self, question: &str) -> anyhow::Result<String> {
        eprintln!("\n❓ {}", question);
        eprint!("> ");
        let answer = self.read_line().await?;
        tracing::info!(question = %question, "User answered question");
        Ok(answer)
    }

    async fn wait_for_user_action(&self, message: &str) -> anyhow::Result<()> {
        eprintln!("\n⏸  {}", message);
        eprintln!("Press Enter when done...");
        self.read_line().await?;
        tracing::info!("User confirmed manual action");
        Ok(())
    }
}

/// Render a progress event for the terminal.
///
/// Streamed text is returned unchanged so consecutive deltas join up; every
/// other event is a full line.
pub fn render_event(event: &AgentEvent) -> String {
    match event {
        AgentEvent::Iteration {
            agent,
            iteration,
            max_iterations,
        } => format!("\n[{}] iteration {}/{}\n", agent, iteration, max_iterations),
        AgentEvent::Thinking { agent, content } => {
            format!("[{}] 💭 {}\n", agent, preview(content, 300))
        }
        AgentEvent::TextDelta { content, .. } => content.clone(),
        AgentEvent::ToolStart { agent, tool, arguments } => {
            format!("\n[{}] 🔧 {} {}\n", agent, tool, preview(arguments, 200))
        }
        AgentEvent::ToolResult {
            agent,
            tool,
            observation,
            is_error,
        } => {
            let marker = if *is_error { "❌" } else { "✅" };
            format!("[{}] {} {}: {}\n", agent, marker, tool, preview(observation, 300))
        }
        AgentEvent::Evaluation {
            agent,
            attempt,
            success,
            confidence,
            should_retry,
        } => format!(
            "[{}] ⚖ attempt {}: success={} confidence={:.2} retry={}\n",
            agent, attempt, success, confidence, should_retry
        ),
    }
}
