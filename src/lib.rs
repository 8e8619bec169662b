//! # Browser Agent
//!
//! LLM-driven execution of natural-language browser tasks.
//!
//! This library provides:
//! - A tool registry over a closed set of browser, user and delegation tools
//! - A reason/act task loop with streaming response assembly
//! - Specialised sub-agents with allow-listed tools and evaluator-driven retry
//! - An orchestrator that delegates to sub-agents through `agent_*` tools
//!
//! ## Architecture (Orchestrator Mode)
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │           Orchestrator           │
//!        │   (task loop over agent tools)   │
//!        └────────────────┬─────────────────┘
//!                         │ agent_navigate / agent_extract / ...
//!                         ▼
//!        ┌──────────────────────────────────┐
//!        │            SubAgent              │
//!        │ (allow-listed tools + evaluator) │
//!        └────────┬───────────────┬─────────┘
//!                 │               │
//!                 ▼               ▼
//!         ┌──────────────┐ ┌──────────────┐
//!         │ BrowserPort  │ │  ChatPort    │
//!         └──────────────┘ └──────────────┘
//! ```
//!
//! ## Task Flow
//! 1. Receive a task from the command line
//! 2. Loop: ask the model, run requested tools, feed observations back
//! 3. Stream progress events (thinking, text, tool calls, verdicts)
//! 4. Return the final answer and write the task log
//!
//! ## Modules
//! - `agents`: task loop, sub-agents, evaluator and orchestrator
//! - `llm`: chat port, response assembler and OpenRouter adapter
//! - `tools`: tool contract, registry and the concrete tools
//! - `browser`: browser port and the HTTP page session

pub mod agents;
pub mod bootstrap;
pub mod browser;
pub mod config;
pub mod interaction;
pub mod llm;
pub mod logging;
pub mod tools;
pub mod util;

pub use agents::{AgentContext, AgentError, ExecutionResult, TaskExecutor};
pub use config::Config;
