//! Configuration management for the browser agent.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required. Your OpenRouter API key.
//! - `DEFAULT_MODEL` - Optional. The LLM model to use. Defaults to `anthropic/claude-sonnet-4.5`.
//! - `OPENROUTER_BASE_URL` - Optional. Defaults to `https://openrouter.ai/api/v1`.
//! - `AGENT_MODE` - Optional. `orchestrator` (default) or `single`.
//! - `MAX_ITERATIONS` - Optional. Single-agent iteration ceiling. Defaults to `50`.
//! - `ORCHESTRATOR_MAX_ITERATIONS` - Optional. Orchestrator iteration ceiling. Defaults to `30`.
//! - `MAX_OBSERVATION_LEN` - Optional. Tool observation cap in bytes. Defaults to `20000`.
//! - `STREAMING` - Optional. Stream model responses. Defaults to `true`.
//! - `EVALUATOR_ENABLED` - Optional. Judge sub-agent results. Defaults to `true`.
//! - `ECHO_TOOL_ENABLED` - Optional. Register the diagnostic `echo` tool. Defaults to `false`.
//! - `LOG_DIR` - Optional. Directory for per-task log files. Defaults to `log`.
//! - `TASK_LOG_ENABLED` - Optional. Write a log file per task. Defaults to `true`.
//! - `BROWSER_TIMEOUT_SECS` - Optional. Page load timeout. Defaults to `30`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::util::parse_bool;

pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.5";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which executor runs the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentMode {
    /// One loop over every tool
    Single,
    /// Delegation to sub-agents
    #[default]
    Orchestrator,
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(AgentMode::Single),
            "orchestrator" => Ok(AgentMode::Orchestrator),
            other => Err(format!("expected 'single' or 'orchestrator', got '{}'", other)),
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentMode::Single => f.write_str("single"),
            AgentMode::Orchestrator => f.write_str("orchestrator"),
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// LLM model identifier (OpenRouter format)
    pub default_model: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    pub mode: AgentMode,

    /// Iteration ceiling of the single agent
    pub max_iterations: usize,

    /// Iteration ceiling of the orchestrator
    pub orchestrator_max_iterations: usize,

    /// Tool observations longer than this many bytes are truncated
    pub max_observation_len: usize,

    pub streaming: bool,

    pub evaluator_enabled: bool,

    pub echo_tool_enabled: bool,

    /// Directory for per-task log files
    pub log_dir: PathBuf,

    pub task_log_enabled: bool,

    pub browser_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set
    /// and `ConfigError::InvalidValue` for unparsable numbers or modes.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let mut config = Self::new(api_key, lookup("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()));

        if let Some(base_url) = lookup("OPENROUTER_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        config.mode = parsed(&lookup, "AGENT_MODE", config.mode)?;
        config.max_iterations = positive(&lookup, "MAX_ITERATIONS", config.max_iterations)?;
        config.orchestrator_max_iterations =
            positive(&lookup, "ORCHESTRATOR_MAX_ITERATIONS", config.orchestrator_max_iterations)?;
        config.max_observation_len = positive(&lookup, "MAX_OBSERVATION_LEN", config.max_observation_len)?;
        config.streaming = flag(&lookup, "STREAMING", config.streaming);
        config.evaluator_enabled = flag(&lookup, "EVALUATOR_ENABLED", config.evaluator_enabled);
        config.echo_tool_enabled = flag(&lookup, "ECHO_TOOL_ENABLED", config.echo_tool_enabled);
        if let Some(dir) = lookup("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        config.task_log_enabled = flag(&lookup, "TASK_LOG_ENABLED", config.task_log_enabled);
        config.browser_timeout = Duration::from_secs(positive(
            &lookup,
            "BROWSER_TIMEOUT_SECS",
            config.browser_timeout.as_secs() as usize,
        )? as u64);

        Ok(config)
    }

    /// Create a config with default values (useful for testing).
    pub fn new(api_key: String, default_model: String) -> Self {
        Self {
            api_key,
            default_model,
            base_url: DEFAULT_BASE_URL.to_string(),
            mode: AgentMode::default(),
            max_iterations: 50,
            orchestrator_max_iterations: 30,
            max_observation_len: 20_000,
            streaming: true,
            evaluator_enabled: true,
            echo_tool_enabled: false,
            log_dir: PathBuf::from("log"),
            task_log_enabled: true,
            browser_timeout: Duration::from_secs(30),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: usize) -> Result<usize, ConfigError> {
    match parsed(lookup, name, default)? {
        0 => Err(ConfigError::InvalidValue(name.to_string(), "must be greater than zero".to_string())),
        n => Ok(n),
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    lookup(name).map_or(default, |raw| parse_bool(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn api_key_is_required() {
        assert_eq!(
            load(&[]).unwrap_err(),
            ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string())
        );
        assert!(load(&[("OPENROUTER_API_KEY", "  ")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("OPENROUTER_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.mode, AgentMode::Orchestrator);
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.orchestrator_max_iterations, 30);
        assert_eq!(config.max_observation_len, 20_000);
        assert!(config.streaming);
        assert!(config.evaluator_enabled);
        assert!(!config.echo_tool_enabled);
        assert_eq!(config.log_dir, PathBuf::from("log"));
        assert_eq!(config.browser_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("DEFAULT_MODEL", "openai/gpt-4o"),
            ("OPENROUTER_BASE_URL", "http://localhost:8080/v1/"),
            ("AGENT_MODE", "Single"),
            ("MAX_ITERATIONS", "12"),
            ("STREAMING", "off"),
            ("ECHO_TOOL_ENABLED", "1"),
            ("BROWSER_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.default_model, "openai/gpt-4o");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.mode, AgentMode::Single);
        assert_eq!(config.max_iterations, 12);
        assert!(!config.streaming);
        assert!(config.echo_tool_enabled);
        assert_eq!(config.browser_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = load(&[("OPENROUTER_API_KEY", "k"), ("MAX_ITERATIONS", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "MAX_ITERATIONS"));

        let err = load(&[("OPENROUTER_API_KEY", "k"), ("ORCHESTRATOR_MAX_ITERATIONS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "ORCHESTRATOR_MAX_ITERATIONS"));

        let err = load(&[("OPENROUTER_API_KEY", "k"), ("AGENT_MODE", "swarm")]).unwrap_err();
        assert!(err.to_string().contains("swarm"));
    }
}
