//! Evaluator - an LLM judge for sub-agent results.
//!
//! The judge is advisory. A reply that cannot be decoded yields a permissive
//! verdict (success, confidence 0.5, no retry) instead of an error, so a
//! malformed judgement never blocks a result from reaching the caller.

use serde::{Deserialize, Serialize};

use super::context::AgentContext;
use super::types::{AgentError, AgentKind};
use crate::llm::{ChatOptions, Message};

/// What the judge is asked to assess.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationCriteria<'a> {
    pub task: &'a str,
    pub result: &'a str,
    pub kind: AgentKind,
}

/// The judge's verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub success: bool,
    /// Certainty in `[0, 1]`
    pub confidence: f64,
    pub issues: Vec<String>,
    pub feedback: String,
    pub should_retry: bool,
}

impl EvaluationResult {
    /// Verdict used when the judge's reply cannot be decoded.
    pub fn fail_open() -> Self {
        Self {
            success: true,
            confidence: 0.5,
            issues: Vec::new(),
            feedback: String::new(),
            should_retry: false,
        }
    }
}

/// Wire shape of the judge's JSON. Every field is optional so that partial
/// replies still decode.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    success: Option<bool>,
    confidence: Option<f64>,
    issues: Option<Vec<String>>,
    feedback: Option<String>,
    should_retry: Option<bool>,
}

impl From<RawVerdict> for EvaluationResult {
    fn from(raw: RawVerdict) -> Self {
        let confidence = raw.confidence.unwrap_or(0.0);
        Self {
            success: raw.success.unwrap_or(false),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            issues: raw.issues.unwrap_or_default(),
            feedback: raw.feedback.unwrap_or_default(),
            should_retry: raw.should_retry.unwrap_or(false),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerdictParseError {
    #[error("no JSON object found in judge reply")]
    NoJson,

    #[error("invalid verdict JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Decode the JSON object spanning the first `{` to the last `}` of `reply`.
pub fn parse_verdict(reply: &str) -> Result<EvaluationResult, VerdictParseError> {
    let reply = reply.trim();
    let (Some(start), Some(end)) = (reply.find('{'), reply.rfind('}')) else {
        return Err(VerdictParseError::NoJson);
    };
    if end < start {
        return Err(VerdictParseError::NoJson);
    }
    let raw: RawVerdict = serde_json::from_str(&reply[start..=end])?;
    Ok(raw.into())
}

/// Judges sub-agent output with one blocking model call.
#[derive(Debug, Clone)]
pub struct Evaluator {
    options: ChatOptions,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            options: ChatOptions::with_temperature(0.0),
        }
    }

    /// Build the judge's system prompt for one agent category.
    pub fn system_prompt(kind: AgentKind) -> String {
        let criteria = match kind {
            AgentKind::Navigation => NAVIGATION_CRITERIA,
            AgentKind::Extraction => EXTRACTION_CRITERIA,
            AgentKind::Form => FORM_CRITERIA,
            AgentKind::Analysis => GENERIC_CRITERIA,
        };
        format!("{}\n{}\n{}", JUDGE_PREAMBLE, criteria, JUDGE_RULES)
    }

    /// Judge one result.
    ///
    /// Transport errors and cancellation are returned; an undecodable reply
    /// is not (see [`EvaluationResult::fail_open`]).
    pub async fn evaluate(
        &self,
        ctx: &AgentContext,
        criteria: &EvaluationCriteria<'_>,
    ) -> Result<EvaluationResult, AgentError> {
        let messages = [
            Message::system(Self::system_prompt(criteria.kind)),
            Message::user(format!(
                "Task: {}\n\nActual Result:\n{}",
                criteria.task, criteria.result
            )),
        ];

        let reply = ctx
            .cancellable(ctx.llm.chat(&messages, &[], &self.options))
            .await??;

        match parse_verdict(&reply.content) {
            Ok(verdict) => {
                tracing::info!(
                    agent = %criteria.kind,
                    success = verdict.success,
                    confidence = verdict.confidence,
                    should_retry = verdict.should_retry,
                    issues = verdict.issues.len(),
                    "Evaluation completed"
                );
                Ok(verdict)
            }
            Err(e) => {
                tracing::warn!(
                    agent = %criteria.kind,
                    "Failed to parse evaluation reply, assuming success: {}",
                    e
                );
                Ok(EvaluationResult::fail_open())
            }
        }
    }
}

const JUDGE_PREAMBLE: &str = r#"You are an evaluator. Decide whether an agent accomplished the task it was given.

Compare the task with the agent's actual result and answer with a single JSON object:
{
  "success": true/false,
  "confidence": 0.0-1.0,
  "issues": ["issue1", "issue2"],
  "feedback": "concrete guidance for the next attempt",
  "should_retry": true/false
}

Criteria:"#;

const NAVIGATION_CRITERIA: &str = r#"- The agent reached the requested page.
- Requested elements were located and their selectors reported.
- When asked for elements, both the container and the child selectors are given.

Success: the page was reached or the elements were found with specific selectors
(".product-card", not "div") that the next agent can act on.
Retry: selectors are generic or missing, expected elements were not found, or the page failed to load."#;

const EXTRACTION_CRITERIA: &str = r#"- Data was actually extracted, not merely located or described.
- Every requested field is present.
- The result is structured (numbered list or table).
- Selectors are included for interactive elements such as checkboxes and buttons.

Success: real values for all requested fields, in a structured format, with selectors for follow-up actions.
Retry: only descriptions instead of data, missing fields, or the result reports that nothing was found."#;

const FORM_CRITERIA: &str = r#"- The requested fields were filled.
- The requested buttons were clicked.
- There is evidence the action took effect (redirect, confirmation message).
- Failures are reported with the specific error.

Success: fields filled, actions performed, and the outcome confirmed.
Retry: fields not found, a click failed, or nothing confirms the action."#;

const GENERIC_CRITERIA: &str = r#"- The requested task was completed.
- The result is clear and usable.
- There are no obvious errors or failures."#;

const JUDGE_RULES: &str = r#"
Rules:
- Be strict but fair.
- Confidence expresses certainty: 1.0 means definitely successful, 0.0 definitely failed.
- Recommend a retry only if feedback is likely to improve the result.
- Feedback must be specific and actionable."#;
