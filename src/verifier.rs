//! Result verification: local structural checks plus a semantic judgment.

use crate::agent_prompts::PromptBuilder;
use crate::error::{AstroError, Result};
use crate::execution::result::QueryResult;
use crate::llm::Generator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason recorded when the judge's answer cannot be read as pass or fail.
pub const AMBIGUOUS_VERIFICATION: &str = "ambiguous-verification";

pub const DEFAULT_EMPTY_RESULT_CONFIDENCE: f32 = 0.8;

const ERROR_PHRASES: [&str; 7] = [
    "error",
    "failed",
    "unable",
    "cannot",
    "syntax",
    "invalid",
    "incorrect",
];

/// What to do with a query that executed fine but returned zero rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResultPolicy {
    /// Zero rows is a valid answer; the judge is not consulted.
    Accept,
    /// Zero rows passes unless the judge fails it with high confidence.
    #[default]
    Judge,
    /// Zero rows is a verification failure.
    Reject,
}

impl FromStr for EmptyResultPolicy {
    type Err = AstroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(EmptyResultPolicy::Accept),
            "judge" => Ok(EmptyResultPolicy::Judge),
            "reject" => Ok(EmptyResultPolicy::Reject),
            other => Err(AstroError::Config(format!(
                "unknown empty-result policy '{}' (expected accept, judge or reject)",
                other
            ))),
        }
    }
}

impl fmt::Display for EmptyResultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmptyResultPolicy::Accept => "accept",
            EmptyResultPolicy::Judge => "judge",
            EmptyResultPolicy::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// A semantic judgment of whether SQL and result answer the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub verdict: Verdict,
    pub reasoning: String,
    pub confidence: Option<f32>,
}

impl Judgment {
    pub fn pass(reasoning: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Pass,
            reasoning: reasoning.into(),
            confidence: None,
        }
    }

    pub fn fail(reasoning: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fail,
            reasoning: reasoning.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn ambiguous() -> Self {
        Self::fail(AMBIGUOUS_VERIFICATION)
    }

    pub fn is_ambiguous(&self) -> bool {
        self.verdict == Verdict::Fail && self.reasoning == AMBIGUOUS_VERIFICATION
    }
}

/// Semantic check capability, replaceable by a deterministic stub in tests.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, question: &str, sql: &str, result: &QueryResult) -> Result<Judgment>;
}

/// Judge backed by a second generator call.
pub struct LlmJudge {
    generator: Arc<dyn Generator>,
    prompts: PromptBuilder,
}

impl LlmJudge {
    pub fn new(generator: Arc<dyn Generator>, prompts: PromptBuilder) -> Self {
        Self { generator, prompts }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, question: &str, sql: &str, result: &QueryResult) -> Result<Judgment> {
        let request = self.prompts.judge(question, sql, result);
        let response = self.generator.generate(&request).await?;
        let judgment = parse_judgment(&response);
        debug!(verdict = ?judgment.verdict, confidence = ?judgment.confidence, "Parsed judgment");
        Ok(judgment)
    }
}

#[derive(Deserialize)]
struct RawJudgment {
    verdict: Option<serde_json::Value>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Read a judge response: a JSON object first, then `VERDICT: PASS|FAIL`
/// style lines. Anything else is ambiguous and fails.
pub fn parse_judgment(text: &str) -> Judgment {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(raw) = serde_json::from_str::<RawJudgment>(&text[start..=end]) {
                let verdict = raw.verdict.as_ref().and_then(verdict_from_json);
                if let Some(verdict) = verdict {
                    return Judgment {
                        verdict,
                        reasoning: raw.reasoning.unwrap_or_default(),
                        confidence: raw.confidence.map(|c| c.clamp(0.0, 1.0)),
                    };
                }
                return Judgment::ambiguous();
            }
        }
    }

    let mut verdict = None;
    let mut reasoning = String::new();
    let mut confidence = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_lowercase().as_str() {
            "verdict" => verdict = verdict_from_word(value),
            "reasoning" | "reason" => reasoning = value.trim().to_string(),
            "confidence" => confidence = value.trim().parse::<f32>().ok().map(|c| c.clamp(0.0, 1.0)),
            _ => {}
        }
    }

    match verdict {
        Some(verdict) => Judgment {
            verdict,
            reasoning,
            confidence,
        },
        None => Judgment::ambiguous(),
    }
}

fn verdict_from_json(value: &serde_json::Value) -> Option<Verdict> {
    match value {
        serde_json::Value::Bool(true) => Some(Verdict::Pass),
        serde_json::Value::Bool(false) => Some(Verdict::Fail),
        serde_json::Value::String(s) => verdict_from_word(s),
        _ => None,
    }
}

fn verdict_from_word(word: &str) -> Option<Verdict> {
    match word.trim().trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase().as_str() {
        "pass" | "yes" | "true" | "correct" => Some(Verdict::Pass),
        "fail" | "no" | "false" | "incorrect" => Some(Verdict::Fail),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Pass,
    Fail { reason: String },
}

impl VerificationOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        VerificationOutcome::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, VerificationOutcome::Pass)
    }
}

/// Local checks only: tabular shape, and no execution error leaked as data.
///
/// A zero-row result passes here; the empty-result policy decides it.
pub fn structural_check(result: &QueryResult) -> std::result::Result<(), String> {
    if result.is_empty() {
        return Ok(());
    }
    if result.columns.is_empty() {
        return Err("result has rows but no columns".to_string());
    }
    let width = result.columns.len();
    if let Some((i, row)) = result.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(format!(
            "row {} has {} cells, expected {}",
            i + 1,
            row.len(),
            width
        ));
    }

    if result.row_count() == 1 && width == 1 {
        let cell = match &result.rows[0][0] {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let length = cell.chars().count();
        if length > 200 && cell.matches(' ').count() < 5 {
            return Err(format!(
                "single cell looks like one long unparsed string: {}...",
                cell.chars().take(100).collect::<String>()
            ));
        }
        let lower = cell.to_lowercase();
        if length < 150 && ERROR_PHRASES.iter().any(|p| lower.contains(p)) {
            return Err(format!("single cell looks like an error message: {}", cell));
        }
    }
    Ok(())
}

pub struct Verifier {
    judge: Arc<dyn Judge>,
    policy: EmptyResultPolicy,
    empty_result_confidence: f32,
}

impl Verifier {
    pub fn new(judge: Arc<dyn Judge>, policy: EmptyResultPolicy, empty_result_confidence: f32) -> Self {
        Self {
            judge,
            policy,
            empty_result_confidence,
        }
    }

    pub fn policy(&self) -> EmptyResultPolicy {
        self.policy
    }

    /// Errors are returned only when the judge itself could not be reached.
    pub async fn verify(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
    ) -> Result<VerificationOutcome> {
        if let Err(reason) = structural_check(result) {
            warn!(%reason, "Structural verification failed");
            return Ok(VerificationOutcome::fail(format!(
                "structural check failed: {}",
                reason
            )));
        }

        if result.is_empty() {
            return self.verify_empty(question, sql, result).await;
        }

        let judgment = self.judge.judge(question, sql, result).await?;
        Ok(match judgment.verdict {
            Verdict::Pass => VerificationOutcome::Pass,
            Verdict::Fail => VerificationOutcome::fail(fail_reason(&judgment)),
        })
    }

    async fn verify_empty(
        &self,
        question: &str,
        sql: &str,
        result: &QueryResult,
    ) -> Result<VerificationOutcome> {
        match self.policy {
            EmptyResultPolicy::Accept => Ok(VerificationOutcome::Pass),
            EmptyResultPolicy::Reject => Ok(VerificationOutcome::fail("query returned no rows")),
            EmptyResultPolicy::Judge => {
                let judgment = self.judge.judge(question, sql, result).await?;
                if judgment.is_ambiguous() {
                    return Ok(VerificationOutcome::fail(AMBIGUOUS_VERIFICATION));
                }
                let confident = judgment
                    .confidence
                    .map_or(false, |c| c >= self.empty_result_confidence);
                if judgment.verdict == Verdict::Fail && confident {
                    return Ok(VerificationOutcome::fail(format!(
                        "empty result flagged as suspicious: {}",
                        fail_reason(&judgment)
                    )));
                }
                info!(
                    verdict = ?judgment.verdict,
                    confidence = ?judgment.confidence,
                    "Accepting empty result"
                );
                Ok(VerificationOutcome::Pass)
            }
        }
    }
}

fn fail_reason(judgment: &Judgment) -> String {
    if judgment.reasoning.trim().is_empty() {
        "semantic check failed without a reason".to_string()
    } else {
        judgment.reasoning.clone()
    }
}
