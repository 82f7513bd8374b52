//! Attempt Log
//!
//! Ordered record of every attempt of one run. Entries are appended once
//! and never edited, removed or reordered.

use crate::error::FailureKind;
use crate::execution::result::QueryResult;
use crate::execution_loop::error_classifier::SqlErrorClass;
use crate::verifier::VerificationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened when the attempt's SQL was sent to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    SuccessWithRows { rows: usize },
    SuccessEmpty,
    ExecutionError { message: String },
    /// Generation or extraction failed before anything ran.
    NotExecuted,
}

impl ExecutionOutcome {
    pub fn from_result(result: &QueryResult) -> Self {
        if result.is_empty() {
            ExecutionOutcome::SuccessEmpty
        } else {
            ExecutionOutcome::SuccessWithRows {
                rows: result.row_count(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::SuccessWithRows { .. } | ExecutionOutcome::SuccessEmpty
        )
    }
}

/// Why an attempt did not end the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub error_class: SqlErrorClass,
    pub reason: String,
}

/// Attempt log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt number
    pub index: u32,
    pub sql: Option<String>,
    /// Raw generator text the SQL was extracted from
    pub response: Option<String>,
    pub execution: ExecutionOutcome,
    pub verification: Option<VerificationOutcome>,
    pub failure: Option<AttemptFailure>,
    /// For attempts after the first: the guidance this attempt was repairing from
    pub correction_rationale: Option<String>,
    pub explanation: Option<String>,
    pub explanation_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Attempt {
    pub fn new(index: u32) -> Self {
        let now = Utc::now();
        Self {
            index,
            sql: None,
            response: None,
            execution: ExecutionOutcome::NotExecuted,
            verification: None,
            failure: None,
            correction_rationale: None,
            explanation: None,
            explanation_error: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn with_correction_rationale(mut self, rationale: Option<String>) -> Self {
        self.correction_rationale = rationale;
        self
    }

    pub fn with_response(mut self, response: String) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_sql(mut self, sql: String) -> Self {
        self.sql = Some(sql);
        self
    }

    pub fn with_execution(mut self, execution: ExecutionOutcome) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_verification(mut self, verification: VerificationOutcome) -> Self {
        self.verification = Some(verification);
        self
    }

    pub fn with_failure(mut self, kind: FailureKind, error_class: SqlErrorClass, reason: String) -> Self {
        self.failure = Some(AttemptFailure {
            kind,
            error_class,
            reason,
        });
        self
    }

    pub fn with_explanation(mut self, explanation: String, error: Option<String>) -> Self {
        self.explanation = Some(explanation);
        self.explanation_error = error;
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
            && self.execution.is_success()
            && self.verification.as_ref().map_or(false, VerificationOutcome::is_pass)
    }
}

/// Append-only, read-only to everyone but the agent that owns the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptLog {
    entries: Vec<Attempt>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, attempt: Attempt) {
        debug_assert_eq!(attempt.index as usize, self.entries.len() + 1);
        self.entries.push(attempt);
    }

    pub fn entries(&self) -> &[Attempt] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Attempt> {
        self.entries.last()
    }

    /// Most recent attempt that produced SQL.
    pub fn last_with_sql(&self) -> Option<&Attempt> {
        self.entries.iter().rev().find(|a| a.sql.is_some())
    }
}
