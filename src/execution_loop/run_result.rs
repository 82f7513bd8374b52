//! Terminal outcome of one run, owned by the caller once returned.

use crate::error::{AstroError, FailureKind};
use crate::execution::result::QueryResult;
use crate::execution_loop::attempt_log::AttemptLog;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_RETRIES_EXCEEDED: &str = "max retries exceeded";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunResult {
    Succeeded {
        run_id: Uuid,
        question: String,
        sql: String,
        result: QueryResult,
        explanation: String,
        log: AttemptLog,
    },
    Exhausted {
        run_id: Uuid,
        question: String,
        reason: String,
        /// SQL of the last attempt that produced any
        last_sql: Option<String>,
        /// Failure of the final attempt, verbatim
        last_error: Option<String>,
        last_failure_kind: Option<FailureKind>,
        log: AttemptLog,
    },
}

impl RunResult {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, RunResult::Succeeded { .. })
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            RunResult::Succeeded { run_id, .. } | RunResult::Exhausted { run_id, .. } => *run_id,
        }
    }

    pub fn log(&self) -> &AttemptLog {
        match self {
            RunResult::Succeeded { log, .. } | RunResult::Exhausted { log, .. } => log,
        }
    }

    pub fn attempts(&self) -> usize {
        self.log().len()
    }

    /// Final SQL on success, last attempted SQL otherwise.
    pub fn sql(&self) -> Option<&str> {
        match self {
            RunResult::Succeeded { sql, .. } => Some(sql),
            RunResult::Exhausted { last_sql, .. } => last_sql.as_deref(),
        }
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            RunResult::Succeeded { result, .. } => Some(result),
            RunResult::Exhausted { .. } => None,
        }
    }

    /// `RetriesExhausted` for an exhausted run.
    pub fn error(&self) -> Option<AstroError> {
        match self {
            RunResult::Succeeded { .. } => None,
            RunResult::Exhausted { last_error, log, .. } => Some(AstroError::RetriesExhausted {
                attempts: log.len() as u32,
                last_error: last_error.clone().unwrap_or_default(),
            }),
        }
    }
}
