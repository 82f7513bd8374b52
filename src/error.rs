use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AstroError {
    #[error("Catalog load error: {0}")]
    CatalogLoad(String),

    #[error("Embedding model mismatch: {0}")]
    EmbeddingModelMismatch(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation transport error: {0}")]
    GenerationTransport(String),

    #[error("SQL extraction error: {0}")]
    SqlExtraction(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Verification failure: {0}")]
    Verification(String),

    #[error("{stage} timed out after {after_ms} ms")]
    Timeout { stage: String, after_ms: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Max retries exceeded after {attempts} attempt(s): {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl AstroError {
    pub fn timeout(stage: impl Into<String>, after_ms: u64) -> Self {
        AstroError::Timeout {
            stage: stage.into(),
            after_ms,
        }
    }

    /// Stable classification used by the attempt log.
    pub fn kind(&self) -> FailureKind {
        match self {
            AstroError::CatalogLoad(_) => FailureKind::CatalogLoad,
            AstroError::EmbeddingModelMismatch(_) => FailureKind::EmbeddingModelMismatch,
            AstroError::Embedding(_) => FailureKind::Embedding,
            AstroError::GenerationTransport(_) => FailureKind::GenerationTransport,
            AstroError::SqlExtraction(_) => FailureKind::SqlExtraction,
            AstroError::Execution(_) => FailureKind::Execution,
            AstroError::Verification(_) => FailureKind::Verification,
            AstroError::Timeout { .. } => FailureKind::Timeout,
            AstroError::Cancelled => FailureKind::Cancelled,
            AstroError::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
            AstroError::Config(_) => FailureKind::Config,
            AstroError::Io(_) | AstroError::Json(_) | AstroError::Csv(_) | AstroError::Regex(_) => {
                FailureKind::Internal
            }
        }
    }

    /// The underlying message without the kind prefix, for prompts and logs.
    pub fn detail(&self) -> String {
        match self {
            AstroError::CatalogLoad(msg)
            | AstroError::EmbeddingModelMismatch(msg)
            | AstroError::Embedding(msg)
            | AstroError::GenerationTransport(msg)
            | AstroError::SqlExtraction(msg)
            | AstroError::Execution(msg)
            | AstroError::Verification(msg)
            | AstroError::Config(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Errors that abort a run instead of consuming an attempt.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            AstroError::Cancelled
                | AstroError::EmbeddingModelMismatch(_)
                | AstroError::CatalogLoad(_)
                | AstroError::Config(_)
        )
    }
}

/// Failure taxonomy surfaced to callers alongside a human-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CatalogLoad,
    EmbeddingModelMismatch,
    Embedding,
    GenerationTransport,
    SqlExtraction,
    Execution,
    Verification,
    Timeout,
    Cancelled,
    RetriesExhausted,
    Config,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::CatalogLoad => "catalog-load",
            FailureKind::EmbeddingModelMismatch => "embedding-model-mismatch",
            FailureKind::Embedding => "embedding",
            FailureKind::GenerationTransport => "generation-transport",
            FailureKind::SqlExtraction => "sql-extraction",
            FailureKind::Execution => "execution",
            FailureKind::Verification => "verification",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::RetriesExhausted => "retries-exhausted",
            FailureKind::Config => "config",
            FailureKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

pub type Result<T> = std::result::Result<T, AstroError>;
