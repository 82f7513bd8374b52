pub mod agent_prompts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod execution;
pub mod execution_loop;
pub mod explain;
pub mod llm;
pub mod schema_rag;
pub mod sql_extract;
pub mod verifier;

pub use agent_prompts::{GenerationRequest, PriorAttempt, PromptBuilder, RequestPurpose};
pub use catalog::Catalog;
pub use config::{AgentConfig, AppConfig, EmbeddingProvider, Timeouts};
pub use error::{AstroError, FailureKind, Result};
pub use execution::{QueryExecutor, QueryResult, SkyServerExecutor};
pub use execution_loop::{
    Attempt, AttemptLog, Cancellable, CancellationToken, CorrectionAgent, ExecutionOutcome, RunResult,
};
pub use llm::{Generator, OpenAiGenerator};
pub use schema_rag::{Embedder, HashEmbedder, OpenAiEmbedder, SchemaIndex, SchemaRetriever};
pub use verifier::{EmptyResultPolicy, Judge, Judgment, LlmJudge, VerificationOutcome};
