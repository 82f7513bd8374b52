//! Query Executor Trait - contract for anything that can run a SQL statement

use crate::error::Result;
use crate::execution::result::QueryResult;
use async_trait::async_trait;

/// Runs one SQL statement and returns a tabular result.
///
/// Failures are `AstroError::Execution` whose message is usable verbatim
/// in the next correction prompt.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Engine name, recorded on every result
    fn name(&self) -> &str;

    /// `row_limit` is a hint; engines may ignore it.
    async fn execute(&self, sql: &str, row_limit: Option<u64>) -> Result<QueryResult>;
}
