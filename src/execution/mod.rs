//! Execution - runs SQL against the remote astronomical database

pub mod engine;
pub mod result;
pub mod skyserver;

pub use engine::QueryExecutor;
pub use result::QueryResult;
pub use skyserver::SkyServerExecutor;
