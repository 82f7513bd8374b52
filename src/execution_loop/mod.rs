pub mod agent;
pub mod attempt_log;
pub mod cancellation;
pub mod error_classifier;
pub mod error_recovery;
pub mod run_result;

pub use agent::*;
pub use attempt_log::*;
pub use cancellation::*;
pub use error_classifier::*;
pub use error_recovery::*;
pub use run_result::*;
