pub mod evaluator;
pub mod policy;
pub mod portfolio;
pub mod record;

pub use evaluator::FitnessEvaluator;
pub use policy::{QPolicy, StrategyParams};
pub use portfolio::Portfolio;
pub use record::{FitnessMetrics, FitnessRecord, SENTINEL_FITNESS};

use thiserror::Error;

use crate::execution::ExecutorError;

/// Reasons an evaluation ends in a sentinel record instead of a score
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationFailure {
    #[error("Executor failure: {0}")]
    Executor(ExecutorError),

    #[error("Evaluation exceeded its {budget_ms} ms budget")]
    Timeout { budget_ms: u64 },

    #[error("No executor session: {0}")]
    SessionUnavailable(String),

    #[error("Invalid genome: {0}")]
    InvalidGenome(String),

    #[error("Market window {window} has {ticks} ticks, need at least {required}")]
    NoMarketData {
        window: String,
        ticks: usize,
        required: usize,
    },
}

impl From<ExecutorError> for EvaluationFailure {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Unavailable(reason) => EvaluationFailure::SessionUnavailable(reason),
            other => EvaluationFailure::Executor(other),
        }
    }
}
