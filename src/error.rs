use thiserror::Error;

use crate::engines::evaluation::EvaluationFailure;

#[derive(Error, Debug)]
pub enum AeteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Evaluation failure: {0}")]
    Evaluation(#[from] EvaluationFailure),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AeteError>;

/// Persistence faults. All of them are treated as transient by the
/// orchestrator and retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serde(String),

    #[error("Document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}
