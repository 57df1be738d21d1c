use thiserror::Error;

#[derive(Error, Debug)]
pub enum TdhError {
    #[error("Input incomplete: {0}")]
    InputIncomplete(String),
    #[error("Database error: {0}")]
    Database(#[from] clickhouse::error::Error),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TdhError {
    /// Whether a fresh attempt may succeed. Logic defects are never retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, TdhError::InputIncomplete(_) | TdhError::Database(_))
    }
}
