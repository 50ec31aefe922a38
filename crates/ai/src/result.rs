use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    #[error("invalid classifier input: {0}")]
    InvalidInput(String),

    /// The collaborator could not be reached or timed out; the same round may be retried.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The collaborator answered with something unusable.
    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AiError::Unavailable(_))
    }
}
