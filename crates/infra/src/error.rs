//! Engine-level error: domain failures plus the infrastructure around them.

use thiserror::Error;

use ledgergate_ai::AiError;
use ledgergate_core::{DomainError, ErrorCategory};

use crate::ledger_store::LedgerStoreError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("classifier: {0}")]
    Classifier(#[from] AiError),

    #[error("ledger store: {0}")]
    Store(#[from] LedgerStoreError),

    /// A lock guarding in-memory state was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Domain(e) => e.category(),
            EngineError::Classifier(AiError::InvalidInput(_)) => ErrorCategory::Validation,
            EngineError::Classifier(_) => ErrorCategory::Unavailable,
            EngineError::Store(LedgerStoreError::Concurrency(_)) => ErrorCategory::Conflict,
            EngineError::Store(_) | EngineError::Poisoned(_) | EngineError::Config(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Domain(e) => e.is_retryable(),
            EngineError::Classifier(e) => e.is_retryable(),
            EngineError::Store(LedgerStoreError::Concurrency(_)) => true,
            _ => false,
        }
    }

    /// The wrapped domain error, if any.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }
}
