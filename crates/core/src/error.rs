//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse classification of a [`DomainError`].
///
/// Callers decide on retries and HTTP mapping from the category, never from the message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad shape or references; rejected before any state change.
    Validation,
    /// Business-rule rejection on stock levels; safe to retry after balances change.
    InsufficientStock,
    /// Concurrent modification, duplicate or already-terminal resource; re-fetch and decide.
    Conflict,
    /// A human rejected the gated change. Terminal.
    PolicyRejection,
    /// A reservation, task or session outlived its TTL. Terminal.
    ExpiredResource,
    /// The referenced record does not exist.
    NotFound,
    /// A collaborator (classifier, store) could not be reached; retry with the same request.
    Unavailable,
    /// A broken invariant (bug, never caller error).
    Internal,
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A part number or location is unknown or deactivated.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Owned stock at the source is lower than the requested quantity.
    #[error("insufficient balance for {part_number}@{location}: requested {requested}, on hand {on_hand}")]
    InsufficientBalance {
        part_number: String,
        location: String,
        requested: i64,
        on_hand: i64,
    },

    /// Stock exists but part of it is held by reservations.
    #[error("insufficient available for {part_number}@{location}: requested {requested}, available {available}")]
    InsufficientAvailable {
        part_number: String,
        location: String,
        requested: i64,
        available: i64,
    },

    /// A reservation (or other lifecycle record) is already terminal.
    #[error("not active: {0}")]
    NotActive(String),

    /// A HIL task was already approved, rejected or expired.
    #[error("already resolved: {0}")]
    AlreadyResolved(String),

    /// Another round is running on the same import session.
    #[error("session busy: {0}")]
    SessionBusy(String),

    /// A conflict occurred (e.g. duplicate registration, stale round).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The gated change was rejected by a human.
    #[error("rejected by policy: {0}")]
    PolicyRejection(String),

    /// The resource passed its expiry.
    #[error("expired: {0}")]
    Expired(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }

    pub fn not_active(msg: impl Into<String>) -> Self {
        Self::NotActive(msg.into())
    }

    pub fn already_resolved(msg: impl Into<String>) -> Self {
        Self::AlreadyResolved(msg.into())
    }

    pub fn session_busy(msg: impl Into<String>) -> Self {
        Self::SessionBusy(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn policy_rejection(msg: impl Into<String>) -> Self {
        Self::PolicyRejection(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        Self::Expired(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DomainError::Validation(_)
            | DomainError::InvalidId(_)
            | DomainError::InvalidReference(_) => ErrorCategory::Validation,
            DomainError::InsufficientBalance { .. } | DomainError::InsufficientAvailable { .. } => {
                ErrorCategory::InsufficientStock
            }
            DomainError::NotActive(_)
            | DomainError::AlreadyResolved(_)
            | DomainError::SessionBusy(_)
            | DomainError::Conflict(_) => ErrorCategory::Conflict,
            DomainError::PolicyRejection(_) => ErrorCategory::PolicyRejection,
            DomainError::Expired(_) => ErrorCategory::ExpiredResource,
            DomainError::NotFound(_) => ErrorCategory::NotFound,
            DomainError::InvariantViolation(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the same request may succeed later without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::InsufficientStock | ErrorCategory::Conflict
        )
    }
}
