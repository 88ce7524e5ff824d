//! Error taxonomy shared by the store contract and the controllers.

use thiserror::Error;

use crate::gate::DenyReason;

/// Errors raised by an [`AttributeStore`](crate::infrastructure::AttributeStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The stored version no longer matches the caller's precondition
    #[error("precondition failed on {resource}: expected {field} {expected}, found {actual}")]
    PreconditionFailed {
        resource: String,
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The backend refused a transition it enforces on its own
    #[error("rejected by backend: {0}")]
    Rejected(String),

    /// The call's deadline passed. Whether it applied is unknown.
    #[error("deadline exceeded while calling the store for {0}")]
    DeadlineExceeded(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the retention and hold controllers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HoldfastError {
    /// Forbidden transition on a locked retention policy
    #[error(
        "retention policy on bucket {bucket} is locked at {locked_period_secs}s: {attempted}"
    )]
    PolicyLocked {
        bucket: String,
        locked_period_secs: u64,
        attempted: String,
    },

    #[error("bucket {bucket} has no retention policy to lock")]
    NoPolicySet { bucket: String },

    /// Local validation failure; raised before any store call
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A guarded delete or overwrite was refused by the retention gate
    #[error("{key} is protected: {reason}")]
    DeletionDenied { key: String, reason: DenyReason },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HoldfastError {
    /// True when re-reading and resubmitting may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HoldfastError::Store(StoreError::PreconditionFailed { .. })
                | HoldfastError::Store(StoreError::DeadlineExceeded(_))
        )
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, HoldfastError::Store(StoreError::PreconditionFailed { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HoldfastError::Store(StoreError::NotFound(_)))
    }

    /// The mutation may or may not have applied; callers must re-read
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, HoldfastError::Store(StoreError::DeadlineExceeded(_)))
    }
}

pub type HoldfastResult<T> = Result<T, HoldfastError>;
