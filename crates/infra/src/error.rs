//! Infrastructure error types.
//!
//! Domain crates report rule violations through `DomainError`; everything
//! here is about storage, locking and the services that compose them.

use thiserror::Error;

use eventcrm_core::DomainError;
use eventcrm_quota::QuotaExceeded;

use crate::dispatcher::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A lock guarding in-memory state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness or optimistic concurrency failure.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Failures of a quota backend (not rejections: see [`QuotaError`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaStoreError {
    #[error("quota ledger lock poisoned")]
    Poisoned,

    /// The Postgres tracker was called outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("quota database error in {operation}: {message}")]
    Database { operation: String, message: String },
}

impl<T> From<std::sync::PoisonError<T>> for QuotaStoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        QuotaStoreError::Poisoned
    }
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error(transparent)]
    Exceeded(#[from] QuotaExceeded),

    #[error(transparent)]
    Store(#[from] QuotaStoreError),
}

/// Error returned by the tag and customer services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Campaign creation and lookup failures.
///
/// Everything up to `QuotaExceeded` is raised before anything is persisted.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no recipients in segment")]
    NoRecipients,

    #[error("quota exhausted: requested {requested}, remaining {remaining} of {limit}")]
    QuotaExceeded {
        requested: u32,
        remaining: u32,
        limit: u32,
    },

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Quota(#[from] QuotaStoreError),

    #[error(transparent)]
    Dispatch(DispatchError),
}

impl From<DomainError> for OrchestratorError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                OrchestratorError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => OrchestratorError::InvariantViolation(msg),
            DomainError::Conflict(msg) => OrchestratorError::Conflict(msg),
            DomainError::NotFound => OrchestratorError::NotFound,
        }
    }
}

impl From<DispatchError> for OrchestratorError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(err) => err.into(),
            DispatchError::Store(err) => OrchestratorError::Store(err),
            other => OrchestratorError::Dispatch(other),
        }
    }
}

impl From<QuotaExceeded> for OrchestratorError {
    fn from(value: QuotaExceeded) -> Self {
        OrchestratorError::QuotaExceeded {
            requested: value.requested,
            remaining: value.remaining,
            limit: value.limit,
        }
    }
}

impl From<QuotaError> for OrchestratorError {
    fn from(value: QuotaError) -> Self {
        match value {
            QuotaError::Exceeded(exceeded) => exceeded.into(),
            QuotaError::Store(err) => OrchestratorError::Quota(err),
        }
    }
}
