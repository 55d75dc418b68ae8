//! Unified error taxonomy.

use thiserror::Error;

/// Result type used across the service and store layers.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error taxonomy shared by every operation in the engine.
///
/// The split matters to callers: `Validation`, `NotFound`, `Conflict` and
/// `Forbidden` are permanent and must not be retried as-is; `Transient` is
/// safe to retry with backoff.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The requested entity does not exist within the caller's site scope.
    #[error("not found")]
    NotFound,

    /// A conditional write lost the race: the stored version no longer
    /// matches the caller's expected version. The caller must reload and
    /// decide whether to retry with fresh state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Malformed input: bad filter value, cursor/sort mismatch, missing
    /// required reason code, etc.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store was unavailable or the operation timed out. Safe to retry.
    #[error("transient: {0}")]
    Transient(String),

    /// The principal lacks a required permission or site membership.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl CoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Whether the immediate caller may retry the operation unchanged.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
