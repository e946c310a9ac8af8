//! # Storage Errors
//!
//! Errors reported by a single backing store. The dual writer wraps these with the
//! identity of the store that produced them; see [`crate::dualwriter::DualWriteError`].

use thiserror::Error;

/// Errors that can occur inside one store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    /// The requested object does not exist.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// An object with the same key already exists.
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// Optimistic-concurrency check failed. Retry with a freshly read object.
    #[error("conflict on {kind} {key}: {reason}")]
    Conflict {
        kind: &'static str,
        key: String,
        reason: String,
    },

    /// The object was rejected by validation.
    #[error("invalid object: {0}")]
    Invalid(#[from] ValidationError),

    /// The store cannot be reached (closed channel, dropped response, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other store-side failure.
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// Rejection from a caller-supplied validation function or update resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<String> for ValidationError {
    fn from(msg: String) -> Self {
        ValidationError(msg)
    }
}
