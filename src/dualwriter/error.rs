//! # Dual Write Errors
//!
//! Every error names the store it came from. A [`DualWriteError::PartialWrite`] is
//! kept apart from plain store failures: it means the two stores now disagree and need
//! reconciliation.

use crate::context::Interrupt;
use crate::dualwriter::policy::{PolicyError, StoreKind};
use crate::storage::{StorageError, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DualWriteError {
    /// Caller validation or update resolution rejected the object. No store was written.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// One store failed and nothing was committed by this operation.
    #[error("{store} store failed: {source}")]
    Store {
        store: StoreKind,
        #[source]
        source: StorageError,
    },

    /// Version mismatch with nothing committed. Retry with a freshly read object.
    #[error("conflict in {store} store: {source}")]
    Conflict {
        store: StoreKind,
        #[source]
        source: StorageError,
    },

    /// `succeeded` committed, `failed` did not. The stores have diverged.
    #[error("partial write: {succeeded} store committed but {failed} store failed: {source}")]
    PartialWrite {
        succeeded: StoreKind,
        failed: StoreKind,
        #[source]
        source: StorageError,
    },

    /// The request context was cancelled or timed out.
    ///
    /// `committed` is the store whose write is known to have completed. `interrupted` is
    /// the store whose call was cut short: its outcome is unknown, and a write may have
    /// been applied there even though no result came back. Read it before retrying.
    #[error("{reason} (committed: {committed:?}, interrupted: {interrupted:?})")]
    Interrupted {
        reason: Interrupt,
        committed: Option<StoreKind>,
        interrupted: Option<StoreKind>,
    },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl DualWriteError {
    /// Wraps a failure of `store` when nothing else has been committed.
    pub fn from_store(store: StoreKind, source: StorageError) -> Self {
        if source.is_conflict() {
            DualWriteError::Conflict { store, source }
        } else {
            DualWriteError::Store { store, source }
        }
    }

    /// Retryable version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DualWriteError::Conflict { .. })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, DualWriteError::PartialWrite { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DualWriteError::Store { source, .. } if source.is_not_found())
    }

    /// The store whose call failed.
    pub fn failed_store(&self) -> Option<StoreKind> {
        match self {
            DualWriteError::Store { store, .. } | DualWriteError::Conflict { store, .. } => Some(*store),
            DualWriteError::PartialWrite { failed, .. } => Some(*failed),
            DualWriteError::Interrupted { interrupted, .. } => *interrupted,
            DualWriteError::Validation(_) | DualWriteError::Policy(_) => None,
        }
    }

    /// The store that holds a write this operation made despite failing.
    pub fn committed_store(&self) -> Option<StoreKind> {
        match self {
            DualWriteError::PartialWrite { succeeded, .. } => Some(*succeeded),
            DualWriteError::Interrupted { committed, .. } => *committed,
            _ => None,
        }
    }

    /// The store whose write was cut short and may or may not have been applied.
    pub fn unsettled_store(&self) -> Option<StoreKind> {
        match self {
            DualWriteError::Interrupted { interrupted, .. } => *interrupted,
            _ => None,
        }
    }
}
