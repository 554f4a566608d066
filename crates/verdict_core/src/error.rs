use thiserror::Error;

use crate::{ItemStatus, Phase};

/// Failure reported by a [`crate::StateStorage`] implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Operation forbidden in the current phase.
    #[error("{operation} is not allowed while the run is {phase:?}")]
    InvalidState {
        operation: &'static str,
        phase: Phase,
    },
    /// An item was asked to make a transition its status forbids. Only a
    /// logic defect in the caller can produce this.
    #[error("item {index} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        index: usize,
        from: ItemStatus,
        to: ItemStatus,
    },
    #[error("item index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("failed to persist run state: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to encode run state: {0}")]
    Encode(#[from] serde_json::Error),
}
