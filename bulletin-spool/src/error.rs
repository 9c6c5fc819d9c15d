//! Error types for the bulletin-spool crate.

use thiserror::Error;

use crate::{RowStatus, SpoolRowId};

/// Spool error type
#[derive(Debug, Error)]
pub enum SpoolError {
    /// Row not found in the spool.
    #[error("Row not found: {0}")]
    NotFound(SpoolRowId),

    /// A status change that the row lifecycle does not allow.
    #[error("Invalid transition for row {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: SpoolRowId,
        from: RowStatus,
        to: RowStatus,
    },

    /// The backend refused new rows.
    #[error("Spool capacity exceeded: {held}+{requested}/{capacity} rows")]
    CapacityExceeded {
        held: usize,
        requested: usize,
        capacity: usize,
    },

    /// A spool path that cannot be used.
    #[error("Invalid spool path: {0}")]
    InvalidPath(String),

    /// Reading or writing the spool directory failed.
    #[error("Spool I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be encoded or decoded.
    #[error("Row encoding error: {0}")]
    Encoding(String),

    /// Internal error (lock poisoning, id exhaustion, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

impl<T> From<std::sync::PoisonError<T>> for SpoolError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl From<ulid::MonotonicError> for SpoolError {
    fn from(e: ulid::MonotonicError) -> Self {
        Self::Internal(format!("Row id generation failed: {e}"))
    }
}

impl From<bincode::error::EncodeError> for SpoolError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for SpoolError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Encoding(e.to_string())
    }
}
