//! Error types for stagefs.
//!
//! All operations return `Result<T>` which aliases `Result<T, TransactionError>`.

use crate::fs::Operation;
use thiserror::Error;

/// Errors from staged and immediate file system operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Backing store reported a missing entry of unknown kind.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// Expected file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Expected directory does not exist.
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    /// Invariant violation or unsafe immediate operation.
    ///
    /// `conflicts` lists the queued operations that blocked the action, and is
    /// empty for violations that don't involve the queue.
    #[error("{message}")]
    InvalidOperation {
        message: String,
        conflicts: Vec<Operation>,
    },

    /// Malformed line in a plan file.
    #[error("Invalid plan (line {line}): {message}")]
    InvalidPlan { line: usize, message: String },

    /// File system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransactionError {
    /// Shorthand for an `InvalidOperation` without queued conflicts.
    pub fn invalid(message: impl Into<String>) -> Self {
        TransactionError::InvalidOperation {
            message: message.into(),
            conflicts: Vec::new(),
        }
    }

    /// Returns true for any of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TransactionError::PathNotFound(_)
                | TransactionError::FileNotFound(_)
                | TransactionError::DirectoryNotFound(_)
        )
    }

    /// Queued operations that caused this error, if any.
    pub fn conflicts(&self) -> &[Operation] {
        match self {
            TransactionError::InvalidOperation { conflicts, .. } => conflicts,
            _ => &[],
        }
    }
}

/// Result type alias for stagefs operations.
pub type Result<T> = std::result::Result<T, TransactionError>;
