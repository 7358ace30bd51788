//! Error types for queue operations

use crate::message::MessageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during queue operations
///
/// Losing a race (an element locked or removed by another consumer) is not
/// an error: `lock` returns `false` and enumeration skips the element.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Element does not exist in the state the operation requires
    #[error("Element not found: {id:?}")]
    NotFound { id: String },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// On-disk entry violates the queue layout
    #[error("Corrupted queue entry {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// Queue cannot be built from the given configuration
    #[error("Invalid queue configuration: {message}")]
    InvalidConfig { message: String },

    /// Message envelope could not be encoded or decoded
    #[error(transparent)]
    Message(#[from] MessageError),
}

impl QueueError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        QueueError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(id: impl Into<String>) -> Self {
        QueueError::NotFound { id: id.into() }
    }

    /// Whether this error means the element is absent or not held.
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueueError::NotFound { .. })
    }
}
