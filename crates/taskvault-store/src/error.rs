//! Error types for task store operations.

use std::io;
use std::path::{Path, PathBuf};

use taskvault_core::{TaskId, ValidationError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A record failed field validation.
    #[error("invalid task: {0}")]
    Validation(#[from] ValidationError),

    /// No record with the given id.
    #[error("task with ID {0} not found")]
    NotFound(TaskId),

    /// A record with the given id already exists.
    #[error("task with ID {0} already exists")]
    DuplicateId(TaskId),

    /// Reading or writing the backing file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The backing file is not a valid task collection.
    #[error("failed to decode {}: {source}", .path.display())]
    Decode {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// The collection could not be serialized.
    #[error("failed to encode tasks: {0}")]
    Encode(#[source] serde_json::Error),

    /// The operation's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invalid store configuration.
    #[error("invalid store configuration: {0}")]
    Config(String),

    /// Async runtime unavailable or a background task failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl StoreError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error reports a missing record.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error comes from cancellation or an expired deadline.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
