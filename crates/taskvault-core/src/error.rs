//! Validation errors for task records.

use thiserror::Error;

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 100;
/// Maximum description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Field-level problems detected before a record is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Title is empty.
    #[error("task title cannot be empty")]
    EmptyTitle,

    /// Title exceeds [`MAX_TITLE_CHARS`].
    #[error("task title cannot exceed {MAX_TITLE_CHARS} characters (got {0})")]
    TitleTooLong(usize),

    /// Description exceeds [`MAX_DESCRIPTION_CHARS`].
    #[error("task description cannot exceed {MAX_DESCRIPTION_CHARS} characters (got {0})")]
    DescriptionTooLong(usize),

    /// Identifier is empty or whitespace.
    #[error("task id cannot be empty")]
    EmptyId,

    /// `updated_at` precedes `created_at`.
    #[error("task updated_at precedes created_at")]
    TimestampOrder,

    /// Priority token could not be parsed.
    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    /// Due filter token could not be parsed.
    #[error("invalid due filter: {0}")]
    InvalidDueFilter(String),
}
