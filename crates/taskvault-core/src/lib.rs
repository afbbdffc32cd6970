//! Domain types for taskvault task records.

/// Validation errors and field bounds.
pub mod error;
/// Listing filters.
pub mod filter;
/// Identifier types.
pub mod id;
/// Priority levels.
pub mod priority;
/// Tag normalization.
pub mod tags;
/// The task record.
pub mod task;

pub use error::{MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS, ValidationError};
pub use filter::{DueFilter, TaskFilter, compare_for_listing};
pub use id::TaskId;
pub use priority::Priority;
pub use tags::normalize_tags;
pub use task::{DUE_SOON_WINDOW, Task, timestamp_after};
