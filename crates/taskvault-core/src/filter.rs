//! Listing filters and ordering.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use time::{Duration, OffsetDateTime, UtcOffset};

use crate::error::ValidationError;
use crate::priority::Priority;
use crate::task::Task;

/// Due-date window selected with `--due`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueFilter {
    /// Due on the current UTC day.
    Today,
    /// Due date already passed.
    Overdue,
    /// Due within the next `n` days.
    NextDays(u32),
}

impl DueFilter {
    /// Whether `task` falls into this window. Tasks without a due date never match.
    #[must_use]
    pub fn matches(self, task: &Task, now: OffsetDateTime) -> bool {
        let Some(due) = task.due_date else {
            return false;
        };
        match self {
            Self::Today => {
                due.to_offset(UtcOffset::UTC).date() == now.to_offset(UtcOffset::UTC).date()
            }
            Self::Overdue => due < now,
            // A window reaching past the representable range has no upper bound.
            Self::NextDays(days) => {
                due > now
                    && now
                        .checked_add(Duration::days(i64::from(days)))
                        .is_none_or(|end| due < end)
            }
        }
    }
}

impl FromStr for DueFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "overdue" => Ok(Self::Overdue),
            "week" => Ok(Self::NextDays(7)),
            other => other
                .parse::<u32>()
                .map(Self::NextDays)
                .map_err(|_| ValidationError::InvalidDueFilter(s.to_owned())),
        }
    }
}

/// Criteria applied when listing tasks. The default matches pending tasks only.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Include completed tasks.
    pub include_completed: bool,
    /// Exact priority.
    pub priority: Option<Priority>,
    /// Case-insensitive substring of title or description.
    pub text: Option<String>,
    /// Due window.
    pub due: Option<DueFilter>,
    /// Every listed tag must be present.
    pub tags: BTreeSet<String>,
}

impl TaskFilter {
    /// Evaluate the filter against `task`.
    #[must_use]
    pub fn matches(&self, task: &Task, now: OffsetDateTime) -> bool {
        if !self.include_completed && task.completed {
            return false;
        }
        if self.priority.is_some_and(|p| p != task.priority) {
            return false;
        }
        if let Some(text) = self.text.as_deref().map(str::to_lowercase)
            && !text.is_empty()
            && !task.title.to_lowercase().contains(&text)
            && !task.description.to_lowercase().contains(&text)
        {
            return false;
        }
        if self.due.is_some_and(|due| !due.matches(task, now)) {
            return false;
        }
        self.tags.is_subset(&task.tags)
    }
}

/// Listing order: higher priority first, then earlier due date, unset dates last.
#[must_use]
pub fn compare_for_listing(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(a_due), Some(b_due)) => a_due.cmp(&b_due),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.created_at.cmp(&b.created_at))
}
