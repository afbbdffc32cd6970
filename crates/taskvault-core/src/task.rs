//! The task record and its field rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::error::{MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS, ValidationError};
use crate::id::TaskId;
use crate::priority::Priority;
use crate::tags::normalize_tags;

/// Window used by [`Task::is_due_soon`].
pub const DUE_SOON_WINDOW: Duration = Duration::days(7);

/// One persisted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, assigned at creation.
    pub id: TaskId,
    /// Short title (1–100 characters).
    pub title: String,
    /// Free text (0–500 characters).
    #[serde(default)]
    pub description: String,
    /// Urgency.
    #[serde(default)]
    pub priority: Priority,
    /// Optional due timestamp. `None` means "no due date".
    #[serde(default, with = "due_date", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<OffsetDateTime>,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Creation timestamp; never changes after creation.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Timestamp of the latest mutation.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Normalized lowercase tags.
    #[serde(
        default,
        skip_serializing_if = "BTreeSet::is_empty",
        deserialize_with = "crate::tags::deserialize"
    )]
    pub tags: BTreeSet<String>,
}

impl Task {
    /// Create a new, not yet persisted task with a fresh id.
    #[must_use]
    pub fn new<I, T>(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        due_date: Option<OffsetDateTime>,
        tags: I,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let now = OffsetDateTime::now_utc();
        Self {
            id: TaskId::generate(),
            title: title.into(),
            description: description.into(),
            priority,
            due_date,
            completed: false,
            created_at: now,
            updated_at: now,
            tags: normalize_tags(tags),
        }
    }

    /// Check field bounds and timestamp ordering.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_fields()?;
        if self.updated_at < self.created_at {
            return Err(ValidationError::TimestampOrder);
        }
        Ok(())
    }

    /// Check id, title and description bounds only.
    ///
    /// Used for updates, where the timestamps are rebased on the stored record.
    ///
    /// # Errors
    /// Returns the first [`ValidationError`] found.
    pub fn validate_fields(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        let title_len = self.title.chars().count();
        if title_len == 0 {
            return Err(ValidationError::EmptyTitle);
        }
        if title_len > MAX_TITLE_CHARS {
            return Err(ValidationError::TitleTooLong(title_len));
        }
        let description_len = self.description.chars().count();
        if description_len > MAX_DESCRIPTION_CHARS {
            return Err(ValidationError::DescriptionTooLong(description_len));
        }
        Ok(())
    }

    /// Mark as completed.
    pub fn complete(&mut self) {
        self.completed = true;
        self.touch();
    }

    /// Mark as not completed.
    pub fn uncomplete(&mut self) {
        self.completed = false;
        self.touch();
    }

    /// Replace the editable fields and re-validate.
    ///
    /// # Errors
    /// Returns a [`ValidationError`] when the new values are out of bounds.
    /// The fields are updated either way.
    pub fn edit(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
        due_date: Option<OffsetDateTime>,
    ) -> Result<(), ValidationError> {
        self.title = title.into();
        self.description = description.into();
        self.priority = priority;
        self.due_date = due_date;
        self.touch();
        self.validate()
    }

    /// Replace the tag set with the normalized form of `tags`.
    pub fn set_tags<I, T>(&mut self, tags: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self.touch();
    }

    /// Bump `updated_at` so it strictly increases.
    pub fn touch(&mut self) {
        self.updated_at = timestamp_after(self.updated_at);
    }

    /// Not completed and due before `now`.
    #[must_use]
    pub fn is_overdue(&self, now: OffsetDateTime) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < now)
    }

    /// Due on the same UTC calendar day as `now`.
    #[must_use]
    pub fn is_due_today(&self, now: OffsetDateTime) -> bool {
        let today = now.to_offset(UtcOffset::UTC).date();
        self.due_date
            .is_some_and(|due| due.to_offset(UtcOffset::UTC).date() == today)
    }

    /// Not completed and due within the next [`DUE_SOON_WINDOW`].
    #[must_use]
    pub fn is_due_soon(&self, now: OffsetDateTime) -> bool {
        let horizon = now.checked_add(DUE_SOON_WINDOW);
        !self.completed
            && self
                .due_date
                .is_some_and(|due| due > now && horizon.is_none_or(|end| due < end))
    }
}

/// Current time, or one nanosecond past `previous` when the clock has not advanced.
#[must_use]
pub fn timestamp_after(previous: OffsetDateTime) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    if now > previous {
        now
    } else {
        previous + Duration::nanoseconds(1)
    }
}

/// Serde adapter for the optional due date.
///
/// Unset dates are omitted on write. On read, `null`, an empty string and the
/// zero timestamp (`0001-01-01T00:00:00Z`) all decode as unset.
mod due_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;
    use time::macros::datetime;

    /// The zero instant older files use for "no due date".
    const ZERO_TIME: OffsetDateTime = datetime!(0001-01-01 00:00 UTC);

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<OffsetDateTime>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => {
                let text = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                s.serialize_str(&text)
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(text) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        let ts = OffsetDateTime::parse(&text, &Rfc3339).map_err(serde::de::Error::custom)?;
        Ok((ts != ZERO_TIME).then_some(ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample() -> Task {
        Task::new("Write docs", "README and guides", Priority::High, None, ["Docs"])
    }

    #[test]
    fn new_task_is_valid_and_consistent() {
        let task = sample();
        assert!(task.validate().is_ok());
        assert_eq!(task.created_at, task.updated_at);
        assert!(!task.completed);
        assert!(task.tags.contains("docs"));
    }

    #[test]
    fn validation_bounds() {
        let mut task = sample();
        task.title = String::new();
        assert_eq!(task.validate(), Err(ValidationError::EmptyTitle));

        task.title = "x".repeat(MAX_TITLE_CHARS);
        assert!(task.validate().is_ok());
        task.title.push('x');
        assert_eq!(task.validate(), Err(ValidationError::TitleTooLong(101)));

        task.title = "ok".into();
        task.description = "d".repeat(MAX_DESCRIPTION_CHARS + 1);
        assert_eq!(task.validate(), Err(ValidationError::DescriptionTooLong(501)));
    }

    #[test]
    fn title_length_counts_characters() {
        let mut task = sample();
        task.title = "é".repeat(MAX_TITLE_CHARS);
        assert!(task.validate().is_ok());
    }

    #[test]
    fn timestamps_must_be_ordered() {
        let mut task = sample();
        task.updated_at = task.created_at - Duration::seconds(1);
        assert_eq!(task.validate(), Err(ValidationError::TimestampOrder));
    }

    #[test]
    fn mutations_strictly_bump_updated_at() {
        let mut task = sample();
        let before = task.updated_at;
        task.complete();
        assert!(task.completed);
        assert!(task.updated_at > before);

        let before = task.updated_at;
        task.uncomplete();
        assert!(!task.completed);
        assert!(task.updated_at > before);

        let before = task.updated_at;
        let result = task.edit("Renamed", "", Priority::Low, None);
        assert!(result.is_ok());
        assert!(task.updated_at > before);
        assert_eq!(task.title, "Renamed");
    }

    #[test]
    fn edit_reports_invalid_values() {
        let mut task = sample();
        let result = task.edit("", "", Priority::Low, None);
        assert_eq!(result, Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn unset_due_date_is_never_due() {
        let task = sample();
        let now = OffsetDateTime::now_utc();
        assert!(!task.is_overdue(now));
        assert!(!task.is_due_today(now));
        assert!(!task.is_due_soon(now));
    }

    #[test]
    fn due_predicates() {
        let now = datetime!(2025-03-10 12:00 UTC);
        let mut task = sample();

        task.due_date = Some(datetime!(2025-03-09 12:00 UTC));
        assert!(task.is_overdue(now));
        assert!(!task.is_due_soon(now));

        task.due_date = Some(datetime!(2025-03-10 18:00 UTC));
        assert!(task.is_due_today(now));
        assert!(task.is_due_soon(now));
        assert!(!task.is_overdue(now));

        task.due_date = Some(datetime!(2025-03-20 12:00 UTC));
        assert!(!task.is_due_soon(now));

        task.due_date = Some(datetime!(2025-03-09 12:00 UTC));
        task.completed = true;
        assert!(!task.is_overdue(now));
    }

    #[test]
    fn json_layout_uses_snake_case_and_omits_unset_fields() {
        let mut task = sample();
        task.tags.clear();
        let value = serde_json::to_value(&task).unwrap_or_else(|err| panic!("{err}"));
        let obj = value.as_object().unwrap_or_else(|| panic!("object expected"));
        assert!(obj.contains_key("created_at"));
        assert!(obj.contains_key("updated_at"));
        assert_eq!(obj.get("priority"), Some(&serde_json::json!(2)));
        assert!(!obj.contains_key("due_date"));
        assert!(!obj.contains_key("tags"));
    }

    #[test]
    fn zero_due_date_decodes_as_unset() {
        let raw = r#"{
            "id": "task_1",
            "title": "Legacy",
            "description": "",
            "priority": 0,
            "due_date": "0001-01-01T00:00:00Z",
            "completed": false,
            "created_at": "2024-01-01T10:00:00Z",
            "updated_at": "2024-01-01T10:00:00Z",
            "tags": ["Home", " home ", "Errands"]
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(task.due_date, None);
        assert_eq!(task.id.as_str(), "task_1");
        assert_eq!(
            task.tags.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["errands", "home"]
        );
    }

    #[test]
    fn only_the_exact_zero_instant_is_unset() {
        let decode = |due: &str| {
            let raw = format!(
                r#"{{"id":"t","title":"x","due_date":"{due}",
                "created_at":"2024-01-01T10:00:00Z","updated_at":"2024-01-01T10:00:00Z"}}"#
            );
            serde_json::from_str::<Task>(&raw)
                .unwrap_or_else(|err| panic!("{err}"))
                .due_date
        };
        assert_eq!(decode("0001-01-01T00:00:00Z"), None);
        assert_eq!(
            decode("0001-06-01T00:00:00Z"),
            Some(datetime!(0001-06-01 00:00 UTC))
        );
        assert_eq!(
            decode("0001-01-01T00:00:01Z"),
            Some(datetime!(0001-01-01 00:00:01 UTC))
        );
    }

    #[test]
    fn due_date_roundtrips() {
        let mut task = sample();
        task.due_date = Some(datetime!(2025-06-01 09:30 UTC));
        let json = serde_json::to_string(&task).unwrap_or_else(|err| panic!("{err}"));
        let back: Task = serde_json::from_str(&json).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(back, task);
    }
}
