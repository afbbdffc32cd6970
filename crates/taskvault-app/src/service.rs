//! Task operations used by the command-line front end.

use std::collections::BTreeMap;

use taskvault_core::{Priority, Task, TaskFilter, TaskId, compare_for_listing};
use taskvault_store::{Context, RecordStore, Result};
use time::OffsetDateTime;
use tracing::debug;

/// Input for [`TaskService::add`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Title, 1 to 100 characters.
    pub title: String,
    /// Optional free text.
    pub description: String,
    /// Urgency.
    pub priority: Priority,
    /// Optional due timestamp.
    pub due_date: Option<OffsetDateTime>,
    /// Raw tags; normalized on creation.
    pub tags: Vec<String>,
}

/// Partial edit for [`TaskService::edit`]. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New priority.
    pub priority: Option<Priority>,
    /// `Some(None)` clears the due date.
    pub due_date: Option<Option<OffsetDateTime>>,
    /// Replacement tag set.
    pub tags: Option<Vec<String>>,
}

impl TaskPatch {
    /// Whether the patch changes nothing.
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.tags.is_none()
    }
}

/// Aggregate counts over the whole collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Every task.
    pub total: usize,
    /// Completed tasks.
    pub completed: usize,
    /// Tasks not yet completed.
    pub pending: usize,
    /// Pending and past due.
    pub overdue: usize,
    /// Pending and due on the current day.
    pub due_today: usize,
    /// Pending and due within the next week.
    pub due_soon: usize,
    /// Counts per priority, completed tasks included.
    pub by_priority: BTreeMap<Priority, usize>,
}

/// Service façade over a [`RecordStore`] for the command-line front end.
pub struct TaskService<S> {
    store: S,
}

impl<S> TaskService<S> {
    /// Service over `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }
}

impl<S: RecordStore> TaskService<S> {
    /// Create and persist a new task.
    ///
    /// # Errors
    /// Validation or persistence errors from the store.
    pub async fn add(&self, ctx: &Context, input: NewTask) -> Result<Task> {
        let NewTask {
            title,
            description,
            priority,
            due_date,
            tags,
        } = input;
        let task = Task::new(title, description, priority, due_date, tags);
        self.store.add(ctx, task.clone()).await?;
        debug!(id = %task.id, "added task");
        Ok(task)
    }

    /// Mark a task as completed.
    ///
    /// # Errors
    /// [`taskvault_store::StoreError::NotFound`] or a persistence error.
    pub async fn complete(&self, ctx: &Context, id: &TaskId) -> Result<Task> {
        self.modify(ctx, id, |task| {
            task.complete();
            Ok(())
        })
        .await
    }

    /// Mark a task as pending again.
    ///
    /// # Errors
    /// [`taskvault_store::StoreError::NotFound`] or a persistence error.
    pub async fn uncomplete(&self, ctx: &Context, id: &TaskId) -> Result<Task> {
        self.modify(ctx, id, |task| {
            task.uncomplete();
            Ok(())
        })
        .await
    }

    /// Apply `patch` to the stored task.
    ///
    /// # Errors
    /// Validation errors for out-of-bounds values, otherwise store errors.
    pub async fn edit(&self, ctx: &Context, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        self.modify(ctx, id, move |task| {
            let TaskPatch {
                title,
                description,
                priority,
                due_date,
                tags,
            } = patch;
            let title = title.unwrap_or_else(|| task.title.clone());
            let description = description.unwrap_or_else(|| task.description.clone());
            let priority = priority.unwrap_or(task.priority);
            let due_date = due_date.unwrap_or(task.due_date);
            task.edit(title, description, priority, due_date)?;
            if let Some(tags) = tags {
                task.set_tags(tags);
            }
            Ok(())
        })
        .await
    }

    /// Remove a task.
    ///
    /// # Errors
    /// [`taskvault_store::StoreError::NotFound`] or a persistence error.
    pub async fn delete(&self, ctx: &Context, id: &TaskId) -> Result<()> {
        self.store.delete(ctx, id).await
    }

    /// Fetch one task.
    ///
    /// # Errors
    /// [`taskvault_store::StoreError::NotFound`] or a load error.
    pub async fn show(&self, ctx: &Context, id: &TaskId) -> Result<Task> {
        self.store.get_by_id(ctx, id).await
    }

    /// Tasks matching `filter`, in listing order.
    ///
    /// # Errors
    /// Load errors from the store.
    pub async fn list(
        &self,
        ctx: &Context,
        filter: &TaskFilter,
        now: OffsetDateTime,
    ) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .store
            .load(ctx)
            .await?
            .into_iter()
            .filter(|task| filter.matches(task, now))
            .collect();
        tasks.sort_by(compare_for_listing);
        Ok(tasks)
    }

    /// Count tasks by status, due window and priority.
    ///
    /// # Errors
    /// Load errors from the store.
    pub async fn stats(&self, ctx: &Context, now: OffsetDateTime) -> Result<TaskStats> {
        let tasks = self.store.load(ctx).await?;
        Ok(compute_stats(&tasks, now))
    }

    async fn modify<F>(&self, ctx: &Context, id: &TaskId, apply: F) -> Result<Task>
    where
        F: FnOnce(&mut Task) -> std::result::Result<(), taskvault_core::ValidationError> + Send,
    {
        let mut task = self.store.get_by_id(ctx, id).await?;
        apply(&mut task)?;
        self.store.update(ctx, id, task).await
    }
}

fn compute_stats(tasks: &[Task], now: OffsetDateTime) -> TaskStats {
    let mut stats = TaskStats {
        total: tasks.len(),
        by_priority: [Priority::High, Priority::Medium, Priority::Low]
            .into_iter()
            .map(|p| (p, 0))
            .collect(),
        ..TaskStats::default()
    };
    for task in tasks {
        *stats.by_priority.entry(task.priority).or_default() += 1;
        if task.completed {
            stats.completed += 1;
            continue;
        }
        if task.is_overdue(now) {
            stats.overdue += 1;
        }
        if task.is_due_today(now) {
            stats.due_today += 1;
        }
        if task.is_due_soon(now) {
            stats.due_soon += 1;
        }
    }
    stats.pending = stats.total - stats.completed;
    stats
}
