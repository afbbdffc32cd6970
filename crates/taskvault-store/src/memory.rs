//! In-memory backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use taskvault_core::{Task, TaskId};

use crate::collection;
use crate::context::Context;
use crate::error::Result;
use crate::RecordStore;

/// In-memory backend, mainly for tests and as a decorator target.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `tasks`.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, ctx: &Context) -> Result<Vec<Task>> {
        ctx.check()?;
        Ok(self.tasks.read().clone())
    }

    async fn save(&self, ctx: &Context, tasks: &[Task]) -> Result<()> {
        ctx.check()?;
        *self.tasks.write() = tasks.to_vec();
        Ok(())
    }

    async fn add(&self, ctx: &Context, task: Task) -> Result<()> {
        ctx.check()?;
        collection::insert(&mut self.tasks.write(), task)
    }

    async fn update(&self, ctx: &Context, id: &TaskId, task: Task) -> Result<Task> {
        ctx.check()?;
        collection::replace(&mut self.tasks.write(), id, task)
    }

    async fn delete(&self, ctx: &Context, id: &TaskId) -> Result<()> {
        ctx.check()?;
        collection::remove(&mut self.tasks.write(), id).map(|_| ())
    }

    async fn get_by_id(&self, ctx: &Context, id: &TaskId) -> Result<Task> {
        ctx.check()?;
        collection::find(&self.tasks.read(), id)
    }
}
