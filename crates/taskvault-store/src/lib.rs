//! Storage backends for taskvault.
//!
//! Every backend implements [`RecordStore`]: a whole-collection CRUD contract
//! over [`Task`] records. [`FileStore`] persists to one JSON file,
//! [`MemoryStore`] keeps the collection in memory, and [`CoalescingStore`]
//! decorates either of them with buffered background saves.

mod coalescing;
mod collection;
mod context;
mod error;
mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use taskvault_core::{Task, TaskId};

pub use coalescing::{CoalescingConfig, CoalescingStore};
pub use context::Context;
pub use error::{Result, StoreError};
pub use file::FileStore;
pub use memory::MemoryStore;

/// Persistence contract shared by every backend.
///
/// Callers always receive owned copies; no method hands out references into
/// the store's internal state.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every persisted record. A store with nothing persisted yet returns an
    /// empty collection.
    ///
    /// # Errors
    /// I/O, decode or context errors.
    async fn load(&self, ctx: &Context) -> Result<Vec<Task>>;

    /// Replace the entire collection with `tasks`.
    ///
    /// # Errors
    /// I/O, encode or context errors. The previous collection stays intact on
    /// failure.
    async fn save(&self, ctx: &Context, tasks: &[Task]) -> Result<()>;

    /// Insert a new record.
    ///
    /// # Errors
    /// [`StoreError::Validation`], [`StoreError::DuplicateId`], or a
    /// persistence error.
    async fn add(&self, ctx: &Context, task: Task) -> Result<()>;

    /// Replace the record stored under `id` and return the stored value.
    ///
    /// The stored creation time is kept, the record's id is forced to `id`,
    /// and `updated_at` moves strictly past the stored value.
    ///
    /// # Errors
    /// [`StoreError::Validation`], [`StoreError::NotFound`], or a persistence
    /// error.
    async fn update(&self, ctx: &Context, id: &TaskId, task: Task) -> Result<Task>;

    /// Remove the record stored under `id`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] or a persistence error.
    async fn delete(&self, ctx: &Context, id: &TaskId) -> Result<()>;

    /// Owned copy of the record stored under `id`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] or a load error.
    async fn get_by_id(&self, ctx: &Context, id: &TaskId) -> Result<Task>;
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn load(&self, ctx: &Context) -> Result<Vec<Task>> {
        (**self).load(ctx).await
    }

    async fn save(&self, ctx: &Context, tasks: &[Task]) -> Result<()> {
        (**self).save(ctx, tasks).await
    }

    async fn add(&self, ctx: &Context, task: Task) -> Result<()> {
        (**self).add(ctx, task).await
    }

    async fn update(&self, ctx: &Context, id: &TaskId, task: Task) -> Result<Task> {
        (**self).update(ctx, id, task).await
    }

    async fn delete(&self, ctx: &Context, id: &TaskId) -> Result<()> {
        (**self).delete(ctx, id).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &TaskId) -> Result<Task> {
        (**self).get_by_id(ctx, id).await
    }
}
