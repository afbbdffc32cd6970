//! Write-coalescing decorator with a background flusher.
//!
//! While auto-save is enabled, `add` and `update` land in an in-memory buffer
//! and a Tokio task periodically merges the buffer into the wrapped store.
//! Reads overlay the buffer on top of the persisted collection, so callers
//! always see their own writes. `delete` always writes through.
//!
//! Two locks are involved. The outer `gate` serializes access to the wrapped
//! store (reads shared, writes and flushes exclusive). The inner `pending`
//! mutex guards the buffer alone and is never held across an await. The
//! order is always gate first, then buffer. `Shared::flush` takes the gate
//! itself and must not be called while the gate is held.
//!
//! Records can stay buffered after auto-save is disabled, when the final
//! flush failed. Write-through `add` and `update` drain them first, so a
//! newer write is never overwritten by an older buffered one.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use taskvault_core::{Task, TaskId};
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collection;
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::RecordStore;

/// Tuning for [`CoalescingStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescingConfig {
    /// When loading the wrapped store fails during a flush, persist only the
    /// buffered records and drop the buffer instead of keeping it for a retry.
    ///
    /// This overwrites whatever the wrapped store held. Off by default.
    pub lossy_fallback: bool,
}

struct Shared<S> {
    store: S,
    gate: RwLock<()>,
    pending: Mutex<BTreeMap<TaskId, Task>>,
    enabled: AtomicBool,
    config: CoalescingConfig,
}

enum AutoSave {
    Disabled,
    Enabled {
        stop: CancellationToken,
        worker: JoinHandle<()>,
    },
}

/// Decorator that buffers `add`/`update` and flushes them in the background.
///
/// Without [`enable_auto_save`](Self::enable_auto_save) every call is passed
/// straight to the wrapped store, after any records left in the buffer.
pub struct CoalescingStore<S> {
    shared: Arc<Shared<S>>,
    autosave: Mutex<AutoSave>,
}

impl<S> CoalescingStore<S> {
    /// Wrap `store` with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, CoalescingConfig::default())
    }

    /// Wrap `store` with an explicit configuration.
    pub fn with_config(store: S, config: CoalescingConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                gate: RwLock::new(()),
                pending: Mutex::new(BTreeMap::new()),
                enabled: AtomicBool::new(false),
                config,
            }),
            autosave: Mutex::new(AutoSave::Disabled),
        }
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.shared.store
    }

    /// Number of buffered records not yet persisted.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Whether the background flusher is running.
    #[must_use]
    pub fn is_auto_save_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    fn buffering(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }
}

impl<S> CoalescingStore<S>
where
    S: RecordStore + 'static,
{
    /// Start buffering writes and flushing them every `interval`.
    ///
    /// The first flush happens one full interval after this call. Calling it
    /// again while enabled does nothing.
    ///
    /// # Errors
    /// [`StoreError::Config`] for a zero interval, [`StoreError::Runtime`] when
    /// called outside a Tokio runtime.
    pub fn enable_auto_save(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(StoreError::Config(
                "auto-save interval must be greater than zero".into(),
            ));
        }
        let mut state = self.autosave.lock();
        if matches!(*state, AutoSave::Enabled { .. }) {
            debug!("auto-save already enabled");
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(|err| StoreError::Runtime(err.to_string()))?;

        let stop = CancellationToken::new();
        self.shared.enabled.store(true, Ordering::Release);
        let worker = runtime.spawn(run_flusher(
            Arc::clone(&self.shared),
            interval,
            stop.clone(),
        ));
        *state = AutoSave::Enabled { stop, worker };
        info!(interval_ms = interval.as_millis(), "auto-save enabled");
        Ok(())
    }

    /// Stop the flusher, then flush whatever is still buffered.
    ///
    /// Does nothing when auto-save is not enabled.
    ///
    /// # Errors
    /// The final flush's error. The buffer is kept in that case and can be
    /// retried with [`flush`](Self::flush).
    pub async fn disable_auto_save(&self) -> Result<()> {
        let previous = mem::replace(&mut *self.autosave.lock(), AutoSave::Disabled);
        let AutoSave::Enabled { stop, worker } = previous else {
            return Ok(());
        };
        self.shared.enabled.store(false, Ordering::Release);
        stop.cancel();
        if let Err(err) = worker.await {
            warn!(error = %err, "auto-save worker ended abnormally");
        }
        let flushed = self.shared.flush(&Context::background()).await?;
        info!(flushed, "auto-save disabled");
        Ok(())
    }

    /// Merge the buffer into the wrapped store now.
    ///
    /// Returns the number of records written from the buffer.
    ///
    /// # Errors
    /// Load or save errors from the wrapped store. See [`CoalescingConfig`]
    /// for what happens to the buffer when the load fails.
    pub async fn flush(&self, ctx: &Context) -> Result<usize> {
        self.shared.flush(ctx).await
    }
}

impl<S> Shared<S>
where
    S: RecordStore,
{
    async fn flush(&self, ctx: &Context) -> Result<usize> {
        let _gate = self.gate.write().await;
        self.flush_locked(ctx).await
    }

    /// Flush with the gate already held for writing.
    async fn flush_locked(&self, ctx: &Context) -> Result<usize> {
        let drained = mem::take(&mut *self.pending.lock());
        if drained.is_empty() {
            return Ok(0);
        }
        let count = drained.len();

        let current = match self.store.load(ctx).await {
            Ok(tasks) => tasks,
            Err(err) if self.config.lossy_fallback => {
                warn!(
                    error = %err,
                    pending = count,
                    "load failed before flush; persisting buffered records only"
                );
                let tasks: Vec<Task> = drained.into_values().collect();
                self.store.save(ctx, &tasks).await?;
                return Ok(count);
            }
            Err(err) => {
                self.restore(drained);
                return Err(err);
            }
        };

        let merged = collection::merge(current, &drained);
        if let Err(err) = self.store.save(ctx, &merged).await {
            self.restore(drained);
            return Err(err);
        }
        info!(flushed = count, total = merged.len(), "flushed buffered writes");
        Ok(count)
    }

    /// Put drained records back. Entries buffered meanwhile are newer and win.
    fn restore(&self, drained: BTreeMap<TaskId, Task>) {
        let mut pending = self.pending.lock();
        for (id, task) in drained {
            pending.entry(id).or_insert(task);
        }
    }
}

async fn run_flusher<S>(shared: Arc<Shared<S>>, period: Duration, stop: CancellationToken)
where
    S: RecordStore,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(err) = shared.flush(&Context::background()).await {
                    warn!(error = %err, "background flush failed; retrying on next tick");
                }
            }
        }
    }
    debug!("auto-save flusher stopped");
}

#[async_trait]
impl<S> RecordStore for CoalescingStore<S>
where
    S: RecordStore,
{
    async fn load(&self, ctx: &Context) -> Result<Vec<Task>> {
        let _gate = self.shared.gate.read().await;
        let current = self.shared.store.load(ctx).await?;
        let pending = self.shared.pending.lock().clone();
        Ok(collection::merge(current, &pending))
    }

    async fn save(&self, ctx: &Context, tasks: &[Task]) -> Result<()> {
        let _gate = self.shared.gate.write().await;
        let discarded = mem::take(&mut *self.shared.pending.lock());
        if let Err(err) = self.shared.store.save(ctx, tasks).await {
            self.shared.restore(discarded);
            return Err(err);
        }
        if !discarded.is_empty() {
            debug!(discarded = discarded.len(), "save replaced buffered writes");
        }
        Ok(())
    }

    async fn add(&self, ctx: &Context, task: Task) -> Result<()> {
        task.validate()?;
        let gate = self.shared.gate.read().await;
        if self.buffering() {
            let queued = self.shared.pending.lock().contains_key(&task.id);
            if queued {
                return Err(StoreError::DuplicateId(task.id));
            }
            match self.shared.store.get_by_id(ctx, &task.id).await {
                Ok(_) => return Err(StoreError::DuplicateId(task.id)),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
            let mut pending = self.shared.pending.lock();
            if pending.contains_key(&task.id) {
                return Err(StoreError::DuplicateId(task.id));
            }
            pending.insert(task.id.clone(), task);
            return Ok(());
        }
        drop(gate);

        let _gate = self.shared.gate.write().await;
        self.shared.flush_locked(ctx).await?;
        self.shared.store.add(ctx, task).await
    }

    async fn update(&self, ctx: &Context, id: &TaskId, task: Task) -> Result<Task> {
        task.validate_fields()?;
        let gate = self.shared.gate.read().await;
        if self.buffering() {
            let queued = self.shared.pending.lock().get(id).cloned();
            let base = match queued {
                Some(existing) => existing,
                None => self.shared.store.get_by_id(ctx, id).await?,
            };
            let mut pending = self.shared.pending.lock();
            let base = pending.get(id).unwrap_or(&base);
            let stored = collection::rebase_update(base, id, task);
            pending.insert(id.clone(), stored.clone());
            return Ok(stored);
        }
        drop(gate);

        let _gate = self.shared.gate.write().await;
        self.shared.flush_locked(ctx).await?;
        self.shared.store.update(ctx, id, task).await
    }

    async fn delete(&self, ctx: &Context, id: &TaskId) -> Result<()> {
        let _gate = self.shared.gate.write().await;
        let queued = self.shared.pending.lock().remove(id);
        match self.shared.store.delete(ctx, id).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() && queued.is_some() => Ok(()),
            Err(err) => {
                if let Some(task) = queued {
                    self.shared.pending.lock().entry(id.clone()).or_insert(task);
                }
                Err(err)
            }
        }
    }

    async fn get_by_id(&self, ctx: &Context, id: &TaskId) -> Result<Task> {
        let _gate = self.shared.gate.read().await;
        let queued = self.shared.pending.lock().get(id).cloned();
        match queued {
            Some(task) => Ok(task),
            None => self.shared.store.get_by_id(ctx, id).await,
        }
    }
}

impl<S> Drop for CoalescingStore<S> {
    fn drop(&mut self) {
        if let AutoSave::Enabled { stop, .. } = self.autosave.get_mut() {
            stop.cancel();
            let pending = self.shared.pending.lock().len();
            if pending > 0 {
                warn!(
                    pending,
                    "coalescing store dropped with unflushed writes; call disable_auto_save first"
                );
            }
        }
    }
}
