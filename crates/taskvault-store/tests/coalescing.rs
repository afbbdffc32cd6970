#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use taskvault_core::{Priority, Task, TaskId, ValidationError};
use taskvault_store::{
    CoalescingConfig, CoalescingStore, Context, FileStore, MemoryStore, RecordStore, StoreError,
};

const LONG: Duration = Duration::from_secs(3600);

fn task(title: &str) -> Task {
    Task::new(title, "", Priority::Low, None, Vec::<String>::new())
}

/// Memory store whose `load`/`save` can be switched to fail, counting saves.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStore {
    fn outage() -> StoreError {
        StoreError::Runtime("simulated outage".into())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn load(&self, ctx: &Context) -> taskvault_store::Result<Vec<Task>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.inner.load(ctx).await
    }

    async fn save(&self, ctx: &Context, tasks: &[Task]) -> taskvault_store::Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(ctx, tasks).await
    }

    async fn add(&self, ctx: &Context, task: Task) -> taskvault_store::Result<()> {
        self.inner.add(ctx, task).await
    }

    async fn update(
        &self,
        ctx: &Context,
        id: &TaskId,
        task: Task,
    ) -> taskvault_store::Result<Task> {
        self.inner.update(ctx, id, task).await
    }

    async fn delete(&self, ctx: &Context, id: &TaskId) -> taskvault_store::Result<()> {
        self.inner.delete(ctx, id).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &TaskId) -> taskvault_store::Result<Task> {
        self.inner.get_by_id(ctx, id).await
    }
}

#[tokio::test]
async fn disabled_wrapper_writes_through() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(MemoryStore::new());
    let record = task("direct");

    store.add(&ctx, record.clone()).await?;
    assert_eq!(store.pending_len(), 0);
    assert_eq!(store.inner().get_by_id(&ctx, &record.id).await?, record);
    Ok(())
}

#[tokio::test]
async fn buffered_writes_are_visible_before_flush() -> Result<()> {
    let ctx = Context::background();
    let persisted = task("persisted");
    let store = CoalescingStore::new(MemoryStore::with_tasks(vec![persisted.clone()]));
    store.enable_auto_save(LONG)?;

    let queued = task("queued");
    store.add(&ctx, queued.clone()).await?;

    let mut edited = persisted.clone();
    edited.title = "persisted, edited".into();
    let stored = store.update(&ctx, &persisted.id, edited).await?;

    assert_eq!(store.pending_len(), 2);
    assert_eq!(store.inner().load(&ctx).await?, vec![persisted.clone()]);
    assert_eq!(store.get_by_id(&ctx, &queued.id).await?, queued);
    assert_eq!(store.get_by_id(&ctx, &persisted.id).await?, stored);
    assert_eq!(store.load(&ctx).await?, vec![stored, queued]);

    store.disable_auto_save().await?;
    Ok(())
}

#[tokio::test]
async fn disable_merges_buffer_into_persisted_collection() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ctx = Context::background();
    let store = CoalescingStore::new(FileStore::new(dir.path().join("tasks.json")));

    let existing = task("existing");
    store.add(&ctx, existing.clone()).await?;

    store.enable_auto_save(LONG)?;
    let first = task("first");
    let second = task("second");
    store.add(&ctx, first.clone()).await?;
    store.add(&ctx, second.clone()).await?;
    store.disable_auto_save().await?;

    assert!(!store.is_auto_save_enabled());
    assert_eq!(store.pending_len(), 0);
    let mut titles: Vec<String> = store
        .inner()
        .load(&ctx)
        .await?
        .into_iter()
        .map(|t| t.title)
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["existing", "first", "second"]);
    Ok(())
}

#[tokio::test]
async fn buffered_add_detects_duplicates_in_both_layers() -> Result<()> {
    let ctx = Context::background();
    let persisted = task("persisted");
    let store = CoalescingStore::new(MemoryStore::with_tasks(vec![persisted.clone()]));
    store.enable_auto_save(LONG)?;

    let err = store.add(&ctx, persisted.clone()).await.err();
    assert!(matches!(err, Some(StoreError::DuplicateId(_))));

    let queued = task("queued");
    store.add(&ctx, queued.clone()).await?;
    let err = store.add(&ctx, queued).await.err();
    assert!(matches!(err, Some(StoreError::DuplicateId(_))));

    store.disable_auto_save().await?;
    Ok(())
}

#[tokio::test]
async fn buffered_writes_are_validated_eagerly() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(MemoryStore::new());
    store.enable_auto_save(LONG)?;

    let err = store.add(&ctx, task("")).await.err();
    assert!(matches!(
        err,
        Some(StoreError::Validation(ValidationError::EmptyTitle))
    ));
    let err = store
        .update(&ctx, &TaskId::generate(), task("missing"))
        .await
        .err();
    assert!(err.as_ref().is_some_and(StoreError::is_not_found));
    assert_eq!(store.pending_len(), 0);

    store.disable_auto_save().await?;
    Ok(())
}

#[tokio::test]
async fn repeated_buffered_updates_keep_increasing_timestamps() -> Result<()> {
    let ctx = Context::background();
    let persisted = task("persisted");
    let store = CoalescingStore::new(MemoryStore::with_tasks(vec![persisted.clone()]));
    store.enable_auto_save(LONG)?;

    let first = store.update(&ctx, &persisted.id, persisted.clone()).await?;
    let second = store.update(&ctx, &persisted.id, persisted.clone()).await?;
    assert!(first.updated_at > persisted.updated_at);
    assert!(second.updated_at > first.updated_at);
    assert_eq!(second.created_at, persisted.created_at);

    store.disable_auto_save().await?;
    Ok(())
}

#[tokio::test]
async fn deleting_buffer_only_record_succeeds() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(MemoryStore::new());
    store.enable_auto_save(LONG)?;

    let queued = task("queued");
    store.add(&ctx, queued.clone()).await?;
    store.delete(&ctx, &queued.id).await?;

    assert_eq!(store.pending_len(), 0);
    assert!(store.get_by_id(&ctx, &queued.id).await.is_err());
    let err = store.delete(&ctx, &queued.id).await.err();
    assert!(err.as_ref().is_some_and(StoreError::is_not_found));

    store.disable_auto_save().await?;
    assert!(store.inner().is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_writes_through_and_purges_buffer() -> Result<()> {
    let ctx = Context::background();
    let persisted = task("persisted");
    let store = CoalescingStore::new(MemoryStore::with_tasks(vec![persisted.clone()]));
    store.enable_auto_save(LONG)?;

    let mut edited = persisted.clone();
    edited.title = "edited".into();
    store.update(&ctx, &persisted.id, edited).await?;
    store.delete(&ctx, &persisted.id).await?;

    assert_eq!(store.pending_len(), 0);
    assert!(store.inner().is_empty());
    store.disable_auto_save().await?;
    assert!(store.inner().is_empty());
    Ok(())
}

#[tokio::test]
async fn enabling_twice_keeps_single_flusher() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(MemoryStore::new());
    store.enable_auto_save(LONG)?;
    store.enable_auto_save(Duration::from_millis(1))?;
    assert!(store.is_auto_save_enabled());

    store.add(&ctx, task("queued")).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The second call was ignored, so the long interval still applies.
    assert_eq!(store.pending_len(), 1);

    store.disable_auto_save().await?;
    assert_eq!(store.inner().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_flusher_persists_without_explicit_flush() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(MemoryStore::new());
    store.enable_auto_save(Duration::from_millis(20))?;

    store.add(&ctx, task("queued")).await?;
    for _ in 0..100 {
        if store.inner().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.inner().len(), 1);
    assert_eq!(store.pending_len(), 0);

    store.disable_auto_save().await?;
    Ok(())
}

#[tokio::test]
async fn flush_of_empty_buffer_does_not_touch_store() -> Result<()> {
    let store = CoalescingStore::new(FlakyStore::default());
    store.enable_auto_save(LONG)?;
    assert_eq!(store.flush(&Context::background()).await?, 0);
    store.disable_auto_save().await?;
    assert_eq!(store.inner().saves.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn failed_load_keeps_buffer_for_retry() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(FlakyStore::default());
    store.enable_auto_save(LONG)?;
    store.add(&ctx, task("queued")).await?;

    store.inner().fail_load.store(true, Ordering::SeqCst);
    assert!(store.flush(&ctx).await.is_err());
    assert_eq!(store.pending_len(), 1);

    store.inner().fail_load.store(false, Ordering::SeqCst);
    assert_eq!(store.flush(&ctx).await?, 1);
    assert_eq!(store.pending_len(), 0);
    assert_eq!(store.inner().inner.len(), 1);

    store.disable_auto_save().await?;
    Ok(())
}

#[tokio::test]
async fn failed_save_restores_buffer_and_disable_reports_it() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(FlakyStore::default());
    store.enable_auto_save(LONG)?;
    store.add(&ctx, task("queued")).await?;

    store.inner().fail_save.store(true, Ordering::SeqCst);
    assert!(store.disable_auto_save().await.is_err());
    assert!(!store.is_auto_save_enabled());
    assert_eq!(store.pending_len(), 1);

    store.inner().fail_save.store(false, Ordering::SeqCst);
    assert_eq!(store.flush(&ctx).await?, 1);
    assert_eq!(store.inner().inner.len(), 1);
    Ok(())
}

#[tokio::test]
async fn write_through_after_failed_disable_is_not_overwritten() -> Result<()> {
    let ctx = Context::background();
    let persisted = task("persisted");
    let flaky = FlakyStore {
        inner: MemoryStore::with_tasks(vec![persisted.clone()]),
        ..FlakyStore::default()
    };
    let store = CoalescingStore::new(flaky);
    store.enable_auto_save(LONG)?;

    let mut buffered = persisted.clone();
    buffered.title = "A".into();
    store.update(&ctx, &persisted.id, buffered).await?;

    store.inner().fail_save.store(true, Ordering::SeqCst);
    assert!(store.disable_auto_save().await.is_err());
    assert_eq!(store.pending_len(), 1);
    store.inner().fail_save.store(false, Ordering::SeqCst);

    let mut newer = persisted.clone();
    newer.title = "B".into();
    let stored = store.update(&ctx, &persisted.id, newer).await?;
    assert_eq!(stored.title, "B");
    assert_eq!(store.pending_len(), 0);
    assert_eq!(store.get_by_id(&ctx, &persisted.id).await?.title, "B");

    assert_eq!(store.flush(&ctx).await?, 0);
    assert_eq!(store.inner().get_by_id(&ctx, &persisted.id).await?.title, "B");
    Ok(())
}

#[tokio::test]
async fn write_through_add_lands_leftover_buffer_first() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(FlakyStore::default());
    store.enable_auto_save(LONG)?;
    let leftover = task("leftover");
    store.add(&ctx, leftover.clone()).await?;

    store.inner().fail_save.store(true, Ordering::SeqCst);
    assert!(store.disable_auto_save().await.is_err());
    store.inner().fail_save.store(false, Ordering::SeqCst);

    let direct = task("direct");
    store.add(&ctx, direct.clone()).await?;
    assert_eq!(store.pending_len(), 0);
    assert_eq!(store.inner().load(&ctx).await?, vec![leftover, direct]);
    Ok(())
}

#[tokio::test]
async fn lossy_fallback_persists_only_buffer() -> Result<()> {
    let ctx = Context::background();
    let persisted = task("persisted");
    let flaky = FlakyStore {
        inner: MemoryStore::with_tasks(vec![persisted]),
        ..FlakyStore::default()
    };
    let store = CoalescingStore::with_config(
        flaky,
        CoalescingConfig {
            lossy_fallback: true,
        },
    );
    store.enable_auto_save(LONG)?;
    let queued = task("queued");
    store.add(&ctx, queued.clone()).await?;

    store.inner().fail_load.store(true, Ordering::SeqCst);
    assert_eq!(store.flush(&ctx).await?, 1);
    assert_eq!(store.pending_len(), 0);

    store.inner().fail_load.store(false, Ordering::SeqCst);
    assert_eq!(store.inner().load(&ctx).await?, vec![queued]);
    store.disable_auto_save().await?;
    Ok(())
}

#[tokio::test]
async fn save_replaces_buffer_with_callers_collection() -> Result<()> {
    let ctx = Context::background();
    let store = CoalescingStore::new(MemoryStore::new());
    store.enable_auto_save(LONG)?;
    store.add(&ctx, task("queued")).await?;

    let replacement = vec![task("replacement")];
    store.save(&ctx, &replacement).await?;
    assert_eq!(store.pending_len(), 0);

    store.disable_auto_save().await?;
    assert_eq!(store.inner().load(&ctx).await?, replacement);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_buffered_adds_all_land() -> Result<()> {
    let store = Arc::new(CoalescingStore::new(MemoryStore::new()));
    store.enable_auto_save(Duration::from_millis(5))?;

    let mut handles = Vec::new();
    for n in 0..50 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .add(&Context::background(), task(&format!("task {n}")))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }
    store.disable_auto_save().await?;
    assert_eq!(store.inner().len(), 50);
    Ok(())
}
