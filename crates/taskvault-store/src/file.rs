//! JSON file backend with atomic whole-file replacement.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use taskvault_core::{Task, TaskId};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::collection;
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::RecordStore;

/// Storage backed by a single JSON array on disk.
///
/// Saves write `<path>.tmp` and rename it over `<path>`, so readers never see a
/// partially written file. The lock only covers this process; two processes
/// sharing one file can still overwrite each other's changes.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Store persisting to `path`. Nothing is touched until the first call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Path of the JSON document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling used while saving.
    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.path)
    }

    async fn read_all(&self, ctx: &Context) -> Result<Vec<Task>> {
        let bytes = match ctx.run(tokio::fs::read(&self.path)).await? {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "task file missing; starting empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let tasks: Option<Vec<Task>> =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
                path: self.path.clone(),
                source,
            })?;
        let tasks = tasks.unwrap_or_default();
        debug!(path = %self.path.display(), count = tasks.len(), "loaded tasks");
        Ok(tasks)
    }

    async fn write_all(&self, ctx: &Context, tasks: &[Task]) -> Result<()> {
        let data = serde_json::to_vec_pretty(tasks).map_err(StoreError::Encode)?;
        replace_file(ctx, &self.path, &data, |from, to| tokio::fs::rename(from, to)).await?;
        debug!(path = %self.path.display(), count = tasks.len(), "saved tasks");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn load(&self, ctx: &Context) -> Result<Vec<Task>> {
        let _guard = self.lock.read().await;
        self.read_all(ctx).await
    }

    async fn save(&self, ctx: &Context, tasks: &[Task]) -> Result<()> {
        let _guard = self.lock.write().await;
        self.write_all(ctx, tasks).await
    }

    async fn add(&self, ctx: &Context, task: Task) -> Result<()> {
        task.validate()?;
        let _guard = self.lock.write().await;
        let mut tasks = self.read_all(ctx).await?;
        collection::insert(&mut tasks, task)?;
        self.write_all(ctx, &tasks).await
    }

    async fn update(&self, ctx: &Context, id: &TaskId, task: Task) -> Result<Task> {
        task.validate_fields()?;
        let _guard = self.lock.write().await;
        let mut tasks = self.read_all(ctx).await?;
        let stored = collection::replace(&mut tasks, id, task)?;
        self.write_all(ctx, &tasks).await?;
        Ok(stored)
    }

    async fn delete(&self, ctx: &Context, id: &TaskId) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut tasks = self.read_all(ctx).await?;
        collection::remove(&mut tasks, id)?;
        self.write_all(ctx, &tasks).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &TaskId) -> Result<Task> {
        let _guard = self.lock.read().await;
        let tasks = self.read_all(ctx).await?;
        collection::find(&tasks, id)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write `data` to the temp sibling of `path`, then move it into place with
/// `rename`. The temp file is removed on any failure.
async fn replace_file<R, Fut>(ctx: &Context, path: &Path, data: &[u8], rename: R) -> Result<()>
where
    R: FnOnce(PathBuf, PathBuf) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    ctx.check()?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| StoreError::io(dir, err))?;
    }

    let tmp = temp_path_for(path);
    if let Err(err) = tokio::fs::write(&tmp, data).await {
        discard_temp(&tmp).await;
        return Err(StoreError::io(&tmp, err));
    }
    if let Err(err) = ctx.check() {
        discard_temp(&tmp).await;
        return Err(err);
    }
    if let Err(err) = rename(tmp.clone(), path.to_path_buf()).await {
        discard_temp(&tmp).await;
        return Err(StoreError::io(path, err));
    }
    Ok(())
}

async fn discard_temp(tmp: &Path) {
    match tokio::fs::remove_file(tmp).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %tmp.display(), error = %err, "failed to remove temporary file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskvault_core::Priority;

    fn task(title: &str) -> Task {
        Task::new(title, "", Priority::High, None, Vec::<String>::new())
    }

    #[test]
    fn temp_path_appends_suffix() {
        let store = FileStore::new("/data/tasks.json");
        assert_eq!(store.temp_path(), PathBuf::from("/data/tasks.json.tmp"));
    }

    #[tokio::test]
    async fn failed_rename_keeps_previous_content() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|err| StoreError::io("tempdir", err))?;
        let path = dir.path().join("tasks.json");
        let store = FileStore::new(&path);
        let ctx = Context::background();

        let kept = task("kept");
        store.save(&ctx, std::slice::from_ref(&kept)).await?;
        let before = std::fs::read(&path).map_err(|err| StoreError::io(&path, err))?;

        let data = serde_json::to_vec_pretty(&[task("lost")]).map_err(StoreError::Encode)?;
        let result = replace_file(&ctx, &path, &data, |_, _| async {
            Err(io::Error::other("simulated crash before rename"))
        })
        .await;

        assert!(matches!(result, Err(StoreError::Io { .. })));
        let after = std::fs::read(&path).map_err(|err| StoreError::io(&path, err))?;
        assert_eq!(before, after);
        assert!(!store.temp_path().exists());
        assert_eq!(store.load(&ctx).await?, vec![kept]);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_save_leaves_no_temp_file() -> Result<()> {
        let dir = tempfile::tempdir().map_err(|err| StoreError::io("tempdir", err))?;
        let path = dir.path().join("tasks.json");
        let store = FileStore::new(&path);

        let ctx = Context::background();
        ctx.cancel();
        let result = store.save(&ctx, &[task("never")]).await;

        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert!(!path.exists());
        assert!(!store.temp_path().exists());
        Ok(())
    }
}
