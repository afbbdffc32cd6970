//! CRUD rules shared by every store implementation.
//!
//! Each store loads its full collection, applies one of these helpers, and
//! writes the collection back. That is O(N) per mutation, which is fine for
//! the small collections this crate is built for.

use std::collections::{BTreeMap, BTreeSet};

use taskvault_core::{Task, TaskId, timestamp_after};

use crate::error::{Result, StoreError};

/// Append `task` unless its id is already taken.
pub(crate) fn insert(tasks: &mut Vec<Task>, task: Task) -> Result<()> {
    task.validate()?;
    if tasks.iter().any(|existing| existing.id == task.id) {
        return Err(StoreError::DuplicateId(task.id));
    }
    tasks.push(task);
    Ok(())
}

/// Replace the record stored under `id` and return the stored value.
pub(crate) fn replace(tasks: &mut [Task], id: &TaskId, task: Task) -> Result<Task> {
    task.validate_fields()?;
    let slot = tasks
        .iter_mut()
        .find(|existing| &existing.id == id)
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    let rebased = rebase_update(slot, id, task);
    *slot = rebased.clone();
    Ok(rebased)
}

/// Remove the record stored under `id`.
pub(crate) fn remove(tasks: &mut Vec<Task>, id: &TaskId) -> Result<Task> {
    let index = tasks
        .iter()
        .position(|existing| &existing.id == id)
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    Ok(tasks.remove(index))
}

/// Owned copy of the record stored under `id`.
pub(crate) fn find(tasks: &[Task], id: &TaskId) -> Result<Task> {
    tasks
        .iter()
        .find(|existing| &existing.id == id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(id.clone()))
}

/// Apply update rules: keep the stored id and creation time, and move
/// `updated_at` strictly past the stored value.
pub(crate) fn rebase_update(existing: &Task, id: &TaskId, mut task: Task) -> Task {
    task.id = id.clone();
    task.created_at = existing.created_at;
    task.updated_at = task.updated_at.max(timestamp_after(existing.updated_at));
    task
}

/// Overlay `pending` onto `current`; pending values win.
///
/// Records keep their position in `current`. Pending records that are not in
/// `current` are appended in id order.
pub(crate) fn merge(current: Vec<Task>, pending: &BTreeMap<TaskId, Task>) -> Vec<Task> {
    let mut replaced = BTreeSet::new();
    let mut merged: Vec<Task> = current
        .into_iter()
        .map(|task| match pending.get(&task.id) {
            Some(newer) => {
                replaced.insert(task.id);
                newer.clone()
            }
            None => task,
        })
        .collect();
    merged.extend(
        pending
            .iter()
            .filter(|(id, _)| !replaced.contains(*id))
            .map(|(_, task)| task.clone()),
    );
    merged
}
