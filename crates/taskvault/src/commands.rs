use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use taskvault_app::{
    AppConfig, ExportFormat, Exporter, NewTask, TaskPatch, TaskService, TaskStats, format_minutes,
    priority_mark,
};
use taskvault_core::{Priority, Task, TaskFilter, normalize_tags};
use taskvault_store::{CoalescingStore, Context, FileStore, RecordStore};
use time::OffsetDateTime;
use tracing::debug;

use crate::Command;
use crate::due::parse_due;

type Store = CoalescingStore<FileStore>;

/// Open the configured store, run `command`, then flush buffered writes.
pub async fn run(command: Command, config: &AppConfig) -> Result<()> {
    let file = FileStore::new(config.tasks_path());
    debug!(path = %file.path().display(), "opening task store");
    let store = Arc::new(CoalescingStore::with_config(file, config.coalescing()));
    if let Some(interval) = config.autosave_interval() {
        store.enable_auto_save(interval)?;
    }

    let ctx = Context::with_timeout(config.timeout());
    let outcome = dispatch(command, &store, &ctx).await;
    let flushed = store
        .disable_auto_save()
        .await
        .context("failed to flush pending writes");
    outcome?;
    flushed
}

async fn dispatch(command: Command, store: &Arc<Store>, ctx: &Context) -> Result<()> {
    let service = TaskService::new(Arc::clone(store));
    let now = OffsetDateTime::now_utc();
    match command {
        Command::Add {
            title,
            description,
            priority,
            due,
            tags,
        } => {
            let due_date = due.as_deref().map(|raw| parse_due(raw, now)).transpose()?;
            let task = service
                .add(
                    ctx,
                    NewTask {
                        title,
                        description,
                        priority,
                        due_date,
                        tags,
                    },
                )
                .await
                .context("failed to add task")?;
            println!("✅ Added task {}: {}", task.id, task.title);
            Ok(())
        }

        Command::Ls {
            all,
            priority,
            search,
            due,
            tags,
        } => {
            let filter = TaskFilter {
                include_completed: all,
                priority,
                text: search,
                due,
                tags: normalize_tags(tags),
            };
            let tasks = service.list(ctx, &filter, now).await?;
            print_list(&tasks, now)
        }

        Command::Done { id } => {
            let task = service
                .complete(ctx, &id)
                .await
                .with_context(|| format!("failed to complete task {id}"))?;
            println!("✅ Completed: {}", task.title);
            Ok(())
        }

        Command::Undo { id } => {
            let task = service
                .uncomplete(ctx, &id)
                .await
                .with_context(|| format!("failed to reopen task {id}"))?;
            println!("⏳ Reopened: {}", task.title);
            Ok(())
        }

        Command::Rm { id } => {
            service
                .delete(ctx, &id)
                .await
                .with_context(|| format!("failed to delete task {id}"))?;
            println!("🗑️  Deleted task {id}");
            Ok(())
        }

        Command::Edit {
            id,
            title,
            description,
            priority,
            due,
            tags,
            clear_tags,
        } => {
            let patch = build_patch(
                title,
                description,
                priority,
                due.as_deref(),
                tags,
                clear_tags,
                now,
            )?;
            if patch.is_empty() {
                bail!("nothing to change; pass at least one field to edit");
            }
            let task = service
                .edit(ctx, &id, patch)
                .await
                .with_context(|| format!("failed to edit task {id}"))?;
            println!("✏️  Updated task {}", task.id);
            print_task(&task, now)
        }

        Command::Show { id } => {
            let task = service
                .show(ctx, &id)
                .await
                .with_context(|| format!("failed to load task {id}"))?;
            print_task(&task, now)
        }

        Command::Stats => {
            let stats = service.stats(ctx, now).await?;
            print_stats(&stats);
            Ok(())
        }

        Command::Export { format, file } => export_one(store, ctx, format, &file).await,

        Command::ExportAll { formats, base } => {
            let formats: Vec<&str> = formats
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .collect();
            println!("🚀 Starting concurrent export to {} formats...", formats.len());
            let report = Exporter::new(Arc::clone(store))
                .concurrent_export(ctx, formats, &base)
                .await?;
            for file in &report.files {
                println!("✅ {} -> {}", file.format, file.path.display());
            }
            Ok(())
        }
    }
}

async fn export_one<S>(
    store: &Arc<S>,
    ctx: &Context,
    format: ExportFormat,
    path: &Path,
) -> Result<()>
where
    S: RecordStore + 'static,
{
    let file = Exporter::new(Arc::clone(store)).export(ctx, format, path).await?;
    println!(
        "✅ Exported {} bytes as {} to {}",
        file.bytes,
        file.format,
        file.path.display()
    );
    Ok(())
}

fn build_patch(
    title: Option<String>,
    description: Option<String>,
    priority: Option<Priority>,
    due: Option<&str>,
    tags: Vec<String>,
    clear_tags: bool,
    now: OffsetDateTime,
) -> Result<TaskPatch> {
    let due_date = match due {
        None => None,
        Some(raw) if raw.trim().eq_ignore_ascii_case("none") => Some(None),
        Some(raw) => Some(Some(parse_due(raw, now)?)),
    };
    let tags = if clear_tags {
        Some(Vec::new())
    } else if tags.is_empty() {
        None
    } else {
        Some(tags)
    };
    Ok(TaskPatch {
        title,
        description,
        priority,
        due_date,
        tags,
    })
}

fn print_list(tasks: &[Task], now: OffsetDateTime) -> Result<()> {
    if tasks.is_empty() {
        println!("No tasks match the current filters.");
        return Ok(());
    }
    println!("\n📋 Task List ({} tasks)", tasks.len());
    println!("{}", "=".repeat(50));
    for task in tasks {
        print_task(task, now)?;
        println!();
    }
    Ok(())
}

fn status_mark(task: &Task, now: OffsetDateTime) -> &'static str {
    if task.completed {
        "✅"
    } else if task.is_overdue(now) {
        "🚨"
    } else if task.is_due_today(now) {
        "📅"
    } else if task.is_due_soon(now) {
        "⏰"
    } else {
        "⏳"
    }
}

fn print_task(task: &Task, now: OffsetDateTime) -> Result<()> {
    println!("{} {} {}", status_mark(task, now), priority_mark(task.priority), task.title);
    if !task.description.is_empty() {
        println!("   📝 {}", task.description);
    }
    if let Some(due) = task.due_date {
        let note = if task.is_overdue(now) {
            " (OVERDUE)"
        } else if task.is_due_today(now) {
            " (TODAY)"
        } else {
            ""
        };
        println!("   ⏰ Due: {}{note}", format_minutes(due)?);
    }
    if !task.tags.is_empty() {
        let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
        println!("   🏷️  Tags: {}", tags.join(", "));
    }
    println!("   🆔 ID: {}", task.id);
    println!("   📅 Created: {}", format_minutes(task.created_at)?);
    if task.updated_at > task.created_at {
        println!("   🔄 Updated: {}", format_minutes(task.updated_at)?);
    }
    Ok(())
}

fn print_stats(stats: &TaskStats) {
    println!("\n📊 Task Statistics");
    println!("{}", "=".repeat(25));
    println!("Total tasks: {}", stats.total);
    println!("Completed: {}", stats.completed);
    println!("Remaining: {}", stats.pending);
    println!("Overdue: {}", stats.overdue);
    println!("Due today: {}", stats.due_today);
    println!("Due soon (7 days): {}", stats.due_soon);
    println!();
    println!("By Priority:");
    for priority in [Priority::High, Priority::Medium, Priority::Low] {
        let count = stats.by_priority.get(&priority).copied().unwrap_or_default();
        println!("  {}: {count}", priority.as_str());
    }
    println!();
}
