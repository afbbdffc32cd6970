//! Pure renderers from a task slice to file contents.

use std::fmt::Write as _;

use taskvault_core::{Priority, Task};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use super::RenderError;

const MINUTES: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");
const SECONDS: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const CSV_HEADER: [&str; 8] = [
    "ID",
    "Title",
    "Description",
    "Priority",
    "Completed",
    "Due Date",
    "Created",
    "Updated",
];

/// Pretty-printed JSON array using the persisted field names.
///
/// # Errors
/// [`RenderError::Json`] when serialization fails.
pub fn render_json(tasks: &[Task]) -> Result<Vec<u8>, RenderError> {
    Ok(serde_json::to_vec_pretty(tasks)?)
}

/// Unquoted CSV with one row per task.
///
/// Commas in titles and descriptions become `;` so that columns stay aligned.
///
/// # Errors
/// [`RenderError::Csv`] when a row cannot be written, or
/// [`RenderError::Timestamp`] when a timestamp cannot be formatted.
pub fn render_csv(tasks: &[Task]) -> Result<Vec<u8>, RenderError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for task in tasks {
        writer.write_record([
            task.id.to_string(),
            task.title.replace(',', ";"),
            task.description.replace(',', ";"),
            task.priority.as_str().to_owned(),
            task.completed.to_string(),
            task.due_date.map(format_minutes).transpose()?.unwrap_or_default(),
            format_minutes(task.created_at)?,
            format_minutes(task.updated_at)?,
        ])?;
    }
    writer
        .into_inner()
        .map_err(|err| RenderError::Csv(err.into_error().into()))
}

/// Markdown report grouped into pending and completed sections.
///
/// Empty sections are left out.
///
/// # Errors
/// [`RenderError::Timestamp`] when a timestamp cannot be formatted.
pub fn render_markdown(
    tasks: &[Task],
    generated_at: OffsetDateTime,
) -> Result<String, RenderError> {
    let (completed, pending): (Vec<&Task>, Vec<&Task>) = tasks.iter().partition(|t| t.completed);

    let mut out = String::from("# Task Export\n\n");
    let _ = write!(out, "Generated on: {}\n\n", generated_at.format(SECONDS)?);

    if !pending.is_empty() {
        let _ = write!(out, "## Pending Tasks ({})\n\n", pending.len());
        for task in &pending {
            write_markdown_task(&mut out, task)?;
        }
        out.push('\n');
    }
    if !completed.is_empty() {
        let _ = write!(out, "## Completed Tasks ({})\n\n", completed.len());
        for task in &completed {
            write_markdown_task(&mut out, task)?;
        }
    }
    Ok(out)
}

fn write_markdown_task(out: &mut String, task: &Task) -> Result<(), RenderError> {
    let status = if task.completed { "✅" } else { "❌" };
    let _ = write!(
        out,
        "### {status} {} {}\n\n",
        priority_mark(task.priority),
        task.title
    );
    if !task.description.is_empty() {
        let _ = write!(out, "**Description:** {}\n\n", task.description);
    }
    if let Some(due) = task.due_date {
        let _ = write!(out, "**Due:** {}\n\n", format_minutes(due)?);
    }
    let _ = writeln!(out, "**ID:** `{}`  ", task.id);
    let _ = writeln!(out, "**Created:** {}  ", format_minutes(task.created_at)?);
    if task.updated_at > task.created_at {
        let _ = writeln!(out, "**Updated:** {}  ", format_minutes(task.updated_at)?);
    }
    out.push('\n');
    Ok(())
}

/// Colored marker for a priority level.
pub const fn priority_mark(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "🔴",
        Priority::Medium => "🟡",
        Priority::Low => "🟢",
    }
}

/// `YYYY-MM-DD HH:MM` in the timestamp's own offset.
///
/// # Errors
/// Formatting errors from `time`.
pub fn format_minutes(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.format(MINUTES)
}
