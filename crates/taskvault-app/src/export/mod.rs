//! Multi-format export of the task collection.
//!
//! [`Exporter::concurrent_export`] loads one snapshot and renders every
//! requested format on its own Tokio task. One format failing never stops the
//! others; all failures are collected into a single [`ExportError::Failed`].

mod render;

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use taskvault_core::Task;
use taskvault_store::{Context, RecordStore, StoreError};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

pub use render::{format_minutes, priority_mark, render_csv, render_json, render_markdown};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    Json,
    /// Unquoted CSV table.
    Csv,
    /// Markdown report.
    Markdown,
}

impl ExportFormat {
    /// Canonical token.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Markdown => "markdown",
        }
    }

    /// Render `tasks` into file contents.
    ///
    /// # Errors
    /// Encoding errors from the selected renderer.
    pub fn render(
        self,
        tasks: &[Task],
        generated_at: OffsetDateTime,
    ) -> Result<Vec<u8>, RenderError> {
        match self {
            Self::Json => render_json(tasks),
            Self::Csv => render_csv(tasks),
            Self::Markdown => Ok(render_markdown(tasks, generated_at)?.into_bytes()),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "markdown" | "md" => Ok(Self::Markdown),
            _ => Err(RenderError::Unsupported(s.trim().to_owned())),
        }
    }
}

/// Failure of a single format.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Unknown format token.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// JSON encoding failed.
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding failed.
    #[error("failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),

    /// A timestamp could not be formatted.
    #[error("failed to format timestamp: {0}")]
    Timestamp(#[from] time::error::Format),

    /// Writing the output file failed.
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        /// Output file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The render task panicked or was aborted.
    #[error("export task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A failed format together with the token that requested it.
#[derive(Debug)]
pub struct FormatFailure {
    /// Token as requested, trimmed.
    pub format: String,
    /// What went wrong.
    pub error: RenderError,
}

impl fmt::Display for FormatFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.format, self.error)
    }
}

/// Errors returned by [`Exporter`].
#[derive(Debug, Error)]
pub enum ExportError {
    /// Nothing was requested.
    #[error("no export formats requested")]
    NoFormats,

    /// The snapshot could not be loaded; nothing was written.
    #[error("failed to load tasks for export: {0}")]
    Load(#[source] StoreError),

    /// One or more formats failed. Other formats may have been written.
    #[error("export errors: {}", join_failures(.0))]
    Failed(Vec<FormatFailure>),
}

impl ExportError {
    /// Per-format failures, empty for the other variants.
    pub fn failures(&self) -> &[FormatFailure] {
        match self {
            Self::Failed(failures) => failures,
            Self::NoFormats | Self::Load(_) => &[],
        }
    }
}

fn join_failures(failures: &[FormatFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One file produced by an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Format written.
    pub format: ExportFormat,
    /// Destination path.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: usize,
}

/// Files written by a successful export, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    /// Written files.
    pub files: Vec<ExportedFile>,
}

/// Export front end over any [`RecordStore`].
pub struct Exporter<S> {
    store: Arc<S>,
}

impl<S> Exporter<S>
where
    S: RecordStore + 'static,
{
    /// Export from `store`.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Write every requested format to `<base>.<token>` concurrently.
    ///
    /// The collection is loaded once through `ctx`. After that the context no
    /// longer matters: launched renderers run to completion.
    ///
    /// # Errors
    /// [`ExportError::NoFormats`] for an empty request, [`ExportError::Load`]
    /// when the snapshot fails, [`ExportError::Failed`] listing every format
    /// that could not be written.
    pub async fn concurrent_export<I, T>(
        &self,
        ctx: &Context,
        formats: I,
        base: impl AsRef<Path>,
    ) -> Result<ExportReport, ExportError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let tokens: Vec<String> = formats
            .into_iter()
            .map(|token| token.as_ref().trim().to_owned())
            .collect();
        if tokens.is_empty() {
            return Err(ExportError::NoFormats);
        }

        let snapshot: Arc<[Task]> = self
            .store
            .load(ctx)
            .await
            .map_err(ExportError::Load)?
            .into();
        let generated_at = generated_now();
        let base = base.as_ref();

        let handles: Vec<_> = tokens
            .into_iter()
            .map(|token| {
                let tasks = Arc::clone(&snapshot);
                let path = target_path(base, &token);
                let requested = token.clone();
                let handle = tokio::spawn(async move {
                    write_format(&requested, &tasks, generated_at, &path).await
                });
                (token, handle)
            })
            .collect();

        let mut report = ExportReport::default();
        let mut failures = Vec::new();
        for (token, handle) in handles {
            match handle.await.map_err(RenderError::from).and_then(|outcome| outcome) {
                Ok(file) => report.files.push(file),
                Err(error) => {
                    warn!(format = %token, error = %error, "export format failed");
                    failures.push(FormatFailure {
                        format: token,
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(ExportError::Failed(failures));
        }
        info!(
            files = report.files.len(),
            tasks = snapshot.len(),
            "export finished"
        );
        Ok(report)
    }

    /// Write a single format to an explicit `path`.
    ///
    /// # Errors
    /// [`ExportError::Load`] when the snapshot fails, [`ExportError::Failed`]
    /// with one entry when rendering or writing fails.
    pub async fn export(
        &self,
        ctx: &Context,
        format: ExportFormat,
        path: impl AsRef<Path>,
    ) -> Result<ExportedFile, ExportError> {
        let tasks = self.store.load(ctx).await.map_err(ExportError::Load)?;
        let file = write_format(format.as_str(), &tasks, generated_now(), path.as_ref())
            .await
            .map_err(|error| {
                ExportError::Failed(vec![FormatFailure {
                    format: format.as_str().to_owned(),
                    error,
                }])
            })?;
        info!(
            format = %format,
            path = %file.path.display(),
            tasks = tasks.len(),
            "exported tasks"
        );
        Ok(file)
    }
}

async fn write_format(
    token: &str,
    tasks: &[Task],
    generated_at: OffsetDateTime,
    path: &Path,
) -> Result<ExportedFile, RenderError> {
    let format: ExportFormat = token.parse()?;
    let data = format.render(tasks, generated_at)?;
    tokio::fs::write(path, &data)
        .await
        .map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(ExportedFile {
        format,
        path: path.to_path_buf(),
        bytes: data.len(),
    })
}

fn target_path(base: &Path, token: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(token);
    PathBuf::from(name)
}

fn generated_now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
