//! Application layer for taskvault.
//!
//! This crate holds configuration loading, the task service used by the
//! command-line front end, and the concurrent multi-format exporter.

pub mod config;
pub mod export;
pub mod service;

// Re-exports for convenience
pub use config::{AppConfig, ConfigOverrides, default_data_dir};
pub use export::{
    ExportError, ExportFormat, ExportReport, ExportedFile, Exporter, FormatFailure, RenderError,
    format_minutes, priority_mark,
};
pub use service::{NewTask, TaskPatch, TaskService, TaskStats};
