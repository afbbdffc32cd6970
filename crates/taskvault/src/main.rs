//! CLI entry point for taskvault.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use taskvault_app::{AppConfig, ConfigOverrides, ExportFormat};
use taskvault_core::{DueFilter, Priority, TaskId};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod commands;
mod due;

/// Personal task list stored as a single JSON file.
#[derive(Parser, Debug)]
#[command(
    name = "taskvault",
    version,
    about = "taskvault: tasks kept in one JSON file, with concurrent export"
)]
struct Cli {
    /// Directory holding tasks.json and config.toml (defaults to ~/.taskvault).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Explicit config file (defaults to <data-dir>/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new task.
    Add {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Due date: YYYY-MM-DD[ HH:MM], MM/DD/YYYY, today, tomorrow, 3d, 2h.
        #[arg(short = 'D', long)]
        due: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List tasks, pending only unless --all is given.
    #[command(alias = "list")]
    Ls {
        #[arg(short, long)]
        all: bool,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        search: Option<String>,
        /// today, overdue, week, or a number of days.
        #[arg(short, long)]
        due: Option<DueFilter>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Mark a task as completed.
    #[command(alias = "complete")]
    Done { id: TaskId },

    /// Mark a task as pending again.
    #[command(alias = "uncomplete")]
    Undo { id: TaskId },

    /// Delete a task.
    #[command(alias = "delete")]
    Rm { id: TaskId },

    /// Change fields of an existing task.
    #[command(alias = "update")]
    Edit {
        id: TaskId,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        /// New due date, or "none" to clear it.
        #[arg(short = 'D', long)]
        due: Option<String>,
        /// Replace the tag set.
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Remove every tag.
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },

    /// Show one task in detail.
    #[command(alias = "get")]
    Show { id: TaskId },

    /// Print counts by status, due window and priority.
    Stats,

    /// Export every task in one format to FILE.
    Export { format: ExportFormat, file: PathBuf },

    /// Export to several comma-separated formats at once, writing BASE.<format>.
    ExportAll { formats: String, base: PathBuf },
}

fn main() -> Result<()> {
    let Cli {
        data_dir,
        config,
        cmd,
    } = Cli::parse();

    install_tracing();

    let config = AppConfig::load(&ConfigOverrides {
        data_dir,
        config_file: config,
    })?;
    tokio::runtime::Runtime::new()?.block_on(commands::run(cmd, &config))
}

fn install_tracing() {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

/// Filter from `RUST_LOG`-style directives, INFO when unset or unparsable.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn log_filter_prefers_given_directives() {
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(Some("warn")).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn parse_add_command() {
        let cli = Cli::parse_from([
            "taskvault",
            "--data-dir",
            "/tmp/vault",
            "add",
            "--title",
            "Improve docs",
            "-p",
            "high",
            "--due",
            "tomorrow",
            "--tag",
            "docs",
            "--tag",
            "work",
        ]);

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/vault")));
        match cli.cmd {
            Command::Add {
                title,
                priority,
                due,
                tags,
                ..
            } => {
                assert_eq!(title, "Improve docs");
                assert_eq!(priority, Priority::High);
                assert_eq!(due.as_deref(), Some("tomorrow"));
                assert_eq!(tags, vec!["docs", "work"]);
            }
            _ => panic!("expected add command"),
        }
    }

    #[test]
    fn parse_ls_filters() {
        let cli = Cli::parse_from(["taskvault", "list", "--all", "--due", "week", "-p", "l"]);
        match cli.cmd {
            Command::Ls {
                all, due, priority, ..
            } => {
                assert!(all);
                assert_eq!(due, Some(DueFilter::NextDays(7)));
                assert_eq!(priority, Some(Priority::Low));
            }
            _ => panic!("expected ls command"),
        }
    }

    #[test]
    fn parse_export_all_command() {
        let cli = Cli::parse_from(["taskvault", "export-all", "json,csv,md", "backup/tasks"]);
        match cli.cmd {
            Command::ExportAll { formats, base } => {
                assert_eq!(formats, "json,csv,md");
                assert_eq!(base, PathBuf::from("backup/tasks"));
            }
            _ => panic!("expected export-all command"),
        }
    }

    #[test]
    fn rejects_unknown_export_format() {
        let result = Cli::try_parse_from(["taskvault", "export", "xml", "out.xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let cli = Cli::parse_from(["taskvault", "stats", "--config", "/etc/taskvault.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/taskvault.toml")));
        assert!(matches!(cli.cmd, Command::Stats));
    }
}
