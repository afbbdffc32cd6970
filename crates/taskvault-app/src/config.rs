use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use taskvault_store::CoalescingConfig;

const DATA_DIR: &str = ".taskvault";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_FILE_NAME: &str = "tasks.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Values read from `config.toml`. Every key is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    file_name: Option<String>,
    autosave_interval_ms: Option<u64>,
    lossy_fallback: Option<bool>,
    timeout_secs: Option<u64>,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Directory holding the task file and `config.toml`.
    pub data_dir: Option<PathBuf>,
    /// Explicit config file. Must exist when given.
    pub config_file: Option<PathBuf>,
}

/// Resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Directory holding the task file.
    pub data_dir: PathBuf,
    /// Task file name inside `data_dir`.
    pub file_name: String,
    /// Flush period for buffered writes. `None` writes every change through.
    pub autosave_interval_ms: Option<u64>,
    /// See [`CoalescingConfig::lossy_fallback`].
    pub lossy_fallback: bool,
    /// Upper bound for one command, in seconds.
    pub timeout_secs: u64,
}

impl AppConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_name: DEFAULT_FILE_NAME.into(),
            autosave_interval_ms: None,
            lossy_fallback: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Resolve configuration: command-line overrides, then `config.toml`, then defaults.
    ///
    /// The config file defaults to `<data_dir>/config.toml` and may be absent.
    ///
    /// # Errors
    /// Fails when no data directory can be determined, when an explicit config
    /// file is missing, or when the file does not parse or validate.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let base_dir = match &overrides.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()
                .ok_or_else(|| anyhow!("cannot determine home directory; pass --data-dir"))?,
        };
        let (config_path, required) = match &overrides.config_file {
            Some(path) => (path.clone(), true),
            None => (base_dir.join(CONFIG_FILE), false),
        };

        let file = if config_path.exists() {
            read_file_config(&config_path)?
        } else if required {
            bail!("config file {} does not exist", config_path.display());
        } else {
            FileConfig::default()
        };

        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| file.data_dir.clone())
            .unwrap_or(base_dir);
        let config = Self::merge(data_dir, file);
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
        Ok(config)
    }

    /// Load `path` on top of the defaults for `data_dir`.
    ///
    /// # Errors
    /// Fails when the file cannot be read, parsed or validated.
    pub fn from_path(data_dir: impl Into<PathBuf>, path: impl AsRef<Path>) -> Result<Self> {
        let file = read_file_config(path.as_ref())?;
        let data_dir = file.data_dir.clone().unwrap_or_else(|| data_dir.into());
        let config = Self::merge(data_dir, file);
        config.validate()?;
        Ok(config)
    }

    fn merge(data_dir: PathBuf, file: FileConfig) -> Self {
        let defaults = Self::with_data_dir(data_dir);
        Self {
            file_name: file.file_name.unwrap_or(defaults.file_name),
            autosave_interval_ms: file.autosave_interval_ms,
            lossy_fallback: file.lossy_fallback.unwrap_or(defaults.lossy_fallback),
            timeout_secs: file.timeout_secs.unwrap_or(defaults.timeout_secs),
            data_dir: defaults.data_dir,
        }
    }

    /// Reject values that would make the stores misbehave.
    ///
    /// # Errors
    /// Describes the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let name = self.file_name.trim();
        if name.is_empty() {
            bail!("file_name must not be empty");
        }
        if Path::new(name).components().count() != 1 || name == "." || name == ".." {
            bail!("file_name must be a plain file name, got {name:?}");
        }
        if self.autosave_interval_ms == Some(0) {
            bail!("autosave_interval_ms must be greater than zero");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Full path of the task file.
    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    /// Auto-save period, when enabled.
    pub fn autosave_interval(&self) -> Option<Duration> {
        self.autosave_interval_ms.map(Duration::from_millis)
    }

    /// Per-command timeout.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Settings for the coalescing store.
    pub const fn coalescing(&self) -> CoalescingConfig {
        CoalescingConfig {
            lossy_fallback: self.lossy_fallback,
        }
    }
}

/// `~/.taskvault`, when a home directory is known.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DATA_DIR))
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}
