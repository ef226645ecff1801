use anyhow::{bail, Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for dirmirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directory tree to mirror from
    #[serde(default)]
    pub source_folder: String,

    /// Directory tree to mirror into
    #[serde(default)]
    pub replica_folder: String,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Daemon configuration
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Pause between the end of one pass and the start of the next
    #[serde(default = "default_interval")]
    pub interval: String, // "60s", "5m", "1h" or raw seconds

    /// Maximum parallel file copies
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// Daemon configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DaemonConfig {
    /// PID file location
    #[serde(default = "default_pid_file")]
    pub pid_file: String,

    /// Log file location
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Mirror log events to stdout as well as the log file
    #[serde(default = "default_true")]
    pub console: bool,

    /// Enable colored console output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_interval() -> String {
    "60s".to_string()
}
fn default_max_parallel() -> usize {
    4
}
fn default_pid_file() -> String {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        format!("{}/dirmirror.pid", runtime_dir)
    } else {
        "/tmp/dirmirror.pid".to_string()
    }
}

fn default_log_file() -> String {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        format!("{}/dirmirror/sync.log", data_home)
    } else if let Ok(home) = std::env::var("HOME") {
        format!("{}/.local/share/dirmirror/sync.log", home)
    } else {
        "/tmp/dirmirror-sync.log".to_string()
    }
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            log_file: default_log_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: default_true(),
            color: default_true(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_folder: String::new(),
            replica_folder: String::new(),
            sync: SyncConfig::default(),
            daemon: DaemonConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Parse duration strings like "30s", "5m", "1h", "2d" or raw seconds
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_str = duration_str.trim().to_lowercase();

    let (value, unit, what) = if let Some(value) = duration_str.strip_suffix('s') {
        (value, 1u64, "seconds")
    } else if let Some(value) = duration_str.strip_suffix('m') {
        (value, 60, "minutes")
    } else if let Some(value) = duration_str.strip_suffix('h') {
        (value, 3600, "hours")
    } else if let Some(value) = duration_str.strip_suffix('d') {
        (value, 86400, "days")
    } else {
        let secs = duration_str.parse::<u64>().context(
            "Invalid duration format. Use raw seconds or a format like '30s', '5m', '1h'",
        )?;
        return Ok(Duration::from_secs(secs));
    };

    let secs = value
        .trim()
        .parse::<u64>()
        .with_context(|| format!("Invalid {} value", what))?
        .checked_mul(unit)
        .context("Interval too large")?;

    Ok(Duration::from_secs(secs))
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths
        config.expand_paths()?;

        Ok(config)
    }

    /// Load the config at `path`, or the default location if it exists, or built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_config_path()?;
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            let mut config = Self::default();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("dirmirror").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        for (name, value) in [
            ("source_folder", &mut self.source_folder),
            ("replica_folder", &mut self.replica_folder),
            ("pid_file", &mut self.daemon.pid_file),
            ("log_file", &mut self.daemon.log_file),
        ] {
            if value.is_empty() {
                continue;
            }
            *value = shellexpand::full(value.as_str())
                .with_context(|| format!("Failed to expand {} path", name))?
                .into_owned();
        }

        Ok(())
    }

    /// Parsed sync interval
    pub fn interval(&self) -> Result<Duration> {
        parse_duration(&self.sync.interval)
            .with_context(|| format!("Invalid sync interval: {:?}", self.sync.interval))
    }

    /// Absolute, lexically normalized source root
    pub fn source_root(&self) -> Result<PathBuf> {
        absolute_root(&self.source_folder).context("source_folder is not set")
    }

    /// Absolute, lexically normalized replica root
    pub fn replica_root(&self) -> Result<PathBuf> {
        absolute_root(&self.replica_folder).context("replica_folder is not set")
    }

    /// PID file path, if one is configured
    pub fn pid_file_path(&self) -> Option<PathBuf> {
        if self.daemon.pid_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.daemon.pid_file))
        }
    }

    /// Check that the configuration describes a runnable mirror
    pub fn validate(&self) -> Result<()> {
        let source = self.source_root()?;
        let replica = self.replica_root()?;

        if source == replica {
            bail!(
                "source and replica must be different directories: {}",
                source.display()
            );
        }
        // Nested roots would make each pass mirror its own output
        if replica.starts_with(&source) {
            bail!(
                "replica {} must not be inside source {}",
                replica.display(),
                source.display()
            );
        }
        if source.starts_with(&replica) {
            bail!(
                "source {} must not be inside replica {}",
                source.display(),
                replica.display()
            );
        }

        self.interval()?;

        if self.sync.max_parallel == 0 {
            bail!("sync.max_parallel must be at least 1");
        }

        Ok(())
    }
}

fn absolute_root(path: &str) -> Option<PathBuf> {
    if path.trim().is_empty() {
        return None;
    }
    let path = PathBuf::from(path);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Some(absolute.clean())
}
