use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::DeliveryMode;
use crate::payload::Fields;
use crate::queue::PendingQueue;
use crate::session::{DEFAULT_METHOD, SessionConfig};

/// Main fanlog configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    /// Extra default fields merged into every event
    pub defaults: Fields,
    /// Bridge application lifecycle notifications into events
    pub lifecycle: bool,
    pub executor: ExecutorConfig,
    pub queue: QueueConfig,
    pub upload: UploadConfig,
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Off => log::LevelFilter::Off,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Pending-event directory (defaults to a subdirectory of the system temp dir)
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub timeout_secs: u64,
    pub background_timeout_secs: u64,
    pub retry_concurrency: usize,
}

/// A channel to register at startup
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Append JSON lines to a file
    File { name: String, path: PathBuf },
    /// Print to stdout
    Stdout {
        name: String,
        #[serde(default)]
        plain_text: bool,
    },
    /// Send to an HTTP endpoint
    Http {
        name: String,
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        mode: DeliveryMode,
    },
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

impl ChannelConfig {
    pub fn name(&self) -> &str {
        match self {
            ChannelConfig::File { name, .. } => name,
            ChannelConfig::Stdout { name, .. } => name,
            ChannelConfig::Http { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChannelConfig::File { .. } => "file",
            ChannelConfig::Stdout { .. } => "stdout",
            ChannelConfig::Http { .. } => "http",
        }
    }

    /// Where the channel sends events, for display
    pub fn target(&self) -> String {
        match self {
            ChannelConfig::File { path, .. } => Config::expand_path(path).display().to_string(),
            ChannelConfig::Stdout { .. } => "stdout".to_string(),
            ChannelConfig::Http { url, method, mode, .. } => format!("{} {} ({:?})", method, url, mode),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            defaults: Fields::new(),
            lifecycle: false,
            executor: ExecutorConfig::default(),
            queue: QueueConfig::default(),
            upload: UploadConfig::default(),
            channels: vec![ChannelConfig::File {
                name: "file".to_string(),
                path: Config::fanlog_dir().join("events.jsonl"),
            }],
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { worker_threads: 4 }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            timeout_secs: session.timeout.as_secs(),
            background_timeout_secs: session.background_timeout.as_secs(),
            retry_concurrency: session.retry_concurrency,
        }
    }
}

impl UploadConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            background_timeout: Duration::from_secs(self.background_timeout_secs.max(1)),
            retry_concurrency: self.retry_concurrency.max(1),
        }
    }
}

impl QueueConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        match &self.directory {
            Some(dir) => Config::expand_path(dir),
            None => PendingQueue::default_dir(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for (origin, path) in Self::candidate_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", origin, e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Config files tried in order when no explicit path is given
    pub fn candidate_paths() -> Vec<(&'static str, PathBuf)> {
        let mut candidates = Vec::new();

        if let Ok(env_path) = std::env::var("FANLOG_CONFIG") {
            candidates.push(("FANLOG_CONFIG", PathBuf::from(env_path)));
        }
        if let Ok(dir) = std::env::var("FANLOG_DIR") {
            candidates.push(("FANLOG_DIR", PathBuf::from(dir).join("fanlog.yaml")));
        }
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(("config dir", config_dir.join("fanlog").join("fanlog.yaml")));
        }
        candidates.push(("working directory", PathBuf::from("fanlog.yaml")));

        candidates
    }

    /// The file `load` would read, if any
    pub fn locate(config_path: Option<&PathBuf>) -> Option<PathBuf> {
        if let Some(path) = config_path {
            return Some(path.clone());
        }
        Self::candidate_paths()
            .into_iter()
            .map(|(_, path)| path)
            .find(|path| path.exists())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Get the fanlog data directory
    pub fn fanlog_dir() -> PathBuf {
        std::env::var("FANLOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("fanlog"))
    }

    /// Expand a path that may contain ~ or env vars
    pub fn expand_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        let expanded = shellexpand::full(&path_str).unwrap_or_else(|_| path_str.clone());
        PathBuf::from(expanded.as_ref())
    }
}
