//! Configuration module for the file dispatch engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CONVEYOR_` and use double
//! underscores to separate nested levels:
//! - `CONVEYOR_STABILITY__POLL_INTERVAL_MS=50` sets `stability.poll_interval_ms`
//! - `CONVEYOR_QUEUE__CAPACITY=256` sets `queue.capacity`
//! - `CONVEYOR_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "conveyor.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Plugin libraries to load at engine startup, by name or path
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Directory searched when a plugin is given by bare name
    #[serde(default = "default_plugin_dir")]
    pub plugin_dir: PathBuf,

    /// Watcher definitions, one per watched directory
    #[serde(default)]
    pub watchers: Vec<WatcherConfig>,

    /// Event queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Copy-completion stability settings
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for a single watcher.
///
/// Mandatory keys are `name`, `type`, and `source`; everything else has a
/// default. A watcher keeps its own copy and never mutates it after
/// construction. Handler-specific keys land in `options`, so plugin
/// handlers can carry their own settings without core changes.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Unique watcher name, used as the engine registry key
    pub name: String,

    /// Handler type, resolved through the factory
    #[serde(rename = "type")]
    pub handler_type: String,

    /// Directory watched for new files
    pub source: PathBuf,

    /// Destination directory, for handlers that move data somewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,

    /// Watch subdirectories of the source as well
    #[serde(default = "default_false")]
    pub recursive: bool,

    /// Remove the source file after successful processing
    #[serde(default = "default_true")]
    pub delete_source: bool,

    /// Escalate a processing failure and halt this watcher's consumer
    #[serde(default = "default_false")]
    pub exit_on_failure: bool,

    /// Enqueue files already present in the source directory at start
    #[serde(default = "default_false")]
    pub scan_on_start: bool,

    /// Additional handler-specific options
    #[serde(flatten)]
    pub options: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    /// Bounded capacity of each watcher's event queue
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

/// Settings for the copy-completion stability wait.
///
/// The monitor fires on file creation, which can precede the writer
/// finishing a large copy. The consumer polls (size, mtime) until two
/// consecutive polls are unchanged before invoking the handler.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StabilityConfig {
    /// Interval between stability polls, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum total wait before the file is treated as failed, in milliseconds
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default log level filter
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_plugin_dir() -> PathBuf {
    PathBuf::from("plugins")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_max_wait_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            plugins: Vec::new(),
            plugin_dir: default_plugin_dir(),
            watchers: Vec::new(),
            queue: QueueConfig::default(),
            stability: StabilityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Settings {
    /// Load configuration from all sources.
    ///
    /// Layering: defaults, then `conveyor.toml` in the working directory,
    /// then `CONVEYOR_`-prefixed environment variables.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CONVEYOR_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".") // Double underscore becomes dot
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with one example watcher.
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        settings.watchers.push(WatcherConfig {
            name: "inbox".to_string(),
            handler_type: "copy".to_string(),
            source: PathBuf::from("inbox"),
            destination: Some(PathBuf::from("archive")),
            recursive: false,
            delete_source: true,
            exit_on_failure: false,
            scan_on_start: false,
            options: HashMap::new(),
        });

        settings.save(&config_path)?;
        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!("Created default configuration at: {}", config_path.display());
        }

        Ok(config_path)
    }
}

impl WatcherConfig {
    /// Build a minimal config programmatically, with defaults applied.
    ///
    /// Mostly a convenience for tests and embedders; TOML deserialization
    /// is the normal path.
    pub fn new(
        name: impl Into<String>,
        handler_type: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            handler_type: handler_type.into(),
            source: source.into(),
            destination: None,
            recursive: false,
            delete_source: true,
            exit_on_failure: false,
            scan_on_start: false,
            options: HashMap::new(),
        }
    }

    /// Set the destination directory.
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Set the recursion flag.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the delete-source policy.
    pub fn with_delete_source(mut self, delete_source: bool) -> Self {
        self.delete_source = delete_source;
        self
    }

    /// Set the exit-on-failure policy.
    pub fn with_exit_on_failure(mut self, exit_on_failure: bool) -> Self {
        self.exit_on_failure = exit_on_failure;
        self
    }

    /// Set the scan-on-start flag.
    pub fn with_scan_on_start(mut self, scan_on_start: bool) -> Self {
        self.scan_on_start = scan_on_start;
        self
    }
}
