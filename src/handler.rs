//! Handler capability consumed by the consumer pipeline.
//!
//! A handler is the pluggable unit of work performed on each detected
//! file. Concrete handlers are registered with the [`HandlerFactory`]
//! under a type name and built from a [`WatcherConfig`]; the consumer
//! serializes all `process` calls, so a handler is never invoked
//! concurrently.
//!
//! [`HandlerFactory`]: crate::factory::HandlerFactory
//! [`WatcherConfig`]: crate::config::WatcherConfig

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::config::WatcherConfig;

/// Errors from handler constructors and `process` calls.
///
/// A `process` error and a handler-defined failure mean the same thing to
/// the consumer: the file was not processed. Constructor errors propagate
/// unwrapped through [`HandlerFactory::create`].
///
/// [`HandlerFactory::create`]: crate::factory::HandlerFactory::create
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Watcher '{watcher}' requires option '{option}' for handler type '{handler_type}'")]
    MissingOption {
        watcher: String,
        handler_type: String,
        option: String,
    },

    #[error("Invalid value for option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

/// Shared processed-file counter.
///
/// Each handler owns one; the consumer increments it after every
/// successful `process` call, while the owning watcher (and tests) read
/// it through their own clones.
#[derive(Debug, Clone, Default)]
pub struct ProcessedCounter(Arc<AtomicU64>);

impl ProcessedCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully processed file.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Current count.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trait for handlers that process detected files.
///
/// Handlers expose the watcher configuration they were built from so the
/// consumer can read the policy flags (`delete_source`,
/// `exit_on_failure`) without knowing the concrete type.
pub trait FileHandler: Send {
    /// Handler type name for logging.
    fn name(&self) -> &str;

    /// The configuration this handler was built from.
    fn config(&self) -> &WatcherConfig;

    /// Destination directory, for handlers that have one.
    ///
    /// The watcher ensures this directory exists before starting.
    fn destination(&self) -> Option<&Path> {
        None
    }

    /// Handle to the shared processed-file counter.
    fn processed(&self) -> ProcessedCounter;

    /// Process one settled file.
    ///
    /// Called from the consumer worker after the stability wait; the path
    /// exists at call time. An `Err` means the file was not processed and
    /// the watcher's failure policy applies.
    fn process(&mut self, path: &Path) -> Result<(), HandlerError>;
}
