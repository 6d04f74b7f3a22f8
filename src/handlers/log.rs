//! Handler that only announces arrivals.

use std::fs;
use std::path::Path;

use crate::config::WatcherConfig;
use crate::handler::{FileHandler, HandlerError, ProcessedCounter};

/// Logs each detected file and reports success.
///
/// Useful for smoke-testing a watcher definition before wiring a real
/// handler, and for exercising the policy flags in tests.
pub struct LogHandler {
    config: WatcherConfig,
    processed: ProcessedCounter,
}

impl LogHandler {
    pub fn from_config(config: &WatcherConfig) -> Result<Box<dyn FileHandler>, HandlerError> {
        Ok(Box::new(Self {
            config: config.clone(),
            processed: ProcessedCounter::new(),
        }))
    }
}

impl FileHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    fn config(&self) -> &WatcherConfig {
        &self.config
    }

    fn processed(&self) -> ProcessedCounter {
        self.processed.clone()
    }

    fn process(&mut self, path: &Path) -> Result<(), HandlerError> {
        let size = fs::metadata(path)
            .map(|meta| meta.len())
            .map_err(|source| HandlerError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        crate::log_event!("log", "arrived", "{} ({size} bytes)", path.display());
        Ok(())
    }
}
