//! Handler that copies arrived files into a destination directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::WatcherConfig;
use crate::handler::{FileHandler, HandlerError, ProcessedCounter};

/// Copies each detected file into the configured destination.
///
/// For recursive watchers the path relative to the source root is
/// preserved, so `src/a/b.txt` lands at `dest/a/b.txt`. An existing file
/// at the target path is overwritten.
pub struct CopyHandler {
    config: WatcherConfig,
    destination: PathBuf,
    processed: ProcessedCounter,
}

impl CopyHandler {
    /// Build from a watcher configuration. `destination` is mandatory.
    pub fn from_config(config: &WatcherConfig) -> Result<Box<dyn FileHandler>, HandlerError> {
        let destination = config
            .destination
            .clone()
            .ok_or_else(|| HandlerError::MissingOption {
                watcher: config.name.clone(),
                handler_type: config.handler_type.clone(),
                option: "destination".to_string(),
            })?;

        Ok(Box::new(Self {
            config: config.clone(),
            destination,
            processed: ProcessedCounter::new(),
        }))
    }

    /// Target path for a source file, preserving the source-relative part.
    fn target_for(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.config.source) {
            Ok(relative) => self.destination.join(relative),
            // Event path outside the source root (symlinked delivery,
            // absolute/relative mismatch): fall back to the file name.
            Err(_) => match path.file_name() {
                Some(name) => self.destination.join(name),
                None => self.destination.clone(),
            },
        }
    }
}

impl FileHandler for CopyHandler {
    fn name(&self) -> &str {
        "copy"
    }

    fn config(&self) -> &WatcherConfig {
        &self.config
    }

    fn destination(&self) -> Option<&Path> {
        Some(&self.destination)
    }

    fn processed(&self) -> ProcessedCounter {
        self.processed.clone()
    }

    fn process(&mut self, path: &Path) -> Result<(), HandlerError> {
        let target = self.target_for(path);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| HandlerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let bytes = fs::copy(path, &target).map_err(|source| HandlerError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        crate::log_event!("copy", "copied", "{} -> {} ({bytes} bytes)", path.display(), target.display());
        Ok(())
    }
}
