//! Watcher lifecycle: one source directory, one handler, one consumer,
//! one directory monitor.

use std::fs;
use std::path::PathBuf;

use crossbeam_channel::{Sender, bounded};
use thiserror::Error;
use walkdir::WalkDir;

use crate::config::{QueueConfig, StabilityConfig, WatcherConfig};
use crate::consumer::{Consumer, ConsumerError, FailureSlot};
use crate::factory::{FactoryError, HandlerFactory};
use crate::handler::ProcessedCounter;
use crate::monitor::{DirectoryMonitor, FileEvent, FileEventKind, MonitorError, NotifyMonitor, WorkItem};

/// Errors from watcher construction and lifecycle.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to build handler for watcher '{watcher}': {source}")]
    Handler {
        watcher: String,
        #[source]
        source: FactoryError,
    },

    #[error("Failed to prepare directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),
}

/// Binds a directory monitor, a factory-built handler, and a consumer for
/// one watched directory.
///
/// The monitor pushes created-file events into the bounded queue; the
/// consumer drains it on its own worker thread. The two lifecycles move
/// in lockstep: the monitor starts first (events queue while the
/// consumer comes up), and the consumer is stopped and joined before the
/// watcher counts as fully stopped.
impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub struct Watcher {
    config: WatcherConfig,
    monitor: Box<dyn DirectoryMonitor>,
    consumer: Consumer,
    queue_tx: Sender<WorkItem>,
    processed: ProcessedCounter,
}

impl Watcher {
    /// Build a watcher from its configuration.
    ///
    /// Creates the handler through the factory, ensures the source and
    /// destination directories exist, and wires the queue. The watcher
    /// starts in the stopped state.
    pub fn new(
        config: WatcherConfig,
        factory: &HandlerFactory,
        failure: FailureSlot,
        queue: &QueueConfig,
        stability: &StabilityConfig,
    ) -> Result<Self, WatcherError> {
        let handler = factory
            .create(&config)
            .map_err(|source| WatcherError::Handler {
                watcher: config.name.clone(),
                source,
            })?;

        ensure_dir(&config.source)?;
        if let Some(destination) = handler.destination() {
            ensure_dir(destination)?;
        }

        let processed = handler.processed();
        let (tx, rx) = bounded(queue.capacity);

        let mut monitor: Box<dyn DirectoryMonitor> = Box::new(NotifyMonitor::new());
        monitor.schedule(tx.clone(), &config.source, config.recursive);

        let consumer = Consumer::new(
            config.name.clone(),
            tx.clone(),
            rx,
            handler,
            failure,
            stability.clone(),
        );

        Ok(Self {
            config,
            monitor,
            consumer,
            queue_tx: tx,
            processed,
        })
    }

    /// Start the monitor and the consumer. Idempotent.
    ///
    /// With `scan_on_start` set, files already present in the source
    /// directory are enqueued once both sides are up, ahead of any
    /// backlog the live monitor delivers.
    pub fn start(&mut self) -> Result<(), WatcherError> {
        if self.is_running() {
            return Ok(());
        }

        self.monitor.start()?;
        self.consumer.start()?;

        if self.config.scan_on_start {
            self.scan_existing();
        }

        crate::log_event!("watcher", "started", "{}", self.config.name);
        Ok(())
    }

    /// Stop the monitor, then request the consumer to stop. Idempotent.
    pub fn stop(&mut self) {
        self.monitor.stop();
        self.consumer.stop();
    }

    /// Wait for in-flight processing to drain.
    pub fn join(&mut self) {
        self.consumer.join();
        self.monitor.join();
    }

    /// Whether the consumer worker is accepting events.
    pub fn is_running(&self) -> bool {
        self.consumer.is_running()
    }

    /// Watcher name (the engine registry key).
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The configuration this watcher was built from.
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Files processed successfully since construction.
    pub fn files_processed(&self) -> u64 {
        self.processed.get()
    }

    /// Enqueue files already present under the source root.
    fn scan_existing(&self) {
        let walker = if self.config.recursive {
            WalkDir::new(&self.config.source)
        } else {
            WalkDir::new(&self.config.source).max_depth(1)
        };

        let mut found = 0usize;
        for entry in walker.into_iter().filter_map(|entry| entry.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let item = WorkItem::Event(FileEvent {
                path: entry.path().to_path_buf(),
                kind: FileEventKind::Created,
            });
            if self.queue_tx.send(item).is_err() {
                break;
            }
            found += 1;
        }

        if found > 0 {
            crate::log_event!("watcher", "scan enqueued", "{found} existing files");
        }
    }
}

fn ensure_dir(path: &std::path::Path) -> Result<(), WatcherError> {
    fs::create_dir_all(path).map_err(|source| WatcherError::Prepare {
        path: path.to_path_buf(),
        source,
    })
}
