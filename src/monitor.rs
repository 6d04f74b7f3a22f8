//! Directory change monitoring.
//!
//! The [`DirectoryMonitor`] trait is the boundary to the OS notification
//! service; [`NotifyMonitor`] implements it over
//! `notify::RecommendedWatcher`. The adapter's only job is to push
//! created-file events into the scheduled sink. Delivery is asynchronous
//! on the backend's threads and never blocks on handler execution.

use std::path::{Path, PathBuf};

use crossbeam_channel::{Sender, TrySendError};
use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use thiserror::Error;

/// Kind of filesystem change, reduced to what the pipeline cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

/// A single filesystem notification.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Element of a consumer queue: an event, or the stop sentinel used to
/// unblock a worker parked on `recv()`.
#[derive(Debug)]
pub enum WorkItem {
    Event(FileEvent),
    Shutdown,
}

/// Errors from monitor scheduling and startup.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Monitor started before a path was scheduled")]
    NotScheduled,

    #[error("Cannot watch path {path}: {source}")]
    WatchFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error(transparent)]
    Backend(#[from] notify::Error),
}

/// Capability contract for the directory-change service.
pub trait DirectoryMonitor: Send {
    /// Record the sink and root path to watch. Does not start watching.
    fn schedule(&mut self, sink: Sender<WorkItem>, path: &Path, recursive: bool);

    /// Begin delivering events. Idempotent.
    fn start(&mut self) -> Result<(), MonitorError>;

    /// Stop delivering events. Idempotent.
    fn stop(&mut self);

    /// Wait for the backend to release its resources.
    fn join(&mut self);

    fn is_running(&self) -> bool;
}

/// `notify`-backed monitor.
///
/// Maps backend events to [`FileEventKind`] and forwards only `Created`
/// events; all other kinds are logged at debug level and dropped here,
/// before they ever reach the queue.
pub struct NotifyMonitor {
    scheduled: Option<Scheduled>,
    watcher: Option<RecommendedWatcher>,
}

struct Scheduled {
    sink: Sender<WorkItem>,
    path: PathBuf,
    mode: RecursiveMode,
}

impl NotifyMonitor {
    pub fn new() -> Self {
        Self {
            scheduled: None,
            watcher: None,
        }
    }

    fn forward(sink: &Sender<WorkItem>, event: notify::Event) {
        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Created,
            EventKind::Remove(_) => FileEventKind::Removed,
            EventKind::Modify(ModifyKind::Name(_)) => FileEventKind::Renamed,
            EventKind::Modify(_) => FileEventKind::Modified,
            // Access and catch-all kinds carry no arrival information
            _ => return,
        };

        for path in event.paths {
            if kind != FileEventKind::Created {
                crate::debug_event!("monitor", "dropped", "{kind:?} {}", path.display());
                continue;
            }

            let item = WorkItem::Event(FileEvent {
                path: path.clone(),
                kind,
            });
            match sink.try_send(item) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // Overflow: the event is lost until a rescan re-delivers it
                    tracing::warn!("[monitor] queue full, dropping event for {}", path.display());
                }
                Err(TrySendError::Disconnected(_)) => {
                    crate::debug_event!("monitor", "sink disconnected");
                }
            }
        }
    }
}

impl Default for NotifyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryMonitor for NotifyMonitor {
    fn schedule(&mut self, sink: Sender<WorkItem>, path: &Path, recursive: bool) {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        self.scheduled = Some(Scheduled {
            sink,
            path: path.to_path_buf(),
            mode,
        });
    }

    fn start(&mut self) -> Result<(), MonitorError> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let scheduled = self.scheduled.as_ref().ok_or(MonitorError::NotScheduled)?;
        let sink = scheduled.sink.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => Self::forward(&sink, event),
                Err(e) => tracing::error!("[monitor] backend error: {e}"),
            })?;

        watcher
            .watch(&scheduled.path, scheduled.mode)
            .map_err(|source| MonitorError::WatchFailed {
                path: scheduled.path.clone(),
                source,
            })?;

        crate::debug_event!("monitor", "watching", "{}", scheduled.path.display());
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Some(scheduled) = &self.scheduled
                && let Err(e) = watcher.unwatch(&scheduled.path)
            {
                crate::debug_event!("monitor", "unwatch failed", "{e}");
            }
            // Dropping the backend watcher stops its delivery threads
        }
    }

    fn join(&mut self) {
        // The notify backend joins its threads on drop; stop() already
        // released it.
    }

    fn is_running(&self) -> bool {
        self.watcher.is_some()
    }
}
