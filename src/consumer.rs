//! Per-watcher serialized event processing.
//!
//! The consumer owns the receive side of a watcher's bounded event queue
//! and exactly one worker thread. The worker blocks on the queue, waits
//! for copy-completion stability, invokes the handler, and applies the
//! watcher's policy flags. Within one watcher, files are processed
//! strictly FIFO in arrival order; cancellation never interrupts an
//! in-flight handler call and takes effect at the next queue receive.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use thiserror::Error;

use crate::config::StabilityConfig;
use crate::handler::{FileHandler, HandlerError};
use crate::monitor::WorkItem;

/// Callback used by all consumers to escalate a fatal handler failure to
/// whoever drives the engine. Receives the watcher name.
pub type FailureCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Shared late-bound slot for the failure callback.
///
/// The callback may be wired after the engine (and its consumers) exist;
/// absence is surfaced when a consumer first needs to escalate.
pub type FailureSlot = Arc<RwLock<Option<FailureCallback>>>;

/// Errors from consumer lifecycle operations.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Failed to spawn worker thread for watcher '{watcher}': {source}")]
    Spawn {
        watcher: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Watcher '{0}' has no handler to run (worker thread was lost)")]
    HandlerUnavailable(String),
}

/// Outcome of the copy-completion stability wait.
#[derive(Debug, PartialEq, Eq)]
enum Stability {
    /// Two consecutive polls saw the same size and mtime.
    Settled,
    /// The file disappeared while waiting.
    Vanished,
    /// The file kept changing past the configured bound.
    TimedOut,
}

/// Serialized event-processing pipeline for one watcher.
pub struct Consumer {
    name: String,
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
    handler: Option<Box<dyn FileHandler>>,
    worker: Option<JoinHandle<Box<dyn FileHandler>>>,
    running: Arc<AtomicBool>,
    failure: FailureSlot,
    stability: StabilityConfig,
}

impl Consumer {
    /// Bind a queue, a handler, and the shared failure slot.
    pub fn new(
        name: impl Into<String>,
        tx: Sender<WorkItem>,
        rx: Receiver<WorkItem>,
        handler: Box<dyn FileHandler>,
        failure: FailureSlot,
        stability: StabilityConfig,
    ) -> Self {
        Self {
            name: name.into(),
            tx,
            rx,
            handler: Some(handler),
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
            failure,
            stability,
        }
    }

    /// Spawn the worker thread. Idempotent while running.
    ///
    /// A consumer stopped earlier (explicitly or through exit-on-failure)
    /// can be started again; the handler instance is carried over.
    pub fn start(&mut self) -> Result<(), ConsumerError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Recover the handler from a worker that stopped itself
        if self.worker.is_some() {
            self.join();
        }

        let handler = self
            .handler
            .take()
            .ok_or_else(|| ConsumerError::HandlerUnavailable(self.name.clone()))?;

        self.running.store(true, Ordering::SeqCst);

        let name = self.name.clone();
        let rx = self.rx.clone();
        let running = Arc::clone(&self.running);
        let failure = Arc::clone(&self.failure);
        let stability = self.stability.clone();

        let worker = thread::Builder::new()
            .name(format!("consumer-{}", self.name))
            .spawn(move || run_worker(name, rx, handler, running, failure, stability))
            .map_err(|source| {
                self.running.store(false, Ordering::SeqCst);
                ConsumerError::Spawn {
                    watcher: self.name.clone(),
                    source,
                }
            })?;

        self.worker = Some(worker);
        crate::debug_event!("consumer", "started", "{}", self.name);
        Ok(())
    }

    /// Request the worker to stop. Idempotent.
    ///
    /// Clears the running flag and pushes the shutdown sentinel so a
    /// worker parked on the queue wakes up. Does not wait; see [`join`].
    ///
    /// [`join`]: Consumer::join
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // A full queue means the worker is busy and will observe the flag
        // on its own; the sentinel only matters for a parked worker.
        let _ = self.tx.try_send(WorkItem::Shutdown);
        crate::debug_event!("consumer", "stop requested", "{}", self.name);
    }

    /// Wait for the worker to finish, then discard residual queued events.
    ///
    /// Stop is a hard cutoff: nothing queued at stop time is processed.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(handler) => self.handler = Some(handler),
                Err(_) => tracing::error!("[{}] worker thread panicked", self.name),
            }
        }

        while let Ok(item) = self.rx.try_recv() {
            if let WorkItem::Event(event) = item {
                crate::debug_event!("consumer", "discarded", "{}", event.path.display());
            }
        }
    }

    /// Whether the worker loop is accepting events.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn run_worker(
    name: String,
    rx: Receiver<WorkItem>,
    mut handler: Box<dyn FileHandler>,
    running: Arc<AtomicBool>,
    failure: FailureSlot,
    stability: StabilityConfig,
) -> Box<dyn FileHandler> {
    let counter = handler.processed();
    let delete_source = handler.config().delete_source;
    let exit_on_failure = handler.config().exit_on_failure;

    while running.load(Ordering::SeqCst) {
        let event = match rx.recv() {
            Ok(WorkItem::Event(event)) => event,
            Ok(WorkItem::Shutdown) => break,
            Err(_) => break, // all senders gone
        };

        // Events dequeued after a stop request are not processed
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let path = event.path;
        if !path.exists() {
            crate::debug_event!("consumer", "vanished before processing", "{}", path.display());
            continue;
        }

        let result = match wait_for_stability(&path, &stability) {
            Stability::Settled => handler.process(&path),
            Stability::Vanished => {
                crate::debug_event!("consumer", "vanished while settling", "{}", path.display());
                continue;
            }
            Stability::TimedOut => Err(HandlerError::Failed(format!(
                "{} did not settle within {}ms",
                path.display(),
                stability.max_wait_ms
            ))),
        };

        match result {
            Ok(()) => {
                counter.increment();
                crate::log_event!(name.as_str(), "processed", "{}", path.display());

                if delete_source && path.is_file() {
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!(
                            "[{name}] failed to delete source {}: {e}",
                            path.display()
                        );
                    }
                }
            }
            Err(e) => {
                tracing::error!("[{name}] processing failed for {}: {e}", path.display());

                if exit_on_failure {
                    let callback = failure.read().clone();
                    match callback {
                        Some(callback) => callback(&name),
                        None => tracing::error!(
                            "[{name}] failure escalation requested but no failure \
                             callback is configured"
                        ),
                    }
                    running.store(false, Ordering::SeqCst);
                    crate::log_event!(name.as_str(), "halted after failure");
                    break;
                }
            }
        }
    }

    handler
}

/// Poll (size, mtime) until two consecutive polls are unchanged.
///
/// The monitor fires on creation, which can precede the writer finishing
/// a large copy; processing a half-written file would hand the handler
/// corrupt input.
fn wait_for_stability(path: &Path, config: &StabilityConfig) -> Stability {
    let deadline = Instant::now() + config.max_wait();
    let mut last: Option<(u64, Option<SystemTime>)> = None;

    loop {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => return Stability::Vanished,
        };
        let signature = (meta.len(), meta.modified().ok());

        if last == Some(signature) {
            return Stability::Settled;
        }
        last = Some(signature);

        if Instant::now() >= deadline {
            return Stability::TimedOut;
        }
        thread::sleep(config.poll_interval());
    }
}
