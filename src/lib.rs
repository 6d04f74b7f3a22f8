//! Directory watching and pluggable file dispatch engine.
//!
//! Watches configured directories for newly-arrived files and dispatches
//! each file to a handler selected by type name. Handlers are registered
//! in a factory, extensible at runtime through plugin libraries; every
//! watcher runs its own serialized consumer pipeline with per-watcher
//! FIFO ordering.

pub mod config;
pub mod consumer;
pub mod engine;
pub mod factory;
pub mod handler;
pub mod handlers;
pub mod logging;
pub mod monitor;
pub mod plugin;
pub mod watcher;

pub use config::{Settings, StabilityConfig, WatcherConfig};
pub use consumer::{Consumer, ConsumerError, FailureCallback};
pub use engine::{Engine, EngineError};
pub use factory::{FactoryError, HandlerConstructor, HandlerFactory};
pub use handler::{FileHandler, HandlerError, ProcessedCounter};
pub use monitor::{DirectoryMonitor, FileEvent, FileEventKind, NotifyMonitor, WorkItem};
pub use plugin::{PluginError, PluginLoader};
pub use watcher::{Watcher, WatcherError};
