//! Engine owning the handler registry and the named watchers.
//!
//! The engine is driven from a single control thread (a CLI loop or an
//! embedding application); it manipulates the in-memory watcher registry
//! and provides no synchronization for concurrent external callers. All
//! consumers share one failure callback, late-bound through
//! [`set_failure_callback`].
//!
//! [`set_failure_callback`]: Engine::set_failure_callback

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::config::{Settings, WatcherConfig};
use crate::consumer::{FailureCallback, FailureSlot};
use crate::factory::HandlerFactory;
use crate::plugin::{PluginError, PluginLoader};
use crate::watcher::{Watcher, WatcherError};

/// Errors from engine registry operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Watcher '{0}' is not registered")]
    UnknownWatcher(String),

    #[error("Watcher '{0}' already exists")]
    DuplicateWatcher(String),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Creates, starts, stops, and destroys named watchers.
pub struct Engine {
    settings: Settings,
    factory: HandlerFactory,
    loader: PluginLoader,
    watchers: HashMap<String, Watcher>,
    failure: FailureSlot,
}

impl Engine {
    /// Build an engine from settings.
    ///
    /// Seeds the factory with the built-in handler types and loads the
    /// configured plugins. No watchers are created yet; see [`startup`].
    ///
    /// [`startup`]: Engine::startup
    pub fn new(settings: Settings) -> Result<Self, EngineError> {
        let mut factory = HandlerFactory::with_builtins();
        let mut loader = PluginLoader::new(settings.plugin_dir.clone());

        if !settings.plugins.is_empty() {
            loader.load(&mut factory, &settings.plugins)?;
        }

        Ok(Self {
            settings,
            factory,
            loader,
            watchers: HashMap::new(),
            failure: Arc::new(RwLock::new(None)),
        })
    }

    /// Install the callback all consumers use to escalate fatal handler
    /// failures. May be wired any time after construction; a consumer
    /// that needs it earlier logs a configuration error instead.
    pub fn set_failure_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        let callback: FailureCallback = Arc::new(callback);
        *self.failure.write() = Some(callback);
    }

    /// Construct and register a watcher without starting it.
    pub fn create_watcher(&mut self, config: WatcherConfig) -> Result<(), EngineError> {
        if self.watchers.contains_key(&config.name) {
            return Err(EngineError::DuplicateWatcher(config.name));
        }

        let name = config.name.clone();
        let watcher = Watcher::new(
            config,
            &self.factory,
            Arc::clone(&self.failure),
            &self.settings.queue,
            &self.settings.stability,
        )?;

        self.watchers.insert(name.clone(), watcher);
        crate::debug_event!("engine", "created watcher", "{name}");
        Ok(())
    }

    /// Stop, join, and remove a watcher.
    pub fn delete_watcher(&mut self, name: &str) -> Result<(), EngineError> {
        let mut watcher = self
            .watchers
            .remove(name)
            .ok_or_else(|| EngineError::UnknownWatcher(name.to_string()))?;

        watcher.stop();
        watcher.join();
        crate::log_event!("engine", "deleted watcher", "{name}");
        Ok(())
    }

    /// Start a registered watcher.
    pub fn start_watcher(&mut self, name: &str) -> Result<(), EngineError> {
        let watcher = self
            .watchers
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownWatcher(name.to_string()))?;
        watcher.start()?;
        Ok(())
    }

    /// Stop a registered watcher and wait for it to drain.
    pub fn stop_watcher(&mut self, name: &str) -> Result<(), EngineError> {
        let watcher = self
            .watchers
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownWatcher(name.to_string()))?;
        watcher.stop();
        watcher.join();
        Ok(())
    }

    /// Create and start a watcher for every configuration entry.
    ///
    /// The first construction or start failure propagates; the caller
    /// decides whether partial startup is fatal.
    pub fn startup(&mut self) -> Result<(), EngineError> {
        let configs = self.settings.watchers.clone();
        for config in configs {
            let name = config.name.clone();
            self.create_watcher(config)?;
            self.start_watcher(&name)?;
        }

        crate::log_event!("engine", "started", "{} watchers", self.watchers.len());
        Ok(())
    }

    /// Stop and join every watcher, then clear the registry.
    pub fn shutdown(&mut self) {
        for watcher in self.watchers.values_mut() {
            watcher.stop();
        }
        for watcher in self.watchers.values_mut() {
            watcher.join();
        }
        self.watchers.clear();
        crate::log_event!("engine", "shut down");
    }

    /// Registered watcher names, sorted.
    pub fn watcher_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.watchers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Whether the named watcher's consumer is accepting events.
    pub fn is_running(&self, name: &str) -> Result<bool, EngineError> {
        self.watchers
            .get(name)
            .map(Watcher::is_running)
            .ok_or_else(|| EngineError::UnknownWatcher(name.to_string()))
    }

    /// Files processed successfully by the named watcher.
    pub fn files_processed(&self, name: &str) -> Result<u64, EngineError> {
        self.watchers
            .get(name)
            .map(Watcher::files_processed)
            .ok_or_else(|| EngineError::UnknownWatcher(name.to_string()))
    }

    /// Handler types currently registered, built-ins and plugins alike.
    pub fn handler_types(&self) -> Vec<String> {
        self.factory.list()
    }

    /// Number of plugin libraries loaded at construction.
    pub fn loaded_plugins(&self) -> usize {
        self.loader.loaded_count()
    }

    /// The handler registry, for embedders registering types directly.
    pub fn factory_mut(&mut self) -> &mut HandlerFactory {
        &mut self.factory
    }

    /// The effective settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
