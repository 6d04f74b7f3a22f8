//! Handler type registry.
//!
//! Maps handler type names to constructor functions so watcher
//! configuration stays decoupled from concrete handler implementations.
//! The registry is explicit state owned by the engine: created empty (or
//! seeded with built-ins), mutated only through `register`/`unregister`,
//! and fully reset via `clear`.

use std::collections::HashMap;

use thiserror::Error;

use crate::config::WatcherConfig;
use crate::handler::{FileHandler, HandlerError};
use crate::handlers;

/// Constructor function registered for a handler type.
pub type HandlerConstructor =
    Box<dyn Fn(&WatcherConfig) -> Result<Box<dyn FileHandler>, HandlerError> + Send + Sync>;

/// Errors from registry operations.
#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("Handler type name must not be empty")]
    EmptyTypeName,

    #[error("Handler type '{0}' is not registered")]
    NotRegistered(String),

    #[error("Unknown handler type '{handler_type}' for watcher '{watcher}'")]
    UnknownType { watcher: String, handler_type: String },

    /// Constructor errors pass through unwrapped; bad configuration is the
    /// constructor's responsibility.
    #[error(transparent)]
    Constructor(#[from] HandlerError),
}

/// Registry mapping handler type names to constructors.
pub struct HandlerFactory {
    constructors: HashMap<String, HandlerConstructor>,
}

impl HandlerFactory {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Create a registry seeded with the built-in handler types.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        handlers::register_builtins(&mut factory);
        factory
    }

    /// Register a constructor under a type name.
    ///
    /// Re-registering an existing name overwrites silently; the last
    /// registration wins.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        constructor: HandlerConstructor,
    ) -> Result<(), FactoryError> {
        let type_name = type_name.into();
        if type_name.is_empty() {
            return Err(FactoryError::EmptyTypeName);
        }

        if self.constructors.insert(type_name.clone(), constructor).is_some() {
            crate::debug_event!("factory", "overwrote registration", "{type_name}");
        }
        Ok(())
    }

    /// Remove a registered type.
    pub fn unregister(&mut self, type_name: &str) -> Result<(), FactoryError> {
        self.constructors
            .remove(type_name)
            .map(|_| ())
            .ok_or_else(|| FactoryError::NotRegistered(type_name.to_string()))
    }

    /// Build a handler for the given watcher configuration.
    pub fn create(&self, config: &WatcherConfig) -> Result<Box<dyn FileHandler>, FactoryError> {
        let constructor =
            self.constructors
                .get(&config.handler_type)
                .ok_or_else(|| FactoryError::UnknownType {
                    watcher: config.name.clone(),
                    handler_type: config.handler_type.clone(),
                })?;

        Ok(constructor(config)?)
    }

    /// Whether a type name is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove every registration.
    pub fn clear(&mut self) {
        self.constructors.clear();
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl Default for HandlerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFactory")
            .field("types", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ProcessedCounter;
    use std::path::Path;

    struct NullHandler {
        config: WatcherConfig,
        processed: ProcessedCounter,
    }

    impl FileHandler for NullHandler {
        fn name(&self) -> &str {
            "null"
        }

        fn config(&self) -> &WatcherConfig {
            &self.config
        }

        fn processed(&self) -> ProcessedCounter {
            self.processed.clone()
        }

        fn process(&mut self, _path: &Path) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn null_constructor() -> HandlerConstructor {
        Box::new(|config| {
            Ok(Box::new(NullHandler {
                config: config.clone(),
                processed: ProcessedCounter::new(),
            }))
        })
    }

    #[test]
    fn test_register_and_create() {
        let mut factory = HandlerFactory::new();
        factory.register("null", null_constructor()).unwrap();

        let config = WatcherConfig::new("w", "null", "/tmp/src");
        let handler = factory.create(&config).unwrap();
        assert_eq!(handler.name(), "null");
    }

    #[test]
    fn test_empty_type_name_rejected() {
        let mut factory = HandlerFactory::new();
        let result = factory.register("", null_constructor());
        assert!(matches!(result, Err(FactoryError::EmptyTypeName)));
    }

    #[test]
    fn test_create_unknown_type() {
        let factory = HandlerFactory::new();
        let config = WatcherConfig::new("w", "missing", "/tmp/src");
        let result = factory.create(&config);
        assert!(matches!(
            result,
            Err(FactoryError::UnknownType { ref handler_type, .. }) if handler_type == "missing"
        ));
    }

    #[test]
    fn test_unregister_absent_type() {
        let mut factory = HandlerFactory::new();
        let result = factory.unregister("missing");
        assert!(matches!(result, Err(FactoryError::NotRegistered(_))));
    }

    #[test]
    fn test_reregistration_overwrites() {
        struct Marker {
            config: WatcherConfig,
            processed: ProcessedCounter,
            tag: &'static str,
        }

        impl FileHandler for Marker {
            fn name(&self) -> &str {
                self.tag
            }
            fn config(&self) -> &WatcherConfig {
                &self.config
            }
            fn processed(&self) -> ProcessedCounter {
                self.processed.clone()
            }
            fn process(&mut self, _path: &Path) -> Result<(), HandlerError> {
                Ok(())
            }
        }

        fn marker(tag: &'static str) -> HandlerConstructor {
            Box::new(move |config| {
                Ok(Box::new(Marker {
                    config: config.clone(),
                    processed: ProcessedCounter::new(),
                    tag,
                }))
            })
        }

        let mut factory = HandlerFactory::new();
        factory.register("x", marker("first")).unwrap();
        factory.register("x", marker("second")).unwrap();
        assert_eq!(factory.len(), 1);

        let config = WatcherConfig::new("w", "x", "/tmp/src");
        let handler = factory.create(&config).unwrap();
        assert_eq!(handler.name(), "second");
    }

    #[test]
    fn test_clear_and_list() {
        let mut factory = HandlerFactory::new();
        factory.register("b", null_constructor()).unwrap();
        factory.register("a", null_constructor()).unwrap();

        assert_eq!(factory.list(), vec!["a".to_string(), "b".to_string()]);

        factory.clear();
        assert!(factory.is_empty());
        assert!(factory.list().is_empty());
    }

    #[test]
    fn test_builtins_present() {
        let factory = HandlerFactory::with_builtins();
        assert!(factory.contains("copy"));
        assert!(factory.contains("log"));
    }
}
