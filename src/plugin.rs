//! Runtime loading of handler plugins.
//!
//! Plugins are dynamic libraries that extend the handler-type registry.
//! Each library exports a registration entry point whose sole contract is
//! to call [`HandlerFactory::register`] for every handler type it
//! provides:
//!
//! ```ignore
//! use conveyor::HandlerFactory;
//!
//! #[unsafe(no_mangle)]
//! pub fn conveyor_register(factory: &mut HandlerFactory) {
//!     factory
//!         .register("csv", Box::new(|config| CsvHandler::from_config(config)))
//!         .expect("register csv handler");
//! }
//! ```
//!
//! The entry point uses the Rust ABI: plugins must be built with the same
//! compiler and the same `conveyor` version as the host binary.
//!
//! [`HandlerFactory::register`]: crate::factory::HandlerFactory::register

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use thiserror::Error;

use crate::factory::HandlerFactory;

/// Symbol every plugin library must export.
pub const REGISTER_SYMBOL: &[u8] = b"conveyor_register";

type RegisterFn = unsafe extern "Rust" fn(&mut HandlerFactory);

/// Errors from plugin resolution and loading.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("No plugins were given to load")]
    Empty,

    #[error("Failed to load plugin '{name}' from {path}: {source}")]
    Load {
        name: String,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Plugin '{name}' does not export 'conveyor_register': {source}")]
    MissingEntryPoint {
        name: String,
        #[source]
        source: libloading::Error,
    },
}

/// Loads plugin libraries and keeps them alive for the process lifetime.
///
/// Unloading a library while handler constructors registered from it are
/// still reachable would leave dangling function pointers, so loaded
/// libraries are never dropped before the loader itself.
pub struct PluginLoader {
    plugin_dir: PathBuf,
    libraries: Vec<Library>,
}

impl PluginLoader {
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            libraries: Vec::new(),
        }
    }

    /// Load every named plugin and run its registration entry point.
    ///
    /// An empty list is rejected: invoking the loader with nothing to
    /// load is treated as a configuration error, not a silent no-op. The
    /// first failure aborts the remaining list; types registered by
    /// earlier plugins stay visible in the factory, and the caller must
    /// treat that partial state as inconsistent.
    pub fn load(
        &mut self,
        factory: &mut HandlerFactory,
        names: &[String],
    ) -> Result<(), PluginError> {
        if names.is_empty() {
            return Err(PluginError::Empty);
        }

        for name in names {
            self.load_one(factory, name)?;
        }
        Ok(())
    }

    /// Number of libraries loaded so far.
    pub fn loaded_count(&self) -> usize {
        self.libraries.len()
    }

    fn load_one(&mut self, factory: &mut HandlerFactory, name: &str) -> Result<(), PluginError> {
        let path = self.resolve(name);

        // SAFETY: loading a library runs its initializers; the plugin
        // contract limits those to the registration entry point below.
        let library = unsafe { Library::new(&path) }.map_err(|source| PluginError::Load {
            name: name.to_string(),
            path: path.clone(),
            source,
        })?;

        {
            // SAFETY: the symbol type matches the documented plugin ABI,
            // enforced by building plugins against this crate.
            let register: Symbol<RegisterFn> = unsafe { library.get(REGISTER_SYMBOL) }.map_err(
                |source| PluginError::MissingEntryPoint {
                    name: name.to_string(),
                    source,
                },
            )?;

            // SAFETY: same contract as above; the factory reference is
            // exclusive for the duration of the call.
            unsafe { register(factory) };
        }

        crate::log_event!("plugin", "loaded", "{name} from {}", path.display());
        self.libraries.push(library);
        Ok(())
    }

    /// Resolve a plugin name to a library path.
    ///
    /// Names carrying a path separator or a library extension are used
    /// verbatim; bare names resolve inside the plugin directory using the
    /// platform naming convention (`libname.so`, `libname.dylib`,
    /// `name.dll`).
    fn resolve(&self, name: &str) -> PathBuf {
        let is_path = name.contains(std::path::MAIN_SEPARATOR)
            || Path::new(name).extension().is_some();
        if is_path {
            PathBuf::from(name)
        } else {
            self.plugin_dir.join(format!(
                "{}{}{}",
                std::env::consts::DLL_PREFIX,
                name,
                std::env::consts::DLL_SUFFIX
            ))
        }
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("plugin_dir", &self.plugin_dir)
            .field("loaded", &self.libraries.len())
            .finish()
    }
}
