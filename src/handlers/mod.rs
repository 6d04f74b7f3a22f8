//! Built-in handler implementations.

mod copy;
mod log;

pub use copy::CopyHandler;
pub use log::LogHandler;

use crate::factory::HandlerFactory;

/// Register the built-in handler types.
pub fn register_builtins(factory: &mut HandlerFactory) {
    factory
        .register("copy", Box::new(|config| CopyHandler::from_config(config)))
        .expect("built-in type name is non-empty");
    factory
        .register("log", Box::new(|config| LogHandler::from_config(config)))
        .expect("built-in type name is non-empty");
}
