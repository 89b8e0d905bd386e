//! Configuration for the sandbox and the anti-cheat engine
//!
//! Settings come from an optional YAML file, then environment overrides, then
//! validation. Every field has a default so an empty document is a valid
//! configuration.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::JamError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<JamConfig, JamError> {
    ConfigLoader::from_file(path).await
}
