//! Configuration loader for YAML files and environment overrides

use crate::config::types::*;
use crate::errors::JamError;
use std::env;
use std::path::Path;
use tokio::fs;

pub const ENV_TIMEOUT: &str = "JAM_DOCKER_TIMEOUT";
pub const ENV_MEMORY_LIMIT: &str = "JAM_DOCKER_MEMORY_LIMIT";
pub const ENV_CPU_LIMIT: &str = "JAM_DOCKER_CPU_LIMIT";
pub const ENV_MAX_CONCURRENT: &str = "JAM_MAX_CONCURRENT_EXECUTIONS";
pub const ENV_DOCKER_HOST: &str = "DOCKER_HOST";

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<JamConfig, JamError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            JamError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load from `path` when it exists, otherwise start from defaults.
    /// Environment overrides and validation apply either way.
    pub async fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<JamConfig, JamError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            return Self::from_file(path).await;
        }
        log::info!(
            "No configuration file at {}, using defaults",
            path.display()
        );
        let mut config = JamConfig::default();
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<JamConfig, JamError> {
        let mut config: JamConfig = if content.trim().is_empty() {
            JamConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                JamError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Environment variables win over file values
    pub fn apply_env_overrides(config: &mut JamConfig) -> Result<(), JamError> {
        if let Some(value) = read_env(ENV_TIMEOUT) {
            config.sandbox.timeout_seconds = value.parse().map_err(|e| {
                JamError::ConfigError(format!("Invalid {} '{}': {}", ENV_TIMEOUT, value, e))
            })?;
        }
        if let Some(value) = read_env(ENV_MEMORY_LIMIT) {
            config.sandbox.memory_limit = value;
        }
        if let Some(value) = read_env(ENV_CPU_LIMIT) {
            config.sandbox.cpu_limit = value.parse().map_err(|e| {
                JamError::ConfigError(format!("Invalid {} '{}': {}", ENV_CPU_LIMIT, value, e))
            })?;
        }
        if let Some(value) = read_env(ENV_MAX_CONCURRENT) {
            config.sandbox.max_concurrent_executions = value.parse().map_err(|e| {
                JamError::ConfigError(format!(
                    "Invalid {} '{}': {}",
                    ENV_MAX_CONCURRENT, value, e
                ))
            })?;
        }
        if config.sandbox.docker_host.is_none() {
            config.sandbox.docker_host = read_env(ENV_DOCKER_HOST);
        }
        Ok(())
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
