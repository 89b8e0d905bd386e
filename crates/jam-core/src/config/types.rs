//! Configuration type definitions
//!
//! Defaults mirror the limits the interview service has always run with: ten
//! seconds of wall clock, 128 MiB of memory and 80% of one core per execution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::JamError;
use crate::executors::Language;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JamConfig {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub anti_cheat: AntiCheatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Wall-clock limit for a single container run
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Docker-style memory size such as `128m` or `1g`
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,
    /// Fraction of one CPU core
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
    /// Per-language image overrides
    #[serde(default)]
    pub images: HashMap<Language, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            memory_limit: default_memory_limit(),
            cpu_limit: default_cpu_limit(),
            max_concurrent_executions: default_max_concurrent_executions(),
            docker_host: None,
            docker_binary: default_docker_binary(),
            images: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCheatConfig {
    /// Idle sessions older than this are evicted by the sweeper
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    /// How long a finished session stays queryable
    #[serde(default = "default_finished_retention_seconds")]
    pub finished_retention_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: default_session_ttl_seconds(),
            finished_retention_seconds: default_finished_retention_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl JamConfig {
    pub fn validate(&self) -> Result<(), JamError> {
        self.sandbox.validate()?;
        self.anti_cheat.validate()
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<(), JamError> {
        if self.timeout_seconds == 0 {
            return Err(JamError::ValidationError(
                "sandbox.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.cpu_limit.is_nan() || self.cpu_limit <= 0.0 {
            return Err(JamError::ValidationError(format!(
                "sandbox.cpu_limit must be positive, got {}",
                self.cpu_limit
            )));
        }
        if self.max_concurrent_executions == 0 {
            return Err(JamError::ValidationError(
                "sandbox.max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        if self.docker_binary.trim().is_empty() {
            return Err(JamError::ValidationError(
                "sandbox.docker_binary must not be empty".to_string(),
            ));
        }
        crate::executors::limits::parse_memory_limit(&self.memory_limit)?;
        Ok(())
    }
}

impl AntiCheatConfig {
    pub fn validate(&self) -> Result<(), JamError> {
        if self.session_ttl_seconds == 0 {
            return Err(JamError::ValidationError(
                "anti_cheat.session_ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(JamError::ValidationError(
                "anti_cheat.sweep_interval_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_memory_limit() -> String {
    "128m".to_string()
}

fn default_cpu_limit() -> f64 {
    0.8
}

fn default_max_concurrent_executions() -> usize {
    4
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_session_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_finished_retention_seconds() -> u64 {
    60 * 60
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}
