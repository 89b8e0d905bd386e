//! Error types for the execution sandbox and telemetry engine
//!
//! Most failures in this crate never reach a caller as an error: sandboxed
//! program failures and backend hiccups are folded into an `ExecutionResult`,
//! and malformed telemetry degrades to "insufficient data". The types here cover
//! what is left: configuration problems, invalid input rejected up front, and
//! the raw backend failures the sandbox runner converts at its boundary.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum JamError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<std::io::Error> for JamError {
    fn from(err: std::io::Error) -> Self {
        JamError::IoError(err.to_string())
    }
}

impl From<serde_yaml::Error> for JamError {
    fn from(err: serde_yaml::Error) -> Self {
        JamError::ConfigError(err.to_string())
    }
}

// Specific error for sandbox backends
#[derive(Error, Debug)]
pub enum SandboxBackendError {
    #[error("Container engine error: {0}")]
    EngineError(#[from] bollard::errors::Error),
    #[error("I/O error during sandbox operation: {0}")]
    IoError(#[from] std::io::Error),
    #[error("UTF-8 decoding error from slice: {0}")]
    StrUtf8Error(#[from] std::str::Utf8Error),
    #[error("Could not spawn '{binary}': {message}")]
    SpawnError { binary: String, message: String },
    #[error("Could not prepare sandbox workspace: {0}")]
    WorkspaceError(String),
    #[error("Container wait stream ended unexpectedly")]
    WaitStreamEnded,
    #[error("No usable execution backend")]
    Unavailable,
}
