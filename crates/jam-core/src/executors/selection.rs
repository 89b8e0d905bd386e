//! Startup selection of the execution backend.
//!
//! The engine API is tried first, then the engine CLI on PATH. The outcome is
//! a plain value that callers can log, expose on a health endpoint, or replace
//! with an injected backend in tests.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use which::which;

use super::cli::CliBackend;
use super::docker::{ping_with_timeout, DockerBackend};
use super::limits::LimitPolicy;
use super::SandboxBackend;
use crate::config::SandboxConfig;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStrategy {
    /// Native container-engine API client
    Engine,
    /// Engine command-line binary
    Cli,
    /// Nothing usable; every execution short-circuits
    Disabled,
}

impl fmt::Display for BackendStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendStrategy::Engine => "engine",
            BackendStrategy::Cli => "cli",
            BackendStrategy::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// The backend chosen at startup and why. Immutable once built.
#[derive(Clone)]
pub struct BackendSelection {
    strategy: BackendStrategy,
    reason: String,
    backend: Option<Arc<dyn SandboxBackend>>,
}

impl fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelection")
            .field("strategy", &self.strategy)
            .field("reason", &self.reason)
            .finish()
    }
}

impl BackendSelection {
    pub async fn probe(config: &SandboxConfig) -> Self {
        let limits = LimitPolicy::from_config(config);

        let engine_failure = match DockerBackend::connect(config.docker_host.as_deref(), limits.clone()) {
            Ok(backend) => match ping_with_timeout(&backend, PING_TIMEOUT).await {
                Ok(()) => {
                    log::info!("Container engine reachable, using the engine API backend");
                    return Self::with_backend(
                        Arc::new(backend),
                        "container engine responded to ping",
                    );
                }
                Err(e) => e,
            },
            Err(e) => e.to_string(),
        };
        log::warn!("Container engine unavailable via API: {}", engine_failure);

        match which(&config.docker_binary) {
            Ok(path) => {
                log::info!(
                    "Falling back to the {} CLI at {} ({})",
                    config.docker_binary,
                    path.display(),
                    engine_failure
                );
                Self::with_backend(
                    Arc::new(CliBackend::new(path, limits)),
                    format!("engine API unavailable ({}), CLI found", engine_failure),
                )
            }
            Err(e) => {
                log::error!(
                    "{} CLI is unavailable ({}). Code execution disabled.",
                    config.docker_binary,
                    e
                );
                Self::disabled(format!(
                    "engine API unavailable ({}) and {} CLI not found",
                    engine_failure, config.docker_binary
                ))
            }
        }
    }

    pub fn with_backend(backend: Arc<dyn SandboxBackend>, reason: impl Into<String>) -> Self {
        Self {
            strategy: backend.strategy(),
            reason: reason.into(),
            backend: Some(backend),
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            strategy: BackendStrategy::Disabled,
            reason: reason.into(),
            backend: None,
        }
    }

    pub fn strategy(&self) -> BackendStrategy {
        self.strategy
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<Arc<dyn SandboxBackend>> {
        self.backend.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SandboxBackendError;
    use crate::executors::{RawRunResult, SandboxInvocation};
    use async_trait::async_trait;

    struct NullBackend;

    #[async_trait]
    impl SandboxBackend for NullBackend {
        fn strategy(&self) -> BackendStrategy {
            BackendStrategy::Cli
        }

        async fn run(
            &self,
            _invocation: &SandboxInvocation,
        ) -> Result<RawRunResult, SandboxBackendError> {
            Ok(RawRunResult::default())
        }
    }

    #[test]
    fn test_strategy_comes_from_backend() {
        let selection = BackendSelection::with_backend(Arc::new(NullBackend), "injected");
        assert_eq!(selection.strategy(), BackendStrategy::Cli);
        assert!(selection.is_available());
        assert_eq!(selection.reason(), "injected");
    }

    #[test]
    fn test_disabled_has_no_backend() {
        let selection = BackendSelection::disabled("nothing installed");
        assert_eq!(selection.strategy(), BackendStrategy::Disabled);
        assert!(!selection.is_available());
        assert!(selection.backend().is_none());
        assert_eq!(selection.strategy().to_string(), "disabled");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_falls_back_to_cli_without_engine() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("docker");
        std::fs::write(&fake, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = SandboxConfig {
            docker_host: Some(format!("unix://{}/missing.sock", dir.path().display())),
            docker_binary: fake.display().to_string(),
            ..SandboxConfig::default()
        };

        let selection = BackendSelection::probe(&config).await;
        assert_eq!(selection.strategy(), BackendStrategy::Cli);
        assert!(selection.is_available());
        assert!(selection.reason().contains("CLI found"), "{}", selection.reason());
    }

    #[tokio::test]
    async fn test_probe_disables_without_engine_or_cli() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig {
            docker_host: Some(format!("unix://{}/missing.sock", dir.path().display())),
            docker_binary: dir.path().join("no-docker-here").display().to_string(),
            ..SandboxConfig::default()
        };

        let selection = BackendSelection::probe(&config).await;
        assert_eq!(selection.strategy(), BackendStrategy::Disabled);
        assert!(!selection.is_available());
    }
}
