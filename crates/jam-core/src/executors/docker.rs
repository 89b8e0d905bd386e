// src/executors/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    InspectContainerOptions as BollardInspectContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::default::Default;
use std::time::Duration;
use uuid::Uuid;

use super::languages::{pipe_input, CODE_MOUNT};
use super::limits::{LimitPolicy, CPU_PERIOD_MICROS};
use super::{BackendStrategy, RawRunResult, SandboxBackend, SandboxInvocation};
use crate::errors::SandboxBackendError;

const STDIN_FILE: &str = ".stdin";
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Runs each invocation in a fresh container through the engine API.
pub struct DockerBackend {
    docker: Docker,
    limits: LimitPolicy,
}

impl DockerBackend {
    /// Only `unix://` hosts are honoured; any other scheme falls back to the
    /// local default socket.
    pub fn connect(
        docker_host: Option<&str>,
        limits: LimitPolicy,
    ) -> Result<Self, SandboxBackendError> {
        let docker = match docker_host {
            Some(host) if host.starts_with("unix://") => {
                log::info!("Connecting to container engine via {}", host);
                Docker::connect_with_unix(host, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
            }
            Some(host) => {
                log::warn!(
                    "Unsupported DOCKER_HOST '{}', using the local default socket",
                    host
                );
                Docker::connect_with_local_defaults()?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { docker, limits })
    }

    pub async fn ping(&self) -> Result<(), SandboxBackendError> {
        self.docker.ping().await?;
        Ok(())
    }

    pub fn limits(&self) -> &LimitPolicy {
        &self.limits
    }

    fn container_config(
        &self,
        image: &str,
        command: Vec<String>,
        host_dir: &str,
    ) -> Result<ContainerCreateBody, SandboxBackendError> {
        let memory = self
            .limits
            .memory_bytes()
            .map_err(|e| SandboxBackendError::WorkspaceError(e.to_string()))?;

        Ok(ContainerCreateBody {
            image: Some(image.to_string()),
            cmd: Some(command),
            working_dir: Some(CODE_MOUNT.to_string()),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:{}:rw", host_dir, CODE_MOUNT)]),
                // removed explicitly after logs and exit state are collected
                auto_remove: Some(false),
                memory: Some(memory),
                cpu_quota: Some(self.limits.cpu_quota()),
                cpu_period: Some(CPU_PERIOD_MICROS),
                network_mode: Some("none".to_string()),
                ..Default::default()
            }),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        })
    }

    async fn run_container(
        &self,
        container_id: &str,
    ) -> Result<RawRunResult, SandboxBackendError> {
        self.docker
            .start_container(container_id, None::<BollardStartContainerOptionsQuery>)
            .await?;

        let mut wait_stream = self
            .docker
            .wait_container(container_id, None::<BollardWaitContainerOptionsQuery>);
        let timeout_future = tokio::time::sleep(self.limits.timeout);

        let wait_outcome = tokio::select! {
            res = wait_stream.next() => res,
            _ = timeout_future => {
                log::warn!("Execution timed out for container {}", container_id);
                return Ok(RawRunResult {
                    stderr: format!("Execution timed out after {}s", self.limits.timeout.as_secs()),
                    timed_out: true,
                    ..Default::default()
                });
            }
        };

        // The engine reports a non-zero exit through the error variant.
        let exit_code = match wait_outcome {
            Some(Ok(response)) => response.status_code,
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(SandboxBackendError::EngineError(e)),
            None => return Err(SandboxBackendError::WaitStreamEnded),
        };

        let (stdout, stderr) = self.collect_logs(container_id).await?;
        let oom_killed = self.was_oom_killed(container_id).await;

        Ok(RawRunResult {
            stdout,
            stderr,
            exit_code: Some(exit_code),
            timed_out: false,
            oom_killed,
        })
    }

    /// Returns the interleaved stdout/stderr stream and stderr on its own.
    async fn collect_logs(
        &self,
        container_id: &str,
    ) -> Result<(String, String), SandboxBackendError> {
        let mut output_stream = self.docker.logs(
            container_id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut combined = String::new();
        let mut stderr = String::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    combined.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { message } => {
                    let text = String::from_utf8_lossy(&message);
                    combined.push_str(&text);
                    stderr.push_str(&text);
                }
                _ => {}
            }
        }
        Ok((combined, stderr))
    }

    async fn was_oom_killed(&self, container_id: &str) -> bool {
        match self
            .docker
            .inspect_container(container_id, None::<BollardInspectContainerOptionsQuery>)
            .await
        {
            Ok(details) => details
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(e) => {
                log::debug!("Could not inspect container {}: {}", container_id, e);
                false
            }
        }
    }

    async fn remove_container(&self, container_id: &str) {
        let options = BollardRemoveContainerOptionsQuery {
            force: true,
            ..Default::default()
        };
        if let Err(e) = self
            .docker
            .remove_container(container_id, Some(options))
            .await
        {
            log::debug!("Failed to remove container {}: {}", container_id, e);
        }
    }
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    fn strategy(&self) -> BackendStrategy {
        BackendStrategy::Engine
    }

    async fn run(
        &self,
        invocation: &SandboxInvocation,
    ) -> Result<RawRunResult, SandboxBackendError> {
        let host_dir = invocation
            .host_dir
            .to_str()
            .ok_or_else(|| {
                SandboxBackendError::WorkspaceError("Invalid host directory path".to_string())
            })?
            .to_string();

        if let Some(stdin) = &invocation.stdin {
            tokio::fs::write(invocation.host_dir.join(STDIN_FILE), stdin).await?;
        }
        let command = container_command(invocation);

        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(format!("code-exec-{}", Uuid::new_v4())),
            ..Default::default()
        });
        let config = self.container_config(&invocation.image, command, &host_dir)?;

        let container = self.docker.create_container(options, config).await?;
        log::debug!(
            "Created container {} from image {}",
            container.id,
            invocation.image
        );

        let outcome = self.run_container(&container.id).await;
        self.remove_container(&container.id).await;
        outcome
    }
}

/// The API run has no attached stdin, so staged input is piped in from the
/// mount instead.
fn container_command(invocation: &SandboxInvocation) -> Vec<String> {
    match invocation.stdin {
        Some(_) => pipe_input(
            &invocation.command,
            &format!("{}/{}", CODE_MOUNT, STDIN_FILE),
        ),
        None => invocation.command.clone(),
    }
}

/// Health ping bounded so a wedged socket cannot stall startup.
pub async fn ping_with_timeout(backend: &DockerBackend, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, backend.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("ping timed out after {}s", timeout.as_secs())),
    }
}
