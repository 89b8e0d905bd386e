//! Command-line fallback backend.
//!
//! Used when the engine API is unreachable but the engine's CLI binary is on
//! PATH. Each invocation becomes one `docker run --rm` child process with the
//! same mount, memory, CPU and network restrictions as the API backend. The
//! wall-clock limit is enforced here by killing the child process.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use super::languages::CODE_MOUNT;
use super::limits::LimitPolicy;
use super::{BackendStrategy, RawRunResult, SandboxBackend, SandboxInvocation};
use crate::errors::SandboxBackendError;

pub struct CliBackend {
    binary: PathBuf,
    limits: LimitPolicy,
}

impl CliBackend {
    pub fn new(binary: impl Into<PathBuf>, limits: LimitPolicy) -> Self {
        Self {
            binary: binary.into(),
            limits,
        }
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }

    /// Arguments passed to the binary for one run.
    pub fn build_args(&self, invocation: &SandboxInvocation, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "-v".to_string(),
            format!("{}:{}", invocation.host_dir.display(), CODE_MOUNT),
            "-m".to_string(),
            self.limits.memory_limit.clone(),
            "--cpus".to_string(),
            self.limits.cpu_limit.to_string(),
            "--network".to_string(),
            "none".to_string(),
        ];
        if invocation.stdin.is_some() {
            args.push("-i".to_string());
        }
        args.push(invocation.image.clone());
        args.extend(invocation.command.iter().cloned());
        args
    }

    /// Killing the client does not always stop the container it started.
    async fn force_remove(&self, container_name: &str) {
        let result = Command::new(&self.binary)
            .args(["rm", "-f", container_name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            log::debug!("Failed to remove container {}: {}", container_name, e);
        }
    }
}

#[async_trait]
impl SandboxBackend for CliBackend {
    fn strategy(&self) -> BackendStrategy {
        BackendStrategy::Cli
    }

    async fn run(
        &self,
        invocation: &SandboxInvocation,
    ) -> Result<RawRunResult, SandboxBackendError> {
        let container_name = format!("code-exec-{}", Uuid::new_v4());
        let args = self.build_args(invocation, &container_name);
        log::debug!("Running {} {}", self.binary.display(), args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxBackendError::SpawnError {
                binary: self.binary.display().to_string(),
                message: e.to_string(),
            })?;

        let stdin_pipe = child.stdin.take();
        let feed_stdin = async move {
            if let (Some(input), Some(mut stdin)) = (&invocation.stdin, stdin_pipe) {
                // A program that never reads stdin closes the pipe early; that is not our failure.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    log::debug!("Could not write stdin to sandbox: {}", e);
                }
            }
        };

        // Stdin is fed inside the timed section. Dropping the run future on
        // expiry kills the child (kill_on_drop).
        let run = async {
            let ((), output) = tokio::join!(feed_stdin, child.wait_with_output());
            output
        };
        match tokio::time::timeout(self.limits.timeout, run).await {
            Ok(output) => {
                let output = output?;
                Ok(RawRunResult {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code().map(i64::from),
                    timed_out: false,
                    oom_killed: false,
                })
            }
            Err(_) => {
                log::warn!(
                    "Execution timed out after {}s, killed container {}",
                    self.limits.timeout.as_secs(),
                    container_name
                );
                self.force_remove(&container_name).await;
                Ok(RawRunResult {
                    stderr: "Time limit exceeded".to_string(),
                    timed_out: true,
                    ..Default::default()
                })
            }
        }
    }
}
