//! Orchestration of single runs and test-case batches.
//!
//! `SandboxRunner::execute` never fails: a disabled backend, a crashing
//! program, a timeout and a misbehaving engine all come back as an
//! [`ExecutionResult`] with `success == false` and a readable `error`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::Builder;
use tokio::sync::Semaphore;

use super::languages::{pipe_input, test_input_path, CommandResolver, LanguageSpec, INPUT_FILE};
use super::selection::BackendSelection;
use super::{
    ExecutionRequest, ExecutionResult, RawRunResult, SandboxBackend, SandboxInvocation,
    TestCase, TestResult,
};
use crate::config::SandboxConfig;

pub const TIME_LIMIT_EXCEEDED: &str = "Time limit exceeded";
pub const MEMORY_LIMIT_EXCEEDED: &str = "Memory limit exceeded";
pub const CPU_LIMIT_EXCEEDED: &str = "CPU limit exceeded";

/// Maps backend failure text onto a limit verdict, or passes it through.
///
/// Matching is a case-insensitive substring test on text produced by the
/// engine, so it is best effort. Structured signals (`timed_out`,
/// `oom_killed`) are checked before this in [`classify_raw`].
pub fn classify_failure(message: &str) -> String {
    let lowered = message.to_lowercase();
    if lowered.contains("out of memory") || lowered.contains("killed") {
        MEMORY_LIMIT_EXCEEDED.to_string()
    } else if lowered.contains("timeout") || lowered.contains("timed out") {
        TIME_LIMIT_EXCEEDED.to_string()
    } else if lowered.contains("cpu") && lowered.contains("limit") {
        CPU_LIMIT_EXCEEDED.to_string()
    } else {
        message.to_string()
    }
}

/// Turns a raw backend outcome into a single-run result.
pub fn classify_raw(raw: RawRunResult, execution_time_ms: u64) -> ExecutionResult {
    let stdout = raw.stdout.trim().to_string();

    if raw.exited_cleanly() {
        return ExecutionResult {
            success: true,
            output: Some(stdout),
            error: None,
            execution_time_ms,
            memory_used_mb: 0.0,
            test_results: None,
        };
    }

    let error = if raw.timed_out {
        TIME_LIMIT_EXCEEDED.to_string()
    } else if raw.oom_killed {
        MEMORY_LIMIT_EXCEEDED.to_string()
    } else {
        let stderr = raw.stderr.trim();
        if stderr.is_empty() {
            match raw.exit_code {
                Some(code) => format!("Process exited with code {}", code),
                None => "Process terminated without an exit code".to_string(),
            }
        } else {
            classify_failure(stderr)
        }
    };

    ExecutionResult {
        success: false,
        output: if stdout.is_empty() { None } else { Some(stdout) },
        error: Some(error),
        execution_time_ms,
        memory_used_mb: 0.0,
        test_results: None,
    }
}

pub struct SandboxRunner {
    selection: BackendSelection,
    resolver: CommandResolver,
    pool: Arc<Semaphore>,
}

impl SandboxRunner {
    pub fn new(selection: BackendSelection, config: &SandboxConfig) -> Self {
        Self {
            selection,
            resolver: CommandResolver::with_images(config.images.clone()),
            pool: Arc::new(Semaphore::new(config.max_concurrent_executions.max(1))),
        }
    }

    /// Probes for a backend and builds a runner in one step.
    pub async fn from_config(config: &SandboxConfig) -> Self {
        let selection = BackendSelection::probe(config).await;
        Self::new(selection, config)
    }

    pub fn selection(&self) -> &BackendSelection {
        &self.selection
    }

    pub fn available_workers(&self) -> usize {
        self.pool.available_permits()
    }

    /// Runs the request on the worker pool. Dropping the returned future does
    /// not cancel a run that has already been dispatched.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let Some(backend) = self.selection.backend() else {
            log::debug!(
                "Execution requested while the sandbox is disabled: {}",
                self.selection.reason()
            );
            return ExecutionResult::disabled();
        };

        let permit = match self.pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return ExecutionResult::failure(format!("Execution error: {}", e)),
        };

        let spec = self.resolver.resolve(request.language);
        let job = ExecutionJob {
            backend,
            spec,
            request,
        };

        let handle = tokio::spawn(async move {
            let _permit = permit;
            job.run().await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Execution task failed: {}", e);
                ExecutionResult::failure(format!("Execution error: {}", e))
            }
        }
    }
}

struct ExecutionJob {
    backend: Arc<dyn SandboxBackend>,
    spec: LanguageSpec,
    request: ExecutionRequest,
}

impl ExecutionJob {
    async fn run(self) -> ExecutionResult {
        let workspace = match Builder::new().prefix("code-exec-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return ExecutionResult::failure(format!("Execution error: {}", e)),
        };

        let source_path = workspace
            .path()
            .join(format!("solution.{}", self.spec.extension));
        if let Err(e) = tokio::fs::write(&source_path, &self.request.code).await {
            return ExecutionResult::failure(format!("Execution error: {}", e));
        }

        if self.request.test_cases.is_empty() {
            self.run_single(workspace.path()).await
        } else {
            self.run_tests(workspace.path()).await
        }
    }

    async fn run_single(&self, workdir: &Path) -> ExecutionResult {
        let invocation = SandboxInvocation {
            image: self.spec.image.clone(),
            command: self.spec.command.clone(),
            host_dir: workdir.to_path_buf(),
            stdin: self.request.stdin.clone(),
        };
        run_once(self.backend.as_ref(), &invocation).await
    }

    /// Cases share one mount and run strictly one after another.
    async fn run_tests(&self, workdir: &Path) -> ExecutionResult {
        let command = pipe_input(&self.spec.command, &test_input_path());
        let mut results = Vec::with_capacity(self.request.test_cases.len());

        for (index, case) in self.request.test_cases.iter().enumerate() {
            let result = match tokio::fs::write(workdir.join(INPUT_FILE), &case.input).await {
                Ok(()) => {
                    let invocation = SandboxInvocation {
                        image: self.spec.image.clone(),
                        command: command.clone(),
                        host_dir: workdir.to_path_buf(),
                        stdin: None,
                    };
                    run_once(self.backend.as_ref(), &invocation).await
                }
                Err(e) => ExecutionResult::failure(format!("Execution error: {}", e)),
            };
            results.push(grade(index + 1, case, result));
        }

        let summary = ExecutionResult::from_test_results(results);
        log::debug!(
            "{} for {} submission",
            summary.output.as_deref().unwrap_or_default(),
            self.request.language
        );
        summary
    }
}

fn grade(test_number: usize, case: &TestCase, result: ExecutionResult) -> TestResult {
    let actual = result.output.as_deref().unwrap_or_default().trim().to_string();
    let expected = case.output.trim().to_string();

    TestResult {
        test_number,
        passed: actual == expected,
        input: case.input.clone(),
        expected,
        actual,
        error: result.error,
        execution_time_ms: result.execution_time_ms,
    }
}

async fn run_once(backend: &dyn SandboxBackend, invocation: &SandboxInvocation) -> ExecutionResult {
    let started = Instant::now();
    let outcome = backend.run(invocation).await;
    let elapsed = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(raw) => classify_raw(raw, elapsed),
        Err(e) => {
            log::warn!("Sandbox backend failed: {}", e);
            ExecutionResult {
                execution_time_ms: elapsed,
                ..ExecutionResult::failure(classify_failure(&e.to_string()))
            }
        }
    }
}
