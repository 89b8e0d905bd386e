//! Code execution environments for sandboxed evaluation of candidate code.
//!
//! Candidate submissions run inside throwaway containers with the host working
//! directory bind-mounted at `/code`, networking disabled and memory, CPU and
//! wall-clock limits applied. Two interchangeable backends implement
//! [`SandboxBackend`]: a native engine client ([`docker::DockerBackend`]) and a
//! command-line fallback ([`cli::CliBackend`]). One of them is picked at startup
//! by [`selection::BackendSelection::probe`], and [`sandbox::SandboxRunner`]
//! drives single runs and test-case batches on top of it.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::errors::SandboxBackendError;

pub mod cli;
pub mod docker;
pub mod languages;
pub mod limits;
pub mod sandbox;
pub mod selection;

pub use languages::{CommandResolver, Language, LanguageSpec};
pub use limits::LimitPolicy;
pub use sandbox::SandboxRunner;
pub use selection::{BackendSelection, BackendStrategy};

pub const DISABLED_MESSAGE: &str =
    "Code execution service is disabled because Docker is unavailable in this environment.";

/// One expected input/output pair. Values may arrive as any JSON scalar and are
/// compared as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default, deserialize_with = "lenient_text")]
    pub input: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: Language) -> Self {
        Self {
            code: code.into(),
            language,
            test_cases: Vec::new(),
            stdin: None,
        }
    }

    pub fn with_test_cases(mut self, test_cases: Vec<TestCase>) -> Self {
        self.test_cases = test_cases;
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_number: usize,
    pub passed: bool,
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    /// Best effort; 0 means not measured
    pub memory_used_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
}

impl ExecutionResult {
    /// Result returned for every request when no backend is usable
    pub fn disabled() -> Self {
        Self::failure(DISABLED_MESSAGE)
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time_ms: 0,
            memory_used_mb: 0.0,
            test_results: None,
        }
    }

    /// Folds per-case results into the batch summary: success is the
    /// conjunction of every `passed` flag and times are summed.
    pub fn from_test_results(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let all_passed = passed == results.len();
        let total_time = results.iter().map(|r| r.execution_time_ms).sum();

        Self {
            success: all_passed,
            output: Some(format!("Passed {}/{} tests", passed, results.len())),
            error: if all_passed {
                None
            } else {
                Some("Some tests failed".to_string())
            },
            execution_time_ms: total_time,
            memory_used_mb: 0.0,
            test_results: Some(results),
        }
    }
}

/// What a backend is asked to run.
#[derive(Debug, Clone)]
pub struct SandboxInvocation {
    pub image: String,
    pub command: Vec<String>,
    /// Mounted read-write at `/code`
    pub host_dir: PathBuf,
    pub stdin: Option<String>,
}

/// Raw outcome of one container run, before classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub timed_out: bool,
    /// Set when the engine reports the container was OOM-killed
    pub oom_killed: bool,
}

impl RawRunResult {
    pub fn exited_cleanly(&self) -> bool {
        !self.timed_out && !self.oom_killed && self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn strategy(&self) -> BackendStrategy;

    async fn run(&self, invocation: &SandboxInvocation)
        -> Result<RawRunResult, SandboxBackendError>;
}
