//! Grading and authorship checks delegated to an external assessment oracle.
//!
//! The oracle (typically an LLM endpoint) answers with loosely structured JSON.
//! This module owns the seam: the [`AssessmentOracle`] trait, typed views over
//! its payloads with fixed fallbacks, and the submission-side rules that never
//! need the oracle at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executors::{ExecutionResult, Language};

pub mod evaluator;
pub mod payloads;

pub use evaluator::{normalize_code, unchanged_code_message, SubmissionEvaluator};
pub use payloads::{AiDetection, CodeEvaluation, StyleAnalysis};

/// Task metadata passed along with a submission for grading
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub title: String,
    pub description: String,
    pub task_type: String,
}

#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    pub code: &'a str,
    pub language: Language,
    pub task: &'a TaskContext,
    pub execution_result: Option<&'a ExecutionResult>,
    /// Language the feedback should be written in, e.g. "en" or "ru"
    pub response_language: &'a str,
}

/// External grader. Every method is best effort: `None`, or a payload that
/// does not have the expected shape, is replaced by a fixed fallback.
#[async_trait]
pub trait AssessmentOracle: Send + Sync {
    async fn evaluate_code(&self, request: &EvaluationRequest<'_>) -> Option<Value>;

    async fn detect_ai_code(&self, code: &str) -> Option<Value>;

    async fn analyze_code_style(&self, code: &str, previous_submissions: &[String])
        -> Option<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Compilation,
    Execution,
}

impl FailureKind {
    pub fn of(error: &str) -> Self {
        let error = error.to_lowercase();
        if ["syntax", "compile", "parse"]
            .iter()
            .any(|marker| error.contains(marker))
        {
            FailureKind::Compilation
        } else {
            FailureKind::Execution
        }
    }
}

/// Running count of failed runs for one task, split by [`FailureKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTally {
    pub compilation_errors: u32,
    pub execution_errors: u32,
}

impl ErrorTally {
    /// Counts a failed result; successful ones are ignored.
    pub fn record(&mut self, result: &ExecutionResult) -> Option<FailureKind> {
        if result.success {
            return None;
        }
        let kind = FailureKind::of(result.error.as_deref().unwrap_or_default());
        match kind {
            FailureKind::Compilation => self.compilation_errors += 1,
            FailureKind::Execution => self.execution_errors += 1,
        }
        Some(kind)
    }
}

/// Reads a float from a payload field, accepting numbers or numeric strings.
pub(crate) fn lenient_f64(value: Option<&Value>, default: f64) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failure_kind() {
        assert_eq!(FailureKind::of("SyntaxError: invalid syntax"), FailureKind::Compilation);
        assert_eq!(
            FailureKind::of("error: could not compile solution.cpp"),
            FailureKind::Compilation
        );
        assert_eq!(FailureKind::of("JSON Parse error"), FailureKind::Compilation);
        assert_eq!(FailureKind::of("Time limit exceeded"), FailureKind::Execution);
        assert_eq!(FailureKind::of(""), FailureKind::Execution);
    }

    #[test]
    fn test_error_tally() {
        let mut tally = ErrorTally::default();
        assert_eq!(tally.record(&ExecutionResult::failure("Memory limit exceeded")), Some(FailureKind::Execution));
        assert_eq!(
            tally.record(&ExecutionResult::failure("  File \"x\"\nSyntaxError: bad")),
            Some(FailureKind::Compilation)
        );
        let ok = ExecutionResult::from_test_results(Vec::new());
        assert_eq!(tally.record(&ok), None);
        assert_eq!(
            tally,
            ErrorTally {
                compilation_errors: 1,
                execution_errors: 1
            }
        );
    }

    #[test]
    fn test_lenient_f64() {
        assert_eq!(lenient_f64(Some(&json!(0.4)), 1.0), 0.4);
        assert_eq!(lenient_f64(Some(&json!(" 0.9 ")), 1.0), 0.9);
        assert_eq!(lenient_f64(Some(&json!("high")), 1.0), 1.0);
        assert_eq!(lenient_f64(Some(&json!(null)), 1.0), 1.0);
        assert_eq!(lenient_f64(None, 0.5), 0.5);
    }
}
