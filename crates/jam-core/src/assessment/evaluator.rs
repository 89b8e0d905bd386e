use std::sync::Arc;

use super::payloads::CodeEvaluation;
use super::{AssessmentOracle, EvaluationRequest};

const UNCHANGED_CODE_EN: &str =
    "You submitted the starter template without changes. Please implement a solution before submitting.";
const UNCHANGED_CODE_RU: &str =
    "Вы отправили стартовый шаблон без изменений. Пожалуйста, реализуйте решение перед отправкой.";

/// Canonical form used to compare a submission with its starter template:
/// surrounding whitespace and trailing whitespace on every line are ignored.
pub fn normalize_code(code: &str) -> String {
    code.trim()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Feedback for an untouched starter template, in Russian for "ru" and
/// English otherwise.
pub fn unchanged_code_message(language: &str) -> &'static str {
    if language.trim().eq_ignore_ascii_case("ru") {
        UNCHANGED_CODE_RU
    } else {
        UNCHANGED_CODE_EN
    }
}

/// Grades submissions through the oracle, except ones that are empty or still
/// the starter template, which score zero without an oracle call.
#[derive(Clone)]
pub struct SubmissionEvaluator {
    oracle: Arc<dyn AssessmentOracle>,
}

impl SubmissionEvaluator {
    pub fn new(oracle: Arc<dyn AssessmentOracle>) -> Self {
        Self { oracle }
    }

    pub fn is_unchanged(code: &str, starter_code: Option<&str>) -> bool {
        match starter_code.filter(|starter| !starter.is_empty()) {
            Some(starter) => {
                let submitted = normalize_code(code);
                submitted.is_empty() || submitted == normalize_code(starter)
            }
            None => false,
        }
    }

    pub async fn evaluate(
        &self,
        request: &EvaluationRequest<'_>,
        starter_code: Option<&str>,
    ) -> CodeEvaluation {
        if Self::is_unchanged(request.code, starter_code) {
            log::info!(
                "Submission for '{}' matches the starter template, skipping evaluation",
                request.task.title
            );
            return CodeEvaluation::zero(unchanged_code_message(request.response_language));
        }

        let payload = self.oracle.evaluate_code(request).await;
        if payload.is_none() {
            log::warn!("Oracle returned no evaluation for '{}'", request.task.title);
        }
        CodeEvaluation::from_payload(payload)
    }
}
