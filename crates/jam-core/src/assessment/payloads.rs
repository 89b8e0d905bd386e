//! Typed views over oracle payloads.
//!
//! Each type has a fixed fallback used when the oracle gave nothing or
//! something that is not a JSON object. Missing fields take the same defaults
//! field by field; numeric fields given as strings are parsed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient_f64;

pub const EVALUATION_FALLBACK_FEEDBACK: &str = "Error evaluating code";
pub const AI_DETECTION_FALLBACK_REASONING: &str = "Unable to analyze code - JSON parsing failed";
pub const STYLE_FALLBACK_REASONING: &str = "Unable to analyze - JSON parsing failed";
pub const INCONCLUSIVE_VERDICT: &str = "inconclusive";

const AI_VERDICTS: [&str; 2] = ["high_confidence_ai", "likely_ai"];
const NEUTRAL_STYLE_SCORE: f64 = 0.5;

fn as_object(payload: Option<Value>) -> Option<Map<String, Value>> {
    match payload {
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            log::warn!("Assessment payload is not an object: {}", other);
            None
        }
        None => None,
    }
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn text_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn flag(map: &Map<String, Value>, key: &str) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Grade for a submission. Scores are on the oracle's 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEvaluation {
    pub score: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub code_quality: f64,
    pub efficiency: f64,
    pub correctness: f64,
}

impl CodeEvaluation {
    /// Zero in every dimension with the given feedback
    pub fn zero(feedback: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            feedback: feedback.into(),
            strengths: Vec::new(),
            improvements: Vec::new(),
            code_quality: 0.0,
            efficiency: 0.0,
            correctness: 0.0,
        }
    }

    pub fn fallback() -> Self {
        Self::zero(EVALUATION_FALLBACK_FEEDBACK)
    }

    pub fn from_payload(payload: Option<Value>) -> Self {
        let Some(map) = as_object(payload) else {
            return Self::fallback();
        };
        Self {
            score: lenient_f64(map.get("score"), 0.0),
            feedback: text(&map, "feedback").unwrap_or_default(),
            strengths: text_list(&map, "strengths"),
            improvements: text_list(&map, "improvements"),
            code_quality: lenient_f64(map.get("code_quality"), 0.0),
            efficiency: lenient_f64(map.get("efficiency"), 0.0),
            correctness: lenient_f64(map.get("correctness"), 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDetection {
    pub is_suspicious: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub verdict: String,
    pub key_indicators: Vec<Value>,
    pub categories: Map<String, Value>,
}

impl Default for AiDetection {
    fn default() -> Self {
        Self {
            is_suspicious: false,
            confidence: 0.0,
            reasoning: AI_DETECTION_FALLBACK_REASONING.to_string(),
            verdict: INCONCLUSIVE_VERDICT.to_string(),
            key_indicators: Vec::new(),
            categories: Map::new(),
        }
    }
}

impl AiDetection {
    /// A verdict of "high_confidence_ai" or "likely_ai" marks the code
    /// suspicious even when the payload's own flag says otherwise.
    pub fn from_payload(payload: Option<Value>) -> Self {
        let Some(map) = as_object(payload) else {
            return Self::default();
        };
        let verdict = text(&map, "verdict").unwrap_or_else(|| INCONCLUSIVE_VERDICT.to_string());
        let is_suspicious = flag(&map, "is_suspicious") || AI_VERDICTS.contains(&verdict.as_str());

        Self {
            is_suspicious,
            confidence: lenient_f64(map.get("confidence"), 0.0),
            reasoning: text(&map, "reasoning").unwrap_or_default(),
            verdict,
            key_indicators: match map.get("key_indicators") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            },
            categories: match map.get("categories") {
                Some(Value::Object(categories)) => categories.clone(),
                _ => Map::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleAnalysis {
    pub style_consistency_score: f64,
    pub is_too_perfect: bool,
    pub style_change_detected: bool,
    pub reasoning: String,
    pub indicators: Vec<Value>,
}

impl Default for StyleAnalysis {
    fn default() -> Self {
        Self {
            style_consistency_score: NEUTRAL_STYLE_SCORE,
            is_too_perfect: false,
            style_change_detected: false,
            reasoning: STYLE_FALLBACK_REASONING.to_string(),
            indicators: Vec::new(),
        }
    }
}

impl StyleAnalysis {
    pub fn from_payload(payload: Option<Value>) -> Self {
        let Some(map) = as_object(payload) else {
            return Self::default();
        };
        Self {
            style_consistency_score: lenient_f64(
                map.get("style_consistency_score"),
                NEUTRAL_STYLE_SCORE,
            ),
            is_too_perfect: flag(&map, "is_too_perfect"),
            style_change_detected: flag(&map, "style_change_detected"),
            reasoning: text(&map, "reasoning").unwrap_or_default(),
            indicators: match map.get("indicators") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            },
        }
    }
}
