//! Keystroke cadence analysis.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{detail_f64, Details};

/// Fewer intervals than this yields no verdict
pub const MIN_INTERVALS: usize = 10;
/// Gap (ms) between keystrokes that counts as a pause
pub const PAUSE_THRESHOLD_MS: f64 = 2000.0;

const MIN_VARIATION: f64 = 0.1;
const MAX_WPM: f64 = 100.0;
const MIN_BACKSPACE_RATIO: f64 = 0.05;
const BACKSPACE_MIN_CHARACTERS: f64 = 100.0;
const MIN_PAUSE_SHARE: f64 = 0.1;

pub const UNNATURAL_TYPING_REASON: &str = "Unnatural typing pattern detected";

/// Raw typing telemetry as reported by the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingPatterns {
    #[serde(default)]
    pub keystroke_intervals: Vec<f64>,
    #[serde(default)]
    pub backspace_count: f64,
    #[serde(default)]
    pub total_characters: f64,
}

impl TypingPatterns {
    /// Reads the patterns out of an event detail map. Missing or malformed keys
    /// read as empty/zero, non-numeric intervals are skipped.
    pub fn from_details(details: &Details) -> Self {
        let keystroke_intervals = match details.get("keystroke_intervals") {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            keystroke_intervals,
            backspace_count: detail_f64(details, "backspace_count").unwrap_or(0.0),
            total_characters: detail_f64(details, "total_characters").unwrap_or(0.0),
        }
    }
}

/// Result of [`analyze_typing`]. The numeric fields are `None` when there was
/// not enough data for a verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingAnalysis {
    pub is_suspicious: bool,
    pub wpm: Option<f64>,
    pub coefficient_of_variation: Option<f64>,
    pub mean_interval_ms: Option<f64>,
    pub backspace_ratio: Option<f64>,
    pub pause_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TypingAnalysis {
    pub fn insufficient_data() -> Self {
        Self::default()
    }

    pub fn has_verdict(&self) -> bool {
        self.wpm.is_some()
    }
}

pub fn analyze_typing(patterns: &TypingPatterns) -> TypingAnalysis {
    let intervals = &patterns.keystroke_intervals;
    if intervals.len() < MIN_INTERVALS {
        return TypingAnalysis::insufficient_data();
    }

    let count = intervals.len() as f64;
    let total_ms: f64 = intervals.iter().sum();
    let mean = total_ms / count;
    let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / count;
    let std_dev = variance.sqrt();
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };

    let total_seconds = total_ms / 1000.0;
    let wpm = if total_seconds > 0.0 {
        (patterns.total_characters / 5.0) / (total_seconds / 60.0)
    } else {
        0.0
    };

    let backspace_ratio = if patterns.total_characters > 0.0 {
        patterns.backspace_count / patterns.total_characters
    } else {
        0.0
    };

    let pause_count = intervals.iter().filter(|i| **i > PAUSE_THRESHOLD_MS).count();

    let is_suspicious = cv < MIN_VARIATION
        || wpm > MAX_WPM
        || (backspace_ratio < MIN_BACKSPACE_RATIO
            && patterns.total_characters > BACKSPACE_MIN_CHARACTERS)
        || (pause_count as f64) < count * MIN_PAUSE_SHARE;

    TypingAnalysis {
        is_suspicious,
        wpm: Some(round_to(wpm, 1)),
        coefficient_of_variation: Some(round_to(cv, 3)),
        mean_interval_ms: Some(round_to(mean, 1)),
        backspace_ratio: Some(round_to(backspace_ratio, 3)),
        pause_count: Some(pause_count),
        reason: is_suspicious.then(|| UNNATURAL_TYPING_REASON.to_string()),
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patterns(intervals: Vec<f64>, backspaces: f64, characters: f64) -> TypingPatterns {
        TypingPatterns {
            keystroke_intervals: intervals,
            backspace_count: backspaces,
            total_characters: characters,
        }
    }

    /// Irregular human-ish cadence with a few long pauses and plenty of corrections.
    fn human_intervals() -> Vec<f64> {
        vec![
            150.0, 420.0, 2500.0, 90.0, 310.0, 2200.0, 180.0, 600.0, 75.0, 3100.0, 240.0, 130.0,
        ]
    }

    #[test]
    fn test_nine_intervals_has_no_verdict() {
        let analysis = analyze_typing(&patterns(vec![100.0; 9], 0.0, 50.0));
        assert!(!analysis.is_suspicious);
        assert!(!analysis.has_verdict());
        assert_eq!(analysis.coefficient_of_variation, None);
        assert_eq!(analysis.mean_interval_ms, None);
        assert_eq!(analysis.backspace_ratio, None);
        assert_eq!(analysis.pause_count, None);
    }

    #[test]
    fn test_ten_identical_intervals_are_suspicious() {
        let analysis = analyze_typing(&patterns(vec![120.0; 10], 5.0, 20.0));
        assert!(analysis.is_suspicious);
        assert_eq!(analysis.coefficient_of_variation, Some(0.0));
        assert_eq!(analysis.mean_interval_ms, Some(120.0));
        assert_eq!(analysis.pause_count, Some(0));
        assert_eq!(analysis.reason.as_deref(), Some(UNNATURAL_TYPING_REASON));
    }

    #[test]
    fn test_human_cadence_is_not_suspicious() {
        // 12 intervals, 9995 ms total, 3 pauses
        let analysis = analyze_typing(&patterns(human_intervals(), 10.0, 60.0));
        assert!(!analysis.is_suspicious, "{:?}", analysis);
        assert_eq!(analysis.pause_count, Some(3));
        assert_eq!(analysis.backspace_ratio, Some(0.167));
        assert_eq!(analysis.reason, None);
        // 60 chars / 5 = 12 words over ~0.1666 minutes
        assert_eq!(analysis.wpm, Some(72.0));
    }

    #[test]
    fn test_fast_typing_is_suspicious() {
        let analysis = analyze_typing(&patterns(human_intervals(), 10.0, 200.0));
        assert!(analysis.wpm.unwrap() > 100.0);
        assert!(analysis.is_suspicious);
    }

    #[test]
    fn test_too_few_corrections_is_suspicious() {
        let mut intervals = human_intervals();
        intervals.extend(human_intervals());
        intervals.extend(human_intervals());
        // 36 intervals, ~30s, 101 chars keeps wpm low
        let analysis = analyze_typing(&patterns(intervals, 1.0, 101.0));
        assert!(analysis.wpm.unwrap() < 100.0);
        assert!(analysis.is_suspicious);
    }

    #[test]
    fn test_too_few_pauses_is_suspicious() {
        let intervals = vec![
            150.0, 420.0, 90.0, 310.0, 180.0, 600.0, 75.0, 240.0, 130.0, 500.0, 260.0, 2500.0,
        ];
        // one pause in 12 intervals, below 10%
        let analysis = analyze_typing(&patterns(intervals, 5.0, 20.0));
        assert_eq!(analysis.pause_count, Some(1));
        assert!(analysis.is_suspicious);
    }

    #[test]
    fn test_zero_time_and_characters() {
        let analysis = analyze_typing(&patterns(vec![0.0; 10], 0.0, 0.0));
        assert_eq!(analysis.wpm, Some(0.0));
        assert_eq!(analysis.coefficient_of_variation, Some(0.0));
        assert_eq!(analysis.backspace_ratio, Some(0.0));
        assert!(analysis.is_suspicious);
    }

    #[test]
    fn test_from_details_is_lenient() {
        let details = json!({
            "keystroke_intervals": [100, "200", "x", null, 300.5],
            "backspace_count": "4",
        })
        .as_object()
        .cloned()
        .unwrap();
        let parsed = TypingPatterns::from_details(&details);
        assert_eq!(parsed.keystroke_intervals, vec![100.0, 200.0, 300.5]);
        assert_eq!(parsed.backspace_count, 4.0);
        assert_eq!(parsed.total_characters, 0.0);

        let empty = TypingPatterns::from_details(&Details::new());
        assert!(!analyze_typing(&empty).has_verdict());
    }

    #[test]
    fn test_serialized_analysis_carries_wpm_key() {
        let analysis = analyze_typing(&patterns(vec![120.0; 10], 5.0, 20.0));
        let value = serde_json::to_value(&analysis).unwrap();
        assert!(value.get("wpm").is_some());
        assert_eq!(value["is_suspicious"], json!(true));
    }
}
