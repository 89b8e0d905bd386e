//! Detection of large code blocks appearing faster than they could be typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lines changed in one step above which a quick change is a burst
pub const BURST_LINES: i64 = 50;
/// Window (ms) to the next change under which a large change is a burst
pub const BURST_WINDOW_MS: i64 = 5000;

pub const BURST_REASON: &str = "Large code blocks added too quickly";

/// One timestamped editor change. `lines` is signed: removals are negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub lines: i64,
}

impl ChangeRecord {
    pub fn new(timestamp: i64, lines: i64) -> Self {
        Self { timestamp, lines }
    }

    /// Missing or non-numeric fields read as zero.
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| match value.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        Self {
            timestamp: field("timestamp"),
            lines: field("lines"),
        }
    }

    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBurst {
    pub lines: i64,
    pub time_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeChangeAnalysis {
    pub is_suspicious: bool,
    #[serde(default)]
    pub large_changes_count: usize,
    #[serde(default)]
    pub large_changes: Vec<ChangeBurst>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Walks consecutive pairs in the order given; a change counts as a burst when
/// it touched more than 50 lines and the next change arrived within 5 seconds.
pub fn analyze_code_changes(history: &[ChangeRecord]) -> CodeChangeAnalysis {
    if history.len() < 2 {
        return CodeChangeAnalysis::default();
    }

    let large_changes: Vec<ChangeBurst> = history
        .windows(2)
        .filter_map(|pair| {
            let time_ms = pair[1].timestamp.saturating_sub(pair[0].timestamp);
            let lines = pair[0].lines.saturating_abs();
            (lines > BURST_LINES && time_ms < BURST_WINDOW_MS).then_some(ChangeBurst { lines, time_ms })
        })
        .collect();

    let is_suspicious = !large_changes.is_empty();
    CodeChangeAnalysis {
        is_suspicious,
        large_changes_count: large_changes.len(),
        large_changes,
        reason: is_suspicious.then(|| BURST_REASON.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_needs_two_records() {
        assert!(!analyze_code_changes(&[]).is_suspicious);
        let single = analyze_code_changes(&[ChangeRecord::new(0, 500)]);
        assert!(!single.is_suspicious);
        assert_eq!(single.large_changes_count, 0);
    }

    #[test]
    fn test_large_quick_change_is_a_burst() {
        let history = [
            ChangeRecord::new(1_000, 80),
            ChangeRecord::new(3_000, 2),
            ChangeRecord::new(60_000, 5),
        ];
        let analysis = analyze_code_changes(&history);
        assert!(analysis.is_suspicious);
        assert_eq!(analysis.large_changes_count, 1);
        assert_eq!(analysis.large_changes, vec![ChangeBurst { lines: 80, time_ms: 2_000 }]);
        assert_eq!(analysis.reason.as_deref(), Some(BURST_REASON));
    }

    #[test]
    fn test_thresholds_are_strict() {
        // exactly 50 lines, or exactly 5 seconds, is not a burst
        let history = [
            ChangeRecord::new(0, 50),
            ChangeRecord::new(1_000, 51),
            ChangeRecord::new(6_000, 0),
        ];
        let analysis = analyze_code_changes(&history);
        assert!(!analysis.is_suspicious);
        assert_eq!(analysis.reason, None);
    }

    #[test]
    fn test_removals_count_by_magnitude() {
        let history = [ChangeRecord::new(0, -120), ChangeRecord::new(100, 0)];
        let analysis = analyze_code_changes(&history);
        assert_eq!(analysis.large_changes, vec![ChangeBurst { lines: 120, time_ms: 100 }]);
    }

    #[test]
    fn test_records_parse_leniently() {
        let value = json!([
            {"timestamp": 10, "lines": 70},
            {"timestamp": "20"},
            {"lines": 3.0},
            "junk"
        ]);
        let records = ChangeRecord::list_from_value(&value);
        assert_eq!(
            records,
            vec![
                ChangeRecord::new(10, 70),
                ChangeRecord::new(20, 0),
                ChangeRecord::new(0, 3),
                ChangeRecord::new(0, 0),
            ]
        );
        assert!(ChangeRecord::list_from_value(&json!({"a": 1})).is_empty());
    }
}
