//! Trust score and warnings derived from a session's event history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::code_changes::{analyze_code_changes, ChangeRecord, CodeChangeAnalysis};
use super::severity::base_weight;
use super::store::{SessionState, SessionStore};
use super::typing::{analyze_typing, round_to, TypingAnalysis, TypingPatterns};
use super::{BehavioralEvent, Details, EventType, Severity};
use crate::assessment::{AiDetection, AssessmentOracle, StyleAnalysis};
use crate::config::AntiCheatConfig;

pub const CRITICAL_SCORE_THRESHOLD: f64 = 0.7;
pub const FLAGGED_SCORE_THRESHOLD: f64 = 0.5;
pub const TAB_SWITCH_WARNING_COUNT: usize = 5;
pub const LARGE_PASTE_WARNING_COUNT: usize = 2;
/// Occurrences of one type beyond this add nothing to the score
pub const PER_TYPE_CAP: usize = 10;
pub const TIMELINE_LEN: usize = 20;
/// AI detections at or below this confidence are reported but not recorded
pub const AI_CONFIDENCE_THRESHOLD: f64 = 0.7;
const SCORE_NORMALIZER: f64 = 5.0;

pub const CRITICAL_WARNING: &str = "Critical: Multiple suspicious activities detected";
pub const TAB_SWITCH_WARNING: &str = "Warning: Frequent tab switching detected";
pub const LARGE_PASTE_WARNING: &str = "Warning: Multiple large code pastes detected";

const AI_DETECTED_REASON: &str = "AI-generated code detected";
const TOO_PERFECT_REASON: &str = "Code is too perfect - likely AI-generated";

/// Score from per-type counts: each type contributes `weight * min(count, 10)`,
/// the sum is divided by 5, clamped to [0, 1] and rounded to 2 decimals.
pub fn aggregate_score(counts: &BTreeMap<EventType, usize>) -> f64 {
    let total: f64 = counts
        .iter()
        .map(|(event_type, count)| base_weight(*event_type) * (*count).min(PER_TYPE_CAP) as f64)
        .sum();
    round_to((total / SCORE_NORMALIZER).clamp(0.0, 1.0), 2)
}

/// Recomputes the score from scratch by regrouping the whole history.
pub fn replay_score(events: &[BehavioralEvent]) -> f64 {
    let mut grouped: BTreeMap<EventType, Vec<&BehavioralEvent>> = BTreeMap::new();
    for event in events {
        grouped.entry(event.event_type).or_default().push(event);
    }
    let counts: BTreeMap<EventType, usize> = grouped
        .into_iter()
        .map(|(event_type, events)| (event_type, events.len()))
        .collect();
    aggregate_score(&counts)
}

/// First match wins: critical score, then tab switching, then large pastes.
pub fn warning_for(score: f64, counts: &BTreeMap<EventType, usize>) -> Option<&'static str> {
    let count = |event_type: EventType| counts.get(&event_type).copied().unwrap_or(0);
    if score >= CRITICAL_SCORE_THRESHOLD {
        Some(CRITICAL_WARNING)
    } else if count(EventType::TabSwitch) >= TAB_SWITCH_WARNING_COUNT {
        Some(TAB_SWITCH_WARNING)
    } else if count(EventType::LargePaste) >= LARGE_PASTE_WARNING_COUNT {
        Some(LARGE_PASTE_WARNING)
    } else {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub aggregate_score: f64,
    pub flags_count: usize,
    pub warning: Option<String>,
    pub event_counts: BTreeMap<EventType, usize>,
}

impl AggregateMetrics {
    fn from_state(state: &SessionState) -> Self {
        let event_counts = state.counts().clone();
        let aggregate_score = aggregate_score(&event_counts);
        Self {
            aggregate_score,
            flags_count: state.flags_count(),
            warning: warning_for(aggregate_score, &event_counts).map(str::to_string),
            event_counts,
        }
    }
}

/// Returned by [`MetricsAggregator::record_event`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAssessment {
    pub event_recorded: bool,
    pub severity: Severity,
    pub aggregate_score: f64,
    pub warning: Option<String>,
    pub flags_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub details: Details,
}

impl From<&BehavioralEvent> for ActivityEntry {
    fn from(event: &BehavioralEvent) -> Self {
        Self {
            event_type: event.event_type,
            timestamp: event.timestamp,
            details: event.details.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterviewSummary {
    pub total_events: usize,
    pub flags_count: usize,
    pub aggregate_score: f64,
    pub is_flagged: bool,
    pub warning: Option<String>,
    pub events_by_type: BTreeMap<EventType, usize>,
    /// Latest event details that carried a typing analysis
    pub typing_patterns: Option<Details>,
    /// Latest event details that carried a style analysis
    pub code_style_analysis: Option<Details>,
    pub network_activity: Vec<ActivityEntry>,
    pub clipboard_analysis: Vec<ActivityEntry>,
    pub timeline: Vec<TimelineEntry>,
}

impl InterviewSummary {
    fn from_state(state: &SessionState) -> Self {
        let metrics = AggregateMetrics::from_state(state);
        let events = state.events();

        let mut typing_patterns = None;
        let mut code_style_analysis = None;
        let mut network_activity = Vec::new();
        let mut clipboard_analysis = Vec::new();

        for event in events {
            if event.details.contains_key("wpm") {
                typing_patterns = Some(event.details.clone());
            }
            if event.details.contains_key("style_consistency_score") {
                code_style_analysis = Some(event.details.clone());
            }
            if event.event_type.is_network_activity() {
                network_activity.push(ActivityEntry::from(event));
            }
            if event.event_type.is_clipboard_activity() {
                clipboard_analysis.push(ActivityEntry::from(event));
            }
        }

        let timeline = events[events.len().saturating_sub(TIMELINE_LEN)..]
            .iter()
            .map(|event| TimelineEntry {
                event_type: event.event_type,
                severity: event.severity,
                timestamp: event.timestamp,
            })
            .collect();

        Self {
            total_events: events.len(),
            flags_count: metrics.flags_count,
            aggregate_score: metrics.aggregate_score,
            is_flagged: metrics.aggregate_score >= FLAGGED_SCORE_THRESHOLD,
            warning: metrics.warning,
            events_by_type: metrics.event_counts,
            typing_patterns,
            code_style_analysis,
            network_activity,
            clipboard_analysis,
            timeline,
        }
    }
}

/// Outcome of [`MetricsAggregator::analyze_code_submission`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionAnalysis {
    pub is_suspicious: bool,
    pub ai_detection: AiDetection,
    pub pattern_analysis: Option<TypingAnalysis>,
    pub style_analysis: StyleAnalysis,
    pub code_change_analysis: Option<CodeChangeAnalysis>,
}

#[derive(Clone)]
pub struct MetricsAggregator {
    store: Arc<SessionStore>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(Arc::new(SessionStore::default()))
    }
}

impl MetricsAggregator {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn from_config(config: &AntiCheatConfig) -> Self {
        Self::new(Arc::new(SessionStore::from_config(config)))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Classifies and appends one event, then reports the session's updated
    /// score. The report reflects exactly this append.
    pub fn record_event(
        &self,
        session_id: &str,
        event_type: EventType,
        details: Option<Details>,
    ) -> EventAssessment {
        self.record(session_id, BehavioralEvent::new(event_type, details.unwrap_or_default()))
    }

    /// Appends an already built event, keeping its timestamp.
    pub fn record(&self, session_id: &str, event: BehavioralEvent) -> EventAssessment {
        let severity = event.severity;
        let event_type = event.event_type;
        let metrics = self
            .store
            .append(session_id, event, AggregateMetrics::from_state);

        if severity.is_flag() {
            log::info!(
                "Session {}: {} event flagged as {} (score {:.2})",
                session_id,
                event_type,
                severity,
                metrics.aggregate_score
            );
        } else {
            log::debug!(
                "Session {}: recorded {} ({}), score {:.2}",
                session_id,
                event_type,
                severity,
                metrics.aggregate_score
            );
        }
        if let Some(warning) = &metrics.warning {
            log::warn!("Session {}: {}", session_id, warning);
        }

        EventAssessment {
            event_recorded: true,
            severity,
            aggregate_score: metrics.aggregate_score,
            warning: metrics.warning,
            flags_count: metrics.flags_count,
        }
    }

    /// Metrics for a session; unknown sessions read as empty.
    pub fn metrics(&self, session_id: &str) -> AggregateMetrics {
        self.store
            .with_session(session_id, AggregateMetrics::from_state)
            .unwrap_or_default()
    }

    /// Summary for a session; unknown sessions read as empty.
    pub fn get_interview_summary(&self, session_id: &str) -> InterviewSummary {
        self.store
            .with_session(session_id, InterviewSummary::from_state)
            .unwrap_or_default()
    }

    /// Screens a code submission for signs of AI authorship. Each positive
    /// signal is recorded against the session as it is found.
    pub async fn analyze_code_submission(
        &self,
        oracle: &dyn AssessmentOracle,
        session_id: &str,
        code: &str,
        typing: Option<&TypingPatterns>,
        previous_submissions: &[String],
        change_history: &[ChangeRecord],
    ) -> SubmissionAnalysis {
        let mut is_suspicious = false;

        let ai_detection = AiDetection::from_payload(oracle.detect_ai_code(code).await);
        if ai_detection.is_suspicious && ai_detection.confidence > AI_CONFIDENCE_THRESHOLD {
            self.record_event(
                session_id,
                EventType::SuspiciousTyping,
                into_details(json!({
                    "reason": AI_DETECTED_REASON,
                    "confidence": ai_detection.confidence,
                })),
            );
            is_suspicious = true;
        }

        let pattern_analysis = typing.map(analyze_typing);
        if let Some(analysis) = pattern_analysis.as_ref().filter(|a| a.is_suspicious) {
            self.record_event(session_id, EventType::SuspiciousTyping, to_details(analysis));
            is_suspicious = true;
        }

        let style_analysis = StyleAnalysis::from_payload(
            oracle
                .analyze_code_style(code, previous_submissions)
                .await,
        );
        if style_analysis.is_too_perfect {
            self.record_event(
                session_id,
                EventType::SuspiciousTyping,
                into_details(json!({
                    "reason": TOO_PERFECT_REASON,
                    "style_consistency_score": style_analysis.style_consistency_score,
                    "indicators": style_analysis.indicators,
                })),
            );
            is_suspicious = true;
        }

        let code_change_analysis =
            (!change_history.is_empty()).then(|| analyze_code_changes(change_history));
        if let Some(analysis) = code_change_analysis.as_ref().filter(|a| a.is_suspicious) {
            self.record_event(session_id, EventType::LargeCodeChange, to_details(analysis));
            is_suspicious = true;
        }

        if is_suspicious {
            log::warn!("Session {}: submission looks suspicious", session_id);
        }

        SubmissionAnalysis {
            is_suspicious,
            ai_detection,
            pattern_analysis,
            style_analysis,
            code_change_analysis,
        }
    }
}

fn into_details(value: Value) -> Option<Details> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn to_details<T: Serialize>(value: &T) -> Option<Details> {
    serde_json::to_value(value).ok().and_then(into_details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn details(value: Value) -> Option<Details> {
        into_details(value)
    }

    fn record_n(aggregator: &MetricsAggregator, session: &str, event_type: EventType, n: usize) {
        for _ in 0..n {
            aggregator.record_event(session, event_type, None);
        }
    }

    #[test]
    fn test_record_event_reports_assessment() {
        let aggregator = MetricsAggregator::default();
        let assessment = aggregator.record_event("s", EventType::TabSwitch, None);
        assert!(assessment.event_recorded);
        assert_eq!(assessment.severity, Severity::Low);
        assert_eq!(assessment.aggregate_score, 0.02);
        assert_eq!(assessment.flags_count, 0);
        assert_eq!(assessment.warning, None);
    }

    #[test]
    fn test_tab_switch_warning_after_five() {
        let aggregator = MetricsAggregator::default();
        record_n(&aggregator, "s", EventType::TabSwitch, 4);
        let fifth = aggregator.record_event("s", EventType::TabSwitch, None);
        assert_eq!(fifth.aggregate_score, 0.1);
        assert_eq!(fifth.warning.as_deref(), Some(TAB_SWITCH_WARNING));
    }

    #[test]
    fn test_large_paste_warning_and_flags() {
        let aggregator = MetricsAggregator::default();
        aggregator.record_event("s", EventType::LargePaste, details(json!({"characters": 250})));
        let second =
            aggregator.record_event("s", EventType::LargePaste, details(json!({"characters": 600})));
        assert_eq!(second.severity, Severity::Critical);
        // first paste was medium, second critical
        assert_eq!(second.flags_count, 1);
        assert_eq!(second.aggregate_score, 0.2);
        assert_eq!(second.warning.as_deref(), Some(LARGE_PASTE_WARNING));
    }

    #[test]
    fn test_critical_warning_takes_precedence() {
        let aggregator = MetricsAggregator::default();
        record_n(&aggregator, "s", EventType::TabSwitch, 6);
        record_n(&aggregator, "s", EventType::LargePaste, 5);
        let last = aggregator.record_event("s", EventType::SuspiciousTyping, None);
        // 0.6 + 2.5 + 0.4 = 3.5 -> 0.7
        assert_eq!(last.aggregate_score, 0.7);
        assert_eq!(last.warning.as_deref(), Some(CRITICAL_WARNING));
    }

    #[test]
    fn test_score_caps_per_type_and_overall() {
        let aggregator = MetricsAggregator::default();
        record_n(&aggregator, "s", EventType::LargePaste, 25);
        // 0.5 * 10 / 5
        assert_eq!(aggregator.metrics("s").aggregate_score, 1.0);

        record_n(&aggregator, "t", EventType::TabSwitch, 40);
        assert_eq!(aggregator.metrics("t").aggregate_score, 0.2);
    }

    #[test]
    fn test_score_is_monotone() {
        let aggregator = MetricsAggregator::default();
        let sequence = [
            EventType::FocusLoss,
            EventType::TabSwitch,
            EventType::CodePaste,
            EventType::DevtoolsOpen,
            EventType::FocusLoss,
            EventType::CopyPaste,
            EventType::AiServiceRequest,
            EventType::LargePaste,
            EventType::SuspiciousTyping,
        ];
        let mut previous = 0.0;
        for round in 0..4 {
            for event_type in sequence {
                let score = aggregator.record_event("s", event_type, None).aggregate_score;
                assert!(score >= previous, "round {} {}: {} < {}", round, event_type, score, previous);
                assert!((0.0..=1.0).contains(&score));
                previous = score;
            }
        }
    }

    #[test]
    fn test_incremental_counts_match_replay() {
        let aggregator = MetricsAggregator::default();
        let mut mix = Vec::new();
        for (i, event_type) in EventType::ALL.iter().cycle().take(97).enumerate() {
            let characters = (i * 37) % 800;
            aggregator.record_event("s", *event_type, details(json!({"characters": characters})));
            mix.push(*event_type);

            let (replayed, flags_replayed, metrics) = aggregator
                .store()
                .with_session("s", |state| {
                    let flags = state.events().iter().filter(|e| e.severity.is_flag()).count();
                    (replay_score(state.events()), flags, AggregateMetrics::from_state(state))
                })
                .unwrap();
            assert_eq!(metrics.aggregate_score, replayed);
            assert_eq!(metrics.flags_count, flags_replayed);
        }
        assert_eq!(aggregator.get_interview_summary("s").total_events, mix.len());
    }

    #[test]
    fn test_summary_reads_are_idempotent() {
        let aggregator = MetricsAggregator::default();
        aggregator.record_event("s", EventType::DevtoolsOpen, None);
        aggregator.record_event("s", EventType::AiServiceRequest, details(json!({"url": "x"})));
        let first = aggregator.get_interview_summary("s");
        let second = aggregator.get_interview_summary("s");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_session_summary_is_empty() {
        let aggregator = MetricsAggregator::default();
        let summary = aggregator.get_interview_summary("nobody");
        assert_eq!(summary.total_events, 0);
        assert_eq!(summary.aggregate_score, 0.0);
        assert!(!summary.is_flagged);
        assert!(summary.timeline.is_empty());
        assert!(!aggregator.store().contains("nobody"));
    }

    #[test]
    fn test_summary_blobs_and_activity() {
        let aggregator = MetricsAggregator::default();
        aggregator.record_event("s", EventType::SuspiciousTyping, details(json!({"wpm": 40.0})));
        aggregator.record_event("s", EventType::SuspiciousTyping, details(json!({"wpm": 140.0})));
        aggregator.record_event(
            "s",
            EventType::SuspiciousTyping,
            details(json!({"style_consistency_score": 0.95})),
        );
        aggregator.record_event("s", EventType::ExternalServiceRequest, details(json!({"host": "a"})));
        aggregator.record_event("s", EventType::CallServiceRequest, None);
        aggregator.record_event("s", EventType::FrequentPaste, None);
        aggregator.record_event("s", EventType::LargePaste, details(json!({"characters": 400})));
        aggregator.record_event("s", EventType::CopyPaste, None);

        let summary = aggregator.get_interview_summary("s");
        assert_eq!(summary.typing_patterns, details(json!({"wpm": 140.0})));
        assert_eq!(
            summary.code_style_analysis,
            details(json!({"style_consistency_score": 0.95}))
        );
        assert_eq!(
            summary
                .network_activity
                .iter()
                .map(|a| a.event_type)
                .collect::<Vec<_>>(),
            vec![EventType::ExternalServiceRequest, EventType::CallServiceRequest]
        );
        assert_eq!(
            summary
                .clipboard_analysis
                .iter()
                .map(|a| a.event_type)
                .collect::<Vec<_>>(),
            vec![EventType::FrequentPaste, EventType::LargePaste]
        );
        assert_eq!(summary.events_by_type.get(&EventType::SuspiciousTyping), Some(&3));
        assert_eq!(summary.total_events, 8);
    }

    #[test]
    fn test_timeline_keeps_last_twenty() {
        let aggregator = MetricsAggregator::default();
        record_n(&aggregator, "s", EventType::FocusLoss, 25);
        aggregator.record_event("s", EventType::DevtoolsOpen, None);

        let summary = aggregator.get_interview_summary("s");
        assert_eq!(summary.timeline.len(), TIMELINE_LEN);
        let last = summary.timeline.last().unwrap();
        assert_eq!(last.event_type, EventType::DevtoolsOpen);
        assert_eq!(last.severity, Severity::Medium);
    }

    #[test]
    fn test_is_flagged_threshold_is_independent() {
        let aggregator = MetricsAggregator::default();
        record_n(&aggregator, "s", EventType::LargePaste, 5);
        let summary = aggregator.get_interview_summary("s");
        assert_eq!(summary.aggregate_score, 0.5);
        assert!(summary.is_flagged);
        // flagged, yet below the critical warning threshold
        assert_eq!(summary.warning.as_deref(), Some(LARGE_PASTE_WARNING));
    }

    #[test]
    fn test_summary_serializes_wire_names() {
        let aggregator = MetricsAggregator::default();
        aggregator.record_event("s", EventType::TabSwitch, None);
        let value = serde_json::to_value(aggregator.get_interview_summary("s")).unwrap();
        assert_eq!(value["events_by_type"]["tab_switch"], json!(1));
        assert_eq!(value["timeline"][0]["type"], json!("tab_switch"));
        assert_eq!(value["timeline"][0]["severity"], json!("low"));
    }

    struct ScriptedOracle {
        ai: Option<Value>,
        style: Option<Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AssessmentOracle for ScriptedOracle {
        async fn evaluate_code(
            &self,
            _request: &crate::assessment::EvaluationRequest<'_>,
        ) -> Option<Value> {
            None
        }

        async fn detect_ai_code(&self, _code: &str) -> Option<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ai.clone()
        }

        async fn analyze_code_style(&self, _code: &str, _previous: &[String]) -> Option<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.style.clone()
        }
    }

    #[tokio::test]
    async fn test_submission_records_each_signal() {
        let oracle = ScriptedOracle {
            ai: Some(json!({"is_suspicious": true, "confidence": "0.92", "verdict": "likely_ai"})),
            style: Some(json!({"style_consistency_score": 0.97, "is_too_perfect": true})),
            calls: AtomicUsize::new(0),
        };
        let aggregator = MetricsAggregator::default();
        let typing = TypingPatterns {
            keystroke_intervals: vec![100.0; 12],
            backspace_count: 0.0,
            total_characters: 40.0,
        };
        let changes = [ChangeRecord::new(0, 120), ChangeRecord::new(800, 3)];

        let analysis = aggregator
            .analyze_code_submission(&oracle, "s", "print(1)", Some(&typing), &[], &changes)
            .await;

        assert!(analysis.is_suspicious);
        assert_eq!(analysis.ai_detection.confidence, 0.92);
        assert!(analysis.pattern_analysis.as_ref().unwrap().is_suspicious);
        assert!(analysis.style_analysis.is_too_perfect);
        assert!(analysis.code_change_analysis.as_ref().unwrap().is_suspicious);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);

        let summary = aggregator.get_interview_summary("s");
        assert_eq!(summary.events_by_type.get(&EventType::SuspiciousTyping), Some(&3));
        assert_eq!(summary.events_by_type.get(&EventType::LargeCodeChange), Some(&1));
        assert!(summary.typing_patterns.unwrap().contains_key("wpm"));
        assert_eq!(
            summary.code_style_analysis.unwrap().get("style_consistency_score"),
            Some(&json!(0.97))
        );
    }

    #[tokio::test]
    async fn test_clean_submission_records_nothing() {
        let oracle = ScriptedOracle {
            // suspicious but not confident enough
            ai: Some(json!({"is_suspicious": true, "confidence": 0.7})),
            style: None,
            calls: AtomicUsize::new(0),
        };
        let aggregator = MetricsAggregator::default();

        let analysis = aggregator
            .analyze_code_submission(&oracle, "s", "x = 1", None, &[], &[])
            .await;

        assert!(!analysis.is_suspicious);
        assert!(analysis.ai_detection.is_suspicious);
        assert_eq!(analysis.pattern_analysis, None);
        assert_eq!(analysis.code_change_analysis, None);
        assert_eq!(analysis.style_analysis.style_consistency_score, 0.5);
        assert!(!aggregator.store().contains("s"));
    }
}
