//! Anti-cheat telemetry aggregation.
//!
//! The browser reports behavioral events (tab switches, pastes, typing cadence,
//! calls to external services) for each interview session. Each event gets a
//! severity tier on arrival, is appended to the session's history in the
//! [`SessionStore`], and the session's trust score and warning are recomputed
//! from that history by the [`MetricsAggregator`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::errors::JamError;

pub mod aggregator;
pub mod code_changes;
pub mod severity;
pub mod store;
pub mod typing;

pub use aggregator::{
    AggregateMetrics, EventAssessment, InterviewSummary, MetricsAggregator, SubmissionAnalysis,
    TimelineEntry,
};
pub use code_changes::{analyze_code_changes, ChangeBurst, ChangeRecord, CodeChangeAnalysis};
pub use severity::{base_weight, classify_severity};
pub use store::{SessionState, SessionStore};
pub use typing::{analyze_typing, TypingAnalysis, TypingPatterns};

/// Free-form key/value payload attached to an event
pub type Details = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TabSwitch,
    CopyPaste,
    DevtoolsOpen,
    FocusLoss,
    LargePaste,
    SuspiciousTyping,
    CodeChangeTimestamp,
    LargeCodeChange,
    ExternalServiceRequest,
    AiServiceRequest,
    CallServiceRequest,
    FrequentPaste,
    CodePaste,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::TabSwitch,
        EventType::CopyPaste,
        EventType::DevtoolsOpen,
        EventType::FocusLoss,
        EventType::LargePaste,
        EventType::SuspiciousTyping,
        EventType::CodeChangeTimestamp,
        EventType::LargeCodeChange,
        EventType::ExternalServiceRequest,
        EventType::AiServiceRequest,
        EventType::CallServiceRequest,
        EventType::FrequentPaste,
        EventType::CodePaste,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TabSwitch => "tab_switch",
            EventType::CopyPaste => "copy_paste",
            EventType::DevtoolsOpen => "devtools_open",
            EventType::FocusLoss => "focus_loss",
            EventType::LargePaste => "large_paste",
            EventType::SuspiciousTyping => "suspicious_typing",
            EventType::CodeChangeTimestamp => "code_change_timestamp",
            EventType::LargeCodeChange => "large_code_change",
            EventType::ExternalServiceRequest => "external_service_request",
            EventType::AiServiceRequest => "ai_service_request",
            EventType::CallServiceRequest => "call_service_request",
            EventType::FrequentPaste => "frequent_paste",
            EventType::CodePaste => "code_paste",
        }
    }

    pub fn is_network_activity(&self) -> bool {
        matches!(
            self,
            EventType::ExternalServiceRequest
                | EventType::AiServiceRequest
                | EventType::CallServiceRequest
        )
    }

    pub fn is_clipboard_activity(&self) -> bool {
        matches!(self, EventType::LargePaste | EventType::FrequentPaste)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = JamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| JamError::ValidationError(format!("Unknown event type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// High and critical events count as flags
    pub fn is_flag(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified event. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralEvent {
    pub event_type: EventType,
    pub details: Details,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

impl BehavioralEvent {
    pub fn new(event_type: EventType, details: Details) -> Self {
        Self::at(event_type, details, Utc::now())
    }

    pub fn at(event_type: EventType, details: Details, timestamp: DateTime<Utc>) -> Self {
        let severity = classify_severity(event_type, &details);
        Self {
            event_type,
            details,
            timestamp,
            severity,
        }
    }
}

/// Reads a numeric detail, accepting numbers or numeric strings.
pub(crate) fn detail_f64(details: &Details, key: &str) -> Option<f64> {
    match details.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
