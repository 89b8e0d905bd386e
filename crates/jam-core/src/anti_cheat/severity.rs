//! Per-event severity tiers.

use super::{detail_f64, Details, EventType, Severity};

/// Paste size (characters) at which a paste counts as large
pub const LARGE_PASTE_THRESHOLD: f64 = 200.0;

pub fn base_weight(event_type: EventType) -> f64 {
    match event_type {
        EventType::TabSwitch => 0.1,
        EventType::CopyPaste => 0.2,
        EventType::DevtoolsOpen => 0.3,
        EventType::FocusLoss => 0.05,
        EventType::LargePaste => 0.5,
        EventType::SuspiciousTyping => 0.4,
        _ => 0.1,
    }
}

/// Large pastes are tiered by size first; everything else (and pastes of
/// 200 characters or fewer) falls back to the tier of the type's weight.
pub fn classify_severity(event_type: EventType, details: &Details) -> Severity {
    if event_type == EventType::LargePaste {
        let characters = detail_f64(details, "characters").unwrap_or(0.0);
        if characters > 500.0 {
            return Severity::Critical;
        } else if characters > 300.0 {
            return Severity::High;
        } else if characters > LARGE_PASTE_THRESHOLD {
            return Severity::Medium;
        }
    }

    let weight = base_weight(event_type);
    if weight >= 0.4 {
        Severity::High
    } else if weight >= 0.2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
