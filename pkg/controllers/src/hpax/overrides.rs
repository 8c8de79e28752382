use chrono::{DateTime, Utc};
use pkg_types::condition::ConditionStatus;
use pkg_types::hpa_override::HPAOverride;
use std::fmt::Display;

use super::reason;
use super::window::{is_active, window_end};

/// Result of reducing the overrides of one target to a single floor.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideOutcome {
    pub min_replicas: u32,
    /// Status of the `OverrideActive` condition.
    pub status: ConditionStatus,
    pub reason: &'static str,
    pub message: String,
    /// Names of the overrides whose window is open, sorted.
    pub active: Vec<String>,
    /// Earliest future instant at which a window opens or closes.
    pub next_boundary: Option<DateTime<Utc>>,
}

pub fn is_override_active(o: &HPAOverride, now: DateTime<Utc>) -> bool {
    is_active(now, o.spec.time, o.duration())
}

/// Reduce all overrides targeting one hpa to a suggested floor.
///
/// Total over any number of overrides; the result does not depend on their
/// order. With none active the baseline is suggested.
pub fn aggregate(baseline: u32, overrides: &[HPAOverride], now: DateTime<Utc>) -> OverrideOutcome {
    let mut active: Vec<&HPAOverride> = overrides
        .iter()
        .filter(|o| is_override_active(o, now))
        .collect();
    active.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    let next_boundary = overrides
        .iter()
        .filter_map(|o| {
            if now < o.spec.time {
                Some(o.spec.time)
            } else {
                window_end(o.spec.time, o.duration()).filter(|end| *end > now)
            }
        })
        .min();

    let Some(max) = active.iter().map(|o| o.spec.min_replicas).max() else {
        return OverrideOutcome {
            min_replicas: baseline,
            status: ConditionStatus::False,
            reason: reason::NO_ACTIVE_OVERRIDE,
            message: "no active override was found".to_string(),
            active: Vec::new(),
            next_boundary,
        };
    };

    let names: Vec<String> = active.iter().map(|o| o.metadata.name.clone()).collect();
    OverrideOutcome {
        min_replicas: max,
        status: ConditionStatus::True,
        reason: reason::OVERRIDE_ACTIVE,
        message: format!("active overrides: {} (minReplicas {})", names.join(", "), max),
        active: names,
        next_boundary,
    }
}

/// Outcome when the overrides could not be listed: degrade to the baseline.
pub fn list_failed(baseline: u32, error: &dyn Display) -> OverrideOutcome {
    OverrideOutcome {
        min_replicas: baseline,
        status: ConditionStatus::False,
        reason: reason::LIST_FAILED,
        message: format!("failed listing overrides: {}", error),
        active: Vec::new(),
        next_boundary: None,
    }
}
