use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Condition status ---

/// Tri-state status shared by managed conditions and the target's conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

// --- Condition type ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// Whether the last reconciliation converged the target.
    Ready,
    /// Whether a fallback is pending (inactivity observed, not yet acted on).
    FallbackActive,
    /// Whether at least one override window is currently open.
    OverrideActive,
    /// Mirror of the target autoscaler's own `ScalingActive` signal.
    ScalingActive,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionType::Ready => write!(f, "Ready"),
            ConditionType::FallbackActive => write!(f, "FallbackActive"),
            ConditionType::OverrideActive => write!(f, "OverrideActive"),
            ConditionType::ScalingActive => write!(f, "ScalingActive"),
        }
    }
}

// --- Condition ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub observed_generation: Option<u64>,
    #[serde(default)]
    pub hpa_observed_generation: Option<u64>,
}

/// A condition value to record, without its transition time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionUpdate {
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: Option<u64>,
    pub hpa_observed_generation: Option<u64>,
}

impl ConditionUpdate {
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type,
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation: None,
            hpa_observed_generation: None,
        }
    }

    pub fn observed(mut self, generation: Option<u64>, hpa_generation: Option<u64>) -> Self {
        self.observed_generation = generation;
        self.hpa_observed_generation = hpa_generation;
        self
    }
}

// --- Conditions ---

/// Ordered set of conditions, at most one per type.
///
/// New types are appended, so insertion order is preserved; existing types
/// are updated in place. The type set is closed, so lookups scan at most
/// four entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.condition_type == condition_type)
    }

    pub fn status_of(&self, condition_type: ConditionType) -> ConditionStatus {
        self.get(condition_type)
            .map(|c| c.status)
            .unwrap_or(ConditionStatus::Unknown)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Record `update`, returning whether the stored conditions changed.
    ///
    /// `last_transition_time` moves to `now` only when the status differs from
    /// the stored one (or the type is new); reason, message and observed
    /// generations are always overwritten.
    pub fn set(&mut self, update: ConditionUpdate, now: DateTime<Utc>) -> bool {
        let position = self
            .0
            .iter()
            .position(|c| c.condition_type == update.condition_type);

        match position {
            Some(i) => {
                let existing = &self.0[i];
                let last_transition_time = if existing.status == update.status {
                    existing.last_transition_time
                } else {
                    now
                };
                let next = Condition {
                    condition_type: update.condition_type,
                    status: update.status,
                    last_transition_time,
                    reason: update.reason,
                    message: update.message,
                    observed_generation: update.observed_generation,
                    hpa_observed_generation: update.hpa_observed_generation,
                };
                if *existing == next {
                    return false;
                }
                self.0[i] = next;
                true
            }
            None => {
                self.0.push(Condition {
                    condition_type: update.condition_type,
                    status: update.status,
                    last_transition_time: now,
                    reason: update.reason,
                    message: update.message,
                    observed_generation: update.observed_generation,
                    hpa_observed_generation: update.hpa_observed_generation,
                });
                true
            }
        }
    }
}
