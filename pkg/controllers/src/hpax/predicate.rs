//! Change-relevance filters for watch events.

use chrono::{DateTime, Utc};
use pkg_types::condition::ConditionStatus;
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::hpa_override::HPAOverride;
use pkg_types::hpax::HorizontalPodAutoscalerX;

/// Creates and deletes are always relevant; updates go through `changed`.
pub fn is_relevant<T>(old: Option<&T>, new: Option<&T>, changed: fn(&T, &T) -> bool) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => changed(old, new),
        (None, None) => false,
        _ => true,
    }
}

fn scaling_active_signal(
    hpa: &HorizontalPodAutoscaler,
) -> Option<(ConditionStatus, Option<DateTime<Utc>>)> {
    hpa.scaling_active()
        .map(|c| (c.status, c.last_transition_time))
}

/// Target hpa: the floor or the `ScalingActive` (status, transition) pair moved.
pub fn hpa_changed(old: &HorizontalPodAutoscaler, new: &HorizontalPodAutoscaler) -> bool {
    old.spec.min_replicas != new.spec.min_replicas
        || scaling_active_signal(old) != scaling_active_signal(new)
}

/// Managed resource: spec edit (generation) or annotation change.
pub fn hpax_changed(old: &HorizontalPodAutoscalerX, new: &HorizontalPodAutoscalerX) -> bool {
    old.metadata.generation != new.metadata.generation
        || old.metadata.annotations != new.metadata.annotations
}

/// Override: spec edit only.
pub fn override_changed(old: &HPAOverride, new: &HPAOverride) -> bool {
    old.metadata.generation != new.metadata.generation
}
