//! HorizontalPodAutoscalerX controller.
//!
//! Keeps `spec.minReplicas` of a target HorizontalPodAutoscaler at
//! `max(baseline, fallback, override)`:
//!
//! ```text
//! baseline  = hpax.spec.minReplicas
//! fallback  = hpax.spec.fallback.minReplicas   once ScalingActive has been False
//!                                              for >= fallback.durationSeconds
//! override  = max(o.spec.minReplicas)          over overrides whose window
//!                                              [time, time + duration) contains now
//! ```
//!
//! The evaluators (`window`, `fallback`, `overrides`, `decision`) are pure;
//! `reconciler` sequences them against an [`client::HpaxClient`] and
//! `controller` drives the reconciler from watch events and resync ticks.

pub mod client;
pub mod controller;
pub mod decision;
pub mod fallback;
pub mod overrides;
pub mod predicate;
pub mod reconciler;
pub mod window;

/// Condition reasons written by the controller.
pub mod reason {
    pub const FALLBACK_DISABLED: &str = "FallbackDisabled";
    pub const CONDITION_UNKNOWN: &str = "ConditionUnknown";
    pub const SCALING_ACTIVE: &str = "ScalingActive";
    pub const RECENTLY_INACTIVE: &str = "RecentlyInactive";
    pub const INACTIVE_LONG_ENOUGH: &str = "InactiveLongEnough";

    pub const NO_ACTIVE_OVERRIDE: &str = "NoActiveOverride";
    pub const OVERRIDE_ACTIVE: &str = "OverrideActive";
    pub const LIST_FAILED: &str = "ListFailed";

    pub const FLOOR_APPLIED: &str = "FloorApplied";
    pub const TARGET_NOT_FOUND: &str = "TargetNotFound";
    pub const PATCH_FAILED: &str = "PatchFailed";

    pub const SCALING_ACTIVE_MISSING: &str = "ConditionMissing";
}
