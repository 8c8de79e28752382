//! HorizontalPodAutoscalerX controller constants.

/// Name the controller logs and registers itself under.
pub const CONTROLLER_NAME: &str = "horizontalpodautoscalerx";

/// Secondary index on `spec.hpaTargetName`, registered for both
/// `HorizontalPodAutoscalerX` and `HPAOverride`.
pub const HPA_TARGET_NAME_INDEX: &str = "spec.hpaTargetName";

/// Number of concurrent reconcile workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Interval between full resync passes, in seconds.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30;

/// Requeue delay after the target autoscaler was not found, in seconds.
pub const DEFAULT_NOT_FOUND_REQUEUE_SECS: u64 = 30;

/// Upper bound for a single reconciliation, in seconds.
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 10;

/// First retry delay after a failed reconciliation, in milliseconds.
/// Doubles on every consecutive failure of the same key.
pub const BACKOFF_BASE_MILLIS: u64 = 500;

/// Cap for the per-key retry delay, in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;

/// Longest fallback or override duration accepted by validation (ten years).
pub const MAX_DURATION_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;
