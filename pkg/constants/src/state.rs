//! State store / registry key constants.

/// Root prefix for every object stored in the registry.
pub const REGISTRY_PREFIX: &str = "/registry";

/// Root prefix for secondary index entries.
/// Full key = `/registry/index/<kind>/<index>/<namespace>/<value>/<name>`.
pub const INDEX_PREFIX: &str = "/registry/index";

/// Storage kind for `HorizontalPodAutoscalerX` objects.
pub const KIND_HPAX: &str = "horizontalpodautoscalerxes";

/// Storage kind for `HPAOverride` objects.
pub const KIND_HPA_OVERRIDE: &str = "hpaoverrides";

/// Storage kind for target `HorizontalPodAutoscaler` objects.
pub const KIND_HPA: &str = "horizontalpodautoscalers";

/// Capacity of the in-memory watch event ring buffer.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Capacity of the watch broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
