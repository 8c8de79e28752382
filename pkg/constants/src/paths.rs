//! Filesystem path constants.

// ─── Controller ────────────────────────────────────────────────────────────

/// Default config file path for the controller.
pub const DEFAULT_CONTROLLER_CONFIG: &str = "/etc/hpax/config.yaml";

/// Default data directory for the controller state store.
pub const DEFAULT_CONTROLLER_DATA_DIR: &str = "/tmp/hpax-data";
