//! Embedded state for the hpax controller.
//!
//! `StateStore` is the raw SlateDB key/value layer. `Registry` builds the
//! object API the controller runs against on top of it: typed get/list,
//! optimistic concurrency on resource versions, merge patches, status
//! writes, secondary indexes and a watch event log.

pub mod client;
pub mod error;
pub mod registry;
pub mod watch;

pub use error::{StoreError, StoreResult};
pub use registry::Registry;
