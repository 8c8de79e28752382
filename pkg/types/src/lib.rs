//! Resource types shared by the registry and the controllers.

pub mod condition;
pub mod config;
pub mod hpa;
pub mod hpa_override;
pub mod hpax;
pub mod manifest;
pub mod meta;
pub mod validate;
