pub mod hpax;
pub mod queue;
