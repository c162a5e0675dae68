//! Runtime layer of the market monitor.
//!
//! Sequences the weekly stages, persists their artifacts, and drives the
//! bounded per-country fetch that feeds the tier join.

pub mod fetch_pool;
pub mod orchestrator;

pub use monitor_core as core;
pub use monitor_data as data;
