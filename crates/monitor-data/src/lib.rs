//! Data layer of the market monitor.
//!
//! Discovers and decodes weekly extracts, runs the transformation chain
//! (dedup, attribute mapping, weekly figures, pivot, rule report, target
//! classification, tier join) and reads/writes the CSV artifacts between
//! stages.

pub mod aggregator;
pub mod artifacts;
pub mod dedup;
pub mod mapping;
pub mod metrics;
pub mod reader;
pub mod report;
pub mod table;
pub mod targets;
pub mod tiers;

pub use monitor_core as core;
