pub mod error;
pub mod formatting;
pub mod ids;
pub mod layout;
pub mod models;
pub mod rule_config;
pub mod rules;
pub mod settings;
pub mod stats;
pub mod time_utils;
