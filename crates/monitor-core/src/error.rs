use std::path::PathBuf;
use thiserror::Error;

use crate::models::Stage;

/// All errors produced by the market monitor.
///
/// Structural problems (missing columns, missing files) are errors and abort
/// the stage that hit them. Record-level data-quality problems are never
/// errors; see [`crate::models::DataQualityWarning`].
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A required column is absent from a table.
    #[error("Missing required column \"{column}\" in {stage}")]
    Schema { stage: Stage, column: String },

    /// The week directory holds no extract files.
    #[error("No extract files found in {0}")]
    NoExtractFiles(PathBuf),

    /// A reference table could not be found on disk.
    #[error("Reference table not found: {0}")]
    ReferenceTableMissing(PathBuf),

    /// A stage artifact expected from an earlier run is absent.
    #[error("Stage artifact not found: {0}")]
    ArtifactMissing(PathBuf),

    /// A per-id fetch kept failing after every retry attempt.
    #[error("Fetch for {app_id} failed after {attempts} attempts: {message}")]
    Network {
        app_id: String,
        attempts: u32,
        message: String,
    },

    /// A structural failure, tagged with the stage that raised it.
    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<MonitorError>,
    },

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A week tag did not match `MMDD-MMDD`.
    #[error("Invalid week tag: {0}")]
    InvalidWeekTag(String),

    /// A delimited file could not be parsed or written.
    #[error("CSV error: {0}")]
    Csv(String),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MonitorError {
    /// Tag `self` with the stage that raised it.
    ///
    /// Errors that already carry a stage are returned unchanged so the
    /// innermost stage name wins.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            MonitorError::Stage { .. } => self,
            other => MonitorError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage named by this error, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            MonitorError::Stage { stage, .. } | MonitorError::Schema { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the monitor crates.
pub type Result<T> = std::result::Result<T, MonitorError>;
