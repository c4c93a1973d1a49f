//! Error types for the series pipeline.

use std::fmt;

/// Errors that can stop the pipeline.
///
/// Only the boundaries (schema checks, forecast-order parsing, file and
/// database I/O) can fail. Once a table has passed the schema check every
/// stage runs to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Required column missing, or a value that cannot be coerced to the
    /// column's semantic type
    Schema(String),
    /// Forecast-order entry that is malformed, empty or inverted
    EmptyRange { entry: String, reason: String },
    /// CSV reader/writer failure
    Csv(String),
    /// Filesystem failure
    Io(String),
    /// Invalid configuration value
    Config(String),
    /// Aggregate store failure
    Storage(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Schema(msg) => write!(f, "Schema error: {}", msg),
            PipelineError::EmptyRange { entry, reason } => {
                write!(f, "Empty range error in '{}': {}", entry, reason)
            }
            PipelineError::Csv(msg) => write!(f, "CSV error: {}", msg),
            PipelineError::Io(msg) => write!(f, "I/O error: {}", msg),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

// Conversions from other error types

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::Csv(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(format!("JSON error: {}", err))
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Storage(format!("SQL error: {}", err))
    }
}
