//! Error types for Epiwatch

use crate::types::Metric;
use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse source table: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing mandatory source table: {0}")]
    MissingSource(Metric),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Feature mismatch, missing columns: {}", missing.join(", "))]
    FeatureMismatch { missing: Vec<String> },

    #[error("Prediction error: {0}")]
    PredictionError(String),
}
