//! Epiwatch - Temporal feature engineering and forward warning labels for epidemic time series
//!
//! Epiwatch turns wide cumulative counter tables into a dense per-observation
//! feature table through a deterministic pipeline: table adaptation → series
//! merge → integrity normalization → temporal features → growth and severity
//! features → policy and population context → forward labeling.
//!
//! ## Modules
//!
//! - **Pipeline**: [`WarningEngine`] runs every stage and reports data-quality issues
//! - **Encoder**: persists the labeled table as CSV or NDJSON
//! - **Dataset**: the feature/label contract for an externally fitted classifier

pub mod adapters;
pub mod config;
pub mod context;
pub mod dataset;
pub mod encoder;
pub mod error;
pub mod features;
pub mod labeler;
pub mod merger;
pub mod normalizer;
pub mod pipeline;
pub mod rolling;
pub mod temporal;
pub mod types;

pub use adapters::{JhuCsvAdapter, WideTable, WideTableAdapter};
pub use config::EngineConfig;
pub use dataset::{
    FeatureAligner, ModelArtifact, TrainingSet, WarningClassifier, FEATURE_COLUMNS,
};
pub use encoder::{OutputFormat, TableEncoder, OUTPUT_COLUMNS};
pub use error::ComputeError;
pub use pipeline::{PreparationReport, PreparedDataset, SourceTables, WarningEngine};
pub use types::{GroupKey, LabeledObservation, WarningLabel};

/// Epiwatch version recorded in model artifacts
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in model artifacts
pub const PRODUCER_NAME: &str = "epiwatch";
