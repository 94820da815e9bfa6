//! Training and inference contract
//!
//! The classifier itself is fitted outside this crate. This module fixes what
//! crosses that boundary: the ordered numeric feature list, the labeled
//! training set extracted from a prepared table, the classifier trait, and
//! the artifact that bundles a fitted classifier with its feature order.
//!
//! Future metrics and the risk score are label inputs and never appear in
//! [`FEATURE_COLUMNS`].

use crate::error::ComputeError;
use crate::types::{LabeledObservation, WarningLabel};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use uuid::Uuid;

/// One feature row in [`FEATURE_COLUMNS`] order; `None` marks an undefined value
pub type FeatureVector = Vec<Option<f64>>;

/// Ordered numeric features handed to a classifier
pub const FEATURE_COLUMNS: [&str; 30] = [
    "confirmed",
    "deaths",
    "recovered",
    "daily_cases",
    "daily_deaths",
    "daily_recovered",
    "cases_7d_avg",
    "deaths_7d_avg",
    "day_of_week",
    "month",
    "quarter",
    "year",
    "is_weekend",
    "days_since_start",
    "days_since_threshold",
    "growth_rate",
    "death_growth",
    "acceleration",
    "doubling_time",
    "log_cases",
    "log_deaths",
    "cfr",
    "active_cases",
    "recovery_rate",
    "death_to_case_ratio",
    "is_lockdown",
    "is_post_vaccine",
    "population",
    "cases_per_100k",
    "deaths_per_100k",
];

/// Feature vector of one labeled row, in [`FEATURE_COLUMNS`] order
pub fn feature_vector(row: &LabeledObservation) -> FeatureVector {
    let contextual = &row.contextual;
    let derived = &contextual.derived;
    let temporal = &derived.temporal;
    let cleaned = &temporal.cleaned;
    let flag = |b: bool| Some(if b { 1.0 } else { 0.0 });

    vec![
        Some(cleaned.confirmed),
        Some(cleaned.deaths),
        Some(cleaned.recovered),
        Some(cleaned.daily_cases),
        Some(cleaned.daily_deaths),
        Some(cleaned.daily_recovered),
        Some(cleaned.cases_7d_avg),
        Some(cleaned.deaths_7d_avg),
        Some(f64::from(temporal.day_of_week)),
        Some(f64::from(temporal.month)),
        Some(f64::from(temporal.quarter)),
        Some(f64::from(temporal.year)),
        flag(temporal.is_weekend),
        Some(temporal.days_since_start as f64),
        temporal.days_since_threshold.map(|d| d as f64),
        derived.growth_rate,
        derived.death_growth,
        derived.acceleration,
        derived.doubling_time,
        Some(derived.log_cases),
        Some(derived.log_deaths),
        Some(derived.cfr),
        Some(derived.active_cases),
        Some(derived.recovery_rate),
        Some(derived.death_to_case_ratio),
        flag(contextual.is_lockdown),
        flag(contextual.is_post_vaccine),
        Some(contextual.population),
        Some(contextual.cases_per_100k),
        Some(contextual.deaths_per_100k),
    ]
}

/// Labeled feature matrix ready for an external fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub features: Vec<FeatureVector>,
    pub labels: Vec<WarningLabel>,
    /// Rows excluded because their label was undefined
    pub dropped_unlabeled: usize,
}

impl TrainingSet {
    /// Build a training set, dropping rows without a label
    pub fn from_observations(rows: &[LabeledObservation]) -> Self {
        let mut features = Vec::new();
        let mut labels = Vec::new();

        for row in rows {
            if let Some(label) = row.warning_label {
                features.push(feature_vector(row));
                labels.push(label);
            }
        }

        let dropped_unlabeled = rows.len() - labels.len();
        if dropped_unlabeled > 0 {
            log::debug!("dropped {dropped_unlabeled} rows with undefined label");
        }

        Self {
            feature_names: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            features,
            labels,
            dropped_unlabeled,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Distinct labels present, in ascending severity
    ///
    /// The order follows `WarningLabel`'s `Ord` (LOW_MONITORING <
    /// MODERATE_MEASURES < HIGH_RESTRICTIONS < CRITICAL_LOCKDOWN), not the
    /// alphabetical order of the label strings. Probability columns from
    /// `predict_proba` line up with this order.
    pub fn classes(&self) -> Vec<WarningLabel> {
        self.class_distribution().into_keys().collect()
    }

    /// Sample count per label
    pub fn class_distribution(&self) -> BTreeMap<WarningLabel, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }
}

/// Classifier fitted outside the crate
pub trait WarningClassifier {
    /// Predict one label per feature row
    fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<WarningLabel>, ComputeError>;

    /// Class probabilities per row, columns in the artifact's severity-ordered classes.
    ///
    /// Classifiers without probability estimates return `Ok(None)`.
    fn predict_proba(
        &self,
        _rows: &[FeatureVector],
    ) -> Result<Option<Vec<Vec<f64>>>, ComputeError> {
        Ok(None)
    }
}

/// Provenance of a fitted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub artifact_id: String,
    pub fitted_at: DateTime<Utc>,
    pub accuracy: f64,
    pub n_train_samples: usize,
    pub n_test_samples: usize,
    pub n_features: usize,
    pub model_type: String,
    /// Free-form hyperparameters or notes
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    pub producer: String,
    pub engine_version: String,
}

impl ArtifactMetadata {
    pub fn new(
        model_type: impl Into<String>,
        accuracy: f64,
        n_train_samples: usize,
        n_test_samples: usize,
    ) -> Self {
        Self {
            artifact_id: Uuid::new_v4().to_string(),
            fitted_at: Utc::now(),
            accuracy,
            n_train_samples,
            n_test_samples,
            n_features: FEATURE_COLUMNS.len(),
            model_type: model_type.into(),
            params: HashMap::new(),
            producer: PRODUCER_NAME.to_string(),
            engine_version: ENGINE_VERSION.to_string(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Fitted classifier plus the feature order it was fitted on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact<C> {
    pub classifier: C,
    pub feature_names: Vec<String>,
    pub classes: Vec<WarningLabel>,
    pub metadata: ArtifactMetadata,
}

impl<C: WarningClassifier> ModelArtifact<C> {
    /// Bundle a classifier fitted on `training`
    pub fn new(classifier: C, training: &TrainingSet, metadata: ArtifactMetadata) -> Self {
        Self {
            classifier,
            feature_names: training.feature_names.clone(),
            classes: training.classes(),
            metadata,
        }
    }

    pub fn aligner(&self) -> FeatureAligner {
        FeatureAligner::new(self.feature_names.clone())
    }

    /// Align a caller-supplied table to the artifact's feature order and predict
    pub fn predict_table(
        &self,
        columns: &[String],
        rows: &[FeatureVector],
    ) -> Result<Vec<WarningLabel>, ComputeError> {
        let aligned = self.aligner().align(columns, rows)?;
        let predictions = self.classifier.predict(&aligned)?;
        if predictions.len() != aligned.len() {
            return Err(ComputeError::PredictionError(format!(
                "classifier returned {} predictions for {} rows",
                predictions.len(),
                aligned.len()
            )));
        }
        Ok(predictions)
    }
}

/// Reorders caller-supplied columns into a fixed feature order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureAligner {
    feature_names: Vec<String>,
}

impl FeatureAligner {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self { feature_names }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Positions of the expected features within `columns`.
    ///
    /// Extra columns are ignored; any missing feature is an error listing all
    /// of them.
    pub fn column_indices(&self, columns: &[String]) -> Result<Vec<usize>, ComputeError> {
        let positions: HashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut indices = Vec::with_capacity(self.feature_names.len());
        let mut missing = Vec::new();
        for name in &self.feature_names {
            match positions.get(name.as_str()) {
                Some(&i) => indices.push(i),
                None => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(ComputeError::FeatureMismatch { missing });
        }
        Ok(indices)
    }

    /// Reorder every row of a table with header `columns`
    pub fn align(
        &self,
        columns: &[String],
        rows: &[FeatureVector],
    ) -> Result<Vec<FeatureVector>, ComputeError> {
        let indices = self.column_indices(columns)?;

        rows.iter()
            .enumerate()
            .map(|(line, row)| {
                if row.len() != columns.len() {
                    return Err(ComputeError::FeatureMismatch {
                        missing: vec![format!(
                            "row {line} has {} values, header has {}",
                            row.len(),
                            columns.len()
                        )],
                    });
                }
                Ok(indices.iter().map(|&i| row[i]).collect())
            })
            .collect()
    }
}

/// Per-class precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Fraction of predictions matching the truth, `None` for no samples
pub fn accuracy(truth: &[WarningLabel], predicted: &[WarningLabel]) -> Option<f64> {
    if truth.is_empty() || truth.len() != predicted.len() {
        return None;
    }
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    Some(correct as f64 / truth.len() as f64)
}

/// Per-class metrics for every label seen in truth or predictions.
///
/// Undefined ratios resolve to 0.
pub fn class_report(
    truth: &[WarningLabel],
    predicted: &[WarningLabel],
) -> BTreeMap<WarningLabel, ClassMetrics> {
    let mut report = BTreeMap::new();
    let labels: BTreeSet<WarningLabel> = truth.iter().chain(predicted).copied().collect();

    for label in labels {
        let true_positive = truth
            .iter()
            .zip(predicted)
            .filter(|(t, p)| **t == label && **p == label)
            .count();
        let predicted_positive = predicted.iter().filter(|p| **p == label).count();
        let support = truth.iter().filter(|t| **t == label).count();

        let precision = fraction(true_positive, predicted_positive);
        let recall = fraction(true_positive, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        report.insert(
            label,
            ClassMetrics {
                precision,
                recall,
                f1,
                support,
            },
        );
    }
    report
}

fn fraction(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
