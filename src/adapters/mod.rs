//! Source table adapters
//!
//! This module provides adapters that parse raw wide-format tables (one row per
//! location, one column per date, cells holding cumulative counts) into typed
//! `WideTable`s ready for merging.

mod jhu;

pub use jhu::JhuCsvAdapter;

use crate::error::ComputeError;
use crate::types::Metric;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One location row of a wide table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub region: String,
    /// Sub-region as it appeared in the source, `None` when blank
    pub sub_region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Cumulative counts aligned with `WideTable::dates`
    pub values: Vec<Option<f64>>,
}

/// A parsed wide-format cumulative counter table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideTable {
    pub metric: Metric,
    /// Date of each value column, in source order
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn new(metric: Metric, dates: Vec<NaiveDate>) -> Self {
        Self {
            metric,
            dates,
            rows: Vec::new(),
        }
    }

    /// Append a row; its values must align with the table's dates.
    ///
    /// NaN cells become missing and infinite cells are rejected, the same rule
    /// the CSV adapter applies.
    pub fn push_row(&mut self, mut row: WideRow) -> Result<(), ComputeError> {
        if row.values.len() != self.dates.len() {
            return Err(ComputeError::ParseError(format!(
                "{} row for {} has {} values, expected {}",
                self.metric,
                row.region,
                row.values.len(),
                self.dates.len()
            )));
        }

        let metric = self.metric;
        let region = row.region.clone();
        let check = |value: Option<f64>, column: &str| {
            finite_cell(value).map_err(|v| {
                ComputeError::ParseError(format!(
                    "{metric} row for {region}, column {column}: non-finite value {v}"
                ))
            })
        };

        row.latitude = check(row.latitude, "latitude")?;
        row.longitude = check(row.longitude, "longitude")?;
        for (value, date) in row.values.iter_mut().zip(&self.dates) {
            *value = check(*value, &date.to_string())?;
        }

        self.rows.push(row);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Trait for wide-table source adapters
pub trait WideTableAdapter {
    /// Parse raw table text for one metric
    fn parse(&self, raw: &str, metric: Metric) -> Result<WideTable, ComputeError>;
}

/// NaN becomes missing; infinite values are returned as the error
pub(crate) fn finite_cell(value: Option<f64>) -> Result<Option<f64>, f64> {
    match value {
        Some(v) if v.is_nan() => Ok(None),
        Some(v) if v.is_infinite() => Err(v),
        other => Ok(other),
    }
}
