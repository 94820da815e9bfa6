//! Feature table encoding
//!
//! This module flattens labeled observations into one record per row and
//! writes them as CSV or newline-delimited JSON. Column order is fixed by
//! [`OUTPUT_COLUMNS`]; undefined values become empty CSV cells or JSON `null`.

use crate::error::ComputeError;
use crate::types::LabeledObservation;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Column order of the persisted feature table
pub const OUTPUT_COLUMNS: [&str; 44] = [
    "region",
    "sub_region",
    "date",
    "latitude",
    "longitude",
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
    "phase",
    "vaccine_period",
    "is_lockdown",
    "is_post_vaccine",
    "population",
    "population_imputed",
    "cases_per_100k",
    "deaths_per_100k",
    "future_growth_rate",
    "future_cases_per_100k",
    "future_doubling_time",
    "future_cfr",
    "risk_score",
    "warning_label",
];

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Ndjson,
}

impl OutputFormat {
    /// Guess the format from a file extension, defaulting to CSV
    pub fn from_path(path: &Path) -> Self {
        let is_ndjson = |ext: &str| {
            ext.eq_ignore_ascii_case("ndjson") || ext.eq_ignore_ascii_case("jsonl")
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if is_ndjson(ext) => OutputFormat::Ndjson,
            _ => OutputFormat::Csv,
        }
    }
}

/// One flat output row; field order matches [`OUTPUT_COLUMNS`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord<'a> {
    pub region: &'a str,
    pub sub_region: &'a str,
    pub date: NaiveDate,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confirmed: f64,
    pub deaths: f64,
    pub recovered: f64,
    pub daily_cases: f64,
    pub daily_deaths: f64,
    pub daily_recovered: f64,
    pub cases_7d_avg: f64,
    pub deaths_7d_avg: f64,
    pub day_of_week: u32,
    pub month: u32,
    pub quarter: u32,
    pub year: i32,
    pub is_weekend: u8,
    pub days_since_start: i64,
    pub days_since_threshold: Option<i64>,
    pub growth_rate: Option<f64>,
    pub death_growth: Option<f64>,
    pub acceleration: Option<f64>,
    pub doubling_time: Option<f64>,
    pub log_cases: f64,
    pub log_deaths: f64,
    pub cfr: f64,
    pub active_cases: f64,
    pub recovery_rate: f64,
    pub death_to_case_ratio: f64,
    pub phase: &'static str,
    pub vaccine_period: &'static str,
    pub is_lockdown: u8,
    pub is_post_vaccine: u8,
    pub population: f64,
    pub population_imputed: u8,
    pub cases_per_100k: f64,
    pub deaths_per_100k: f64,
    pub future_growth_rate: Option<f64>,
    pub future_cases_per_100k: Option<f64>,
    pub future_doubling_time: Option<f64>,
    pub future_cfr: Option<f64>,
    pub risk_score: Option<u8>,
    pub warning_label: Option<&'static str>,
}

impl<'a> From<&'a LabeledObservation> for FeatureRecord<'a> {
    fn from(row: &'a LabeledObservation) -> Self {
        let contextual = &row.contextual;
        let derived = &contextual.derived;
        let temporal = &derived.temporal;
        let cleaned = &temporal.cleaned;

        Self {
            region: &cleaned.key.region,
            sub_region: &cleaned.key.sub_region,
            date: cleaned.date,
            latitude: cleaned.latitude,
            longitude: cleaned.longitude,
            confirmed: cleaned.confirmed,
            deaths: cleaned.deaths,
            recovered: cleaned.recovered,
            daily_cases: cleaned.daily_cases,
            daily_deaths: cleaned.daily_deaths,
            daily_recovered: cleaned.daily_recovered,
            cases_7d_avg: cleaned.cases_7d_avg,
            deaths_7d_avg: cleaned.deaths_7d_avg,
            day_of_week: temporal.day_of_week,
            month: temporal.month,
            quarter: temporal.quarter,
            year: temporal.year,
            is_weekend: flag(temporal.is_weekend),
            days_since_start: temporal.days_since_start,
            days_since_threshold: temporal.days_since_threshold,
            growth_rate: derived.growth_rate,
            death_growth: derived.death_growth,
            acceleration: derived.acceleration,
            doubling_time: derived.doubling_time,
            log_cases: derived.log_cases,
            log_deaths: derived.log_deaths,
            cfr: derived.cfr,
            active_cases: derived.active_cases,
            recovery_rate: derived.recovery_rate,
            death_to_case_ratio: derived.death_to_case_ratio,
            phase: contextual.phase.as_str(),
            vaccine_period: contextual.vaccine_period.as_str(),
            is_lockdown: flag(contextual.is_lockdown),
            is_post_vaccine: flag(contextual.is_post_vaccine),
            population: contextual.population,
            population_imputed: flag(contextual.population_imputed),
            cases_per_100k: contextual.cases_per_100k,
            deaths_per_100k: contextual.deaths_per_100k,
            future_growth_rate: row.future.growth_rate,
            future_cases_per_100k: row.future.cases_per_100k,
            future_doubling_time: row.future.doubling_time,
            future_cfr: row.future.cfr,
            risk_score: row.risk_score,
            warning_label: row.warning_label.map(|label| label.as_str()),
        }
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

/// Encoder for the persisted feature table
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEncoder {
    format: OutputFormat,
}

impl TableEncoder {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Encode all rows into a single buffer
    pub fn encode(&self, rows: &[LabeledObservation]) -> Result<String, ComputeError> {
        match self.format {
            OutputFormat::Csv => to_csv(rows),
            OutputFormat::Ndjson => to_ndjson(rows),
        }
    }

    /// Encode all rows, then write the finished buffer to `path`.
    ///
    /// Nothing touches the filesystem until encoding has succeeded.
    pub fn write_to_path(
        &self,
        rows: &[LabeledObservation],
        path: impl AsRef<Path>,
    ) -> Result<(), ComputeError> {
        let encoded = self.encode(rows)?;
        fs::write(path.as_ref(), encoded)?;
        log::info!("wrote {} rows to {}", rows.len(), path.as_ref().display());
        Ok(())
    }
}

/// Encode rows as CSV with a header, even when there are no rows
pub fn to_csv(rows: &[LabeledObservation]) -> Result<String, ComputeError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(OUTPUT_COLUMNS)?;
    for row in rows {
        writer.serialize(FeatureRecord::from(row))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ComputeError::EncodingError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ComputeError::EncodingError(e.to_string()))
}

/// Encode rows as newline-delimited JSON objects
pub fn to_ndjson(rows: &[LabeledObservation]) -> Result<String, ComputeError> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(&FeatureRecord::from(row))?);
        out.push('\n');
    }
    Ok(out)
}
