//! Core types for the Epiwatch pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw merged observations, cleaned observations, temporal and derived
//! features, policy context, and forward labels. Each stage wraps the output of
//! the previous one and appends its own fields.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sub-region sentinel used when a series has no sub-region
pub const ALL_SUB_REGIONS: &str = "All";

/// Observations partitioned by series, each vector sorted by date
pub type Partition<T> = BTreeMap<GroupKey, Vec<T>>;

/// Cumulative counter carried by a source table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Confirmed,
    Deaths,
    Recovered,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Confirmed => "confirmed",
            Metric::Deaths => "deaths",
            Metric::Recovered => "recovered",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one independent time series
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// Region (country) name
    pub region: String,
    /// Sub-region (province/state) name, `"All"` when absent
    pub sub_region: String,
}

impl GroupKey {
    /// Build a key, mapping a missing or blank sub-region to the `"All"` sentinel
    pub fn new(region: impl Into<String>, sub_region: Option<&str>) -> Self {
        let sub_region = match sub_region.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => ALL_SUB_REGIONS.to_string(),
        };
        Self {
            region: region.into().trim().to_string(),
            sub_region,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.sub_region)
    }
}

/// One merged observation before integrity normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub key: GroupKey,
    pub date: NaiveDate,
    /// Cumulative confirmed cases
    pub confirmed: Option<f64>,
    /// Cumulative deaths
    pub deaths: Option<f64>,
    /// Cumulative recoveries
    pub recovered: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Observation with enforced cumulative invariants and daily deltas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedObservation {
    pub key: GroupKey,
    pub date: NaiveDate,
    /// Cumulative confirmed (running maximum)
    pub confirmed: f64,
    /// Cumulative deaths (running maximum)
    pub deaths: f64,
    /// Cumulative recoveries (running maximum)
    pub recovered: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// New cases, non-negative and capped at the series' upper percentile
    pub daily_cases: f64,
    /// New deaths, non-negative and capped at the series' upper percentile
    pub daily_deaths: f64,
    /// New recoveries, non-negative (not capped)
    pub daily_recovered: f64,
    /// Trailing mean of daily cases
    pub cases_7d_avg: f64,
    /// Trailing mean of daily deaths
    pub deaths_7d_avg: f64,
}

/// Calendar and series-relative clock features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalObservation {
    /// Source cleaned observation
    pub cleaned: CleanedObservation,
    /// Weekday index, 0 = Monday
    pub day_of_week: u32,
    pub month: u32,
    pub quarter: u32,
    pub year: i32,
    pub is_weekend: bool,
    /// Days since the earliest date across all series
    pub days_since_start: i64,
    /// Days since the series first reached the case threshold
    pub days_since_threshold: Option<i64>,
}

/// Growth and severity metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedObservation {
    /// Source temporal observation
    pub temporal: TemporalObservation,
    /// Fractional change in daily cases, noise-floor guarded
    pub growth_rate: Option<f64>,
    /// Fractional change in daily deaths, noise-floor guarded
    pub death_growth: Option<f64>,
    /// First difference of growth rate
    pub acceleration: Option<f64>,
    /// Days for cases to double at the current growth rate
    pub doubling_time: Option<f64>,
    /// ln(1 + daily cases)
    pub log_cases: f64,
    /// ln(1 + daily deaths)
    pub log_deaths: f64,
    /// Case-fatality rate (percentage)
    pub cfr: f64,
    pub active_cases: f64,
    /// Recovered / confirmed (0-1)
    pub recovery_rate: f64,
    pub death_to_case_ratio: f64,
}

/// Intervention policy phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionPhase {
    PreIntervention,
    Lockdown,
    Reopening,
    PostReopening,
}

impl InterventionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionPhase::PreIntervention => "pre_intervention",
            InterventionPhase::Lockdown => "lockdown",
            InterventionPhase::Reopening => "reopening",
            InterventionPhase::PostReopening => "post_reopening",
        }
    }
}

/// Vaccine availability period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaccinePeriod {
    PreVaccine,
    PostVaccine,
}

impl VaccinePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaccinePeriod::PreVaccine => "pre_vaccine",
            VaccinePeriod::PostVaccine => "post_vaccine",
        }
    }
}

/// Policy context and population-normalized metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualObservation {
    /// Source derived observation
    pub derived: DerivedObservation,
    pub phase: InterventionPhase,
    pub vaccine_period: VaccinePeriod,
    pub is_lockdown: bool,
    pub is_post_vaccine: bool,
    /// Population used for normalization, never zero
    pub population: f64,
    /// True when population came from the median fallback
    pub population_imputed: bool,
    pub cases_per_100k: f64,
    pub deaths_per_100k: f64,
}

impl ContextualObservation {
    pub fn key(&self) -> &GroupKey {
        &self.derived.temporal.cleaned.key
    }

    pub fn date(&self) -> NaiveDate {
        self.derived.temporal.cleaned.date
    }

    pub fn cleaned(&self) -> &CleanedObservation {
        &self.derived.temporal.cleaned
    }
}

/// Metric values observed `horizon` observations ahead in the same series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardMetrics {
    pub growth_rate: Option<f64>,
    pub cases_per_100k: Option<f64>,
    pub doubling_time: Option<f64>,
    pub cfr: Option<f64>,
}

/// Forward-looking intervention severity label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningLabel {
    LowMonitoring,
    ModerateMeasures,
    HighRestrictions,
    CriticalLockdown,
}

impl WarningLabel {
    /// All labels in ascending severity
    pub const ALL: [WarningLabel; 4] = [
        WarningLabel::LowMonitoring,
        WarningLabel::ModerateMeasures,
        WarningLabel::HighRestrictions,
        WarningLabel::CriticalLockdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WarningLabel::LowMonitoring => "LOW_MONITORING",
            WarningLabel::ModerateMeasures => "MODERATE_MEASURES",
            WarningLabel::HighRestrictions => "HIGH_RESTRICTIONS",
            WarningLabel::CriticalLockdown => "CRITICAL_LOCKDOWN",
        }
    }
}

impl fmt::Display for WarningLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully labeled observation, the final pipeline row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledObservation {
    /// Source contextual observation
    pub contextual: ContextualObservation,
    /// Shifted metrics feeding the label
    pub future: ForwardMetrics,
    /// Risk score (0-13), absent when any future metric is undefined
    pub risk_score: Option<u8>,
    pub warning_label: Option<WarningLabel>,
}

/// Soft data-quality conditions recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum QualityFlag {
    /// No recovered table was supplied; recoveries treated as zero
    MissingRecoveredTable,
    /// Recovered table could not be parsed; recoveries treated as zero
    UnparseableRecoveredTable { reason: String },
    /// Region had no population entry; median fallback used
    ImputedPopulation { region: String },
    /// Region has no known coordinates to backfill from
    MissingCoordinates { region: String },
}
