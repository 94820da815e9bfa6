//! Temporal feature construction
//!
//! Calendar fields come straight from the date. Two clocks are series-relative:
//! days since the earliest date of the whole dataset, and days since the series
//! first reached the cumulative case threshold.

use crate::types::{CleanedObservation, Partition, TemporalObservation};
use chrono::{Datelike, NaiveDate};

/// Builder for calendar and outbreak-clock features
pub struct TemporalFeatureBuilder;

impl TemporalFeatureBuilder {
    /// Add temporal features to every series in the partition
    pub fn build(
        partition: Partition<CleanedObservation>,
        case_threshold: f64,
    ) -> Partition<TemporalObservation> {
        let Some(outbreak_start) = partition
            .values()
            .filter_map(|series| series.first().map(|o| o.date))
            .min()
        else {
            return Partition::new();
        };

        partition
            .into_iter()
            .map(|(key, series)| {
                let series = Self::build_series(series, outbreak_start, case_threshold);
                (key, series)
            })
            .collect()
    }

    /// Add temporal features to one date-sorted series
    pub fn build_series(
        series: Vec<CleanedObservation>,
        outbreak_start: NaiveDate,
        case_threshold: f64,
    ) -> Vec<TemporalObservation> {
        let threshold_date = series
            .iter()
            .find(|o| o.confirmed >= case_threshold)
            .map(|o| o.date);

        series
            .into_iter()
            .map(|cleaned| {
                let date = cleaned.date;
                let day_of_week = date.weekday().num_days_from_monday();
                let days_since_threshold = threshold_date
                    .filter(|first| date >= *first)
                    .map(|first| (date - first).num_days());

                TemporalObservation {
                    day_of_week,
                    month: date.month(),
                    quarter: (date.month() - 1) / 3 + 1,
                    year: date.year(),
                    is_weekend: day_of_week >= 5,
                    days_since_start: (date - outbreak_start).num_days(),
                    days_since_threshold,
                    cleaned,
                }
            })
            .collect()
    }
}
