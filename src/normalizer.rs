//! Integrity normalization
//!
//! This module turns merged observations into cleaned observations:
//! - Missing counts filled with 0, missing coordinates backfilled from the region centroid
//! - Cumulative counts forced non-decreasing (running maximum per series)
//! - Daily deltas derived, negative artifacts clamped, upper outliers capped
//! - Trailing averages of daily cases and deaths

use crate::config::EngineConfig;
use crate::rolling::{quantile, trailing_mean};
use crate::types::{CleanedObservation, Partition, RawObservation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters describing what normalization had to repair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    /// Cumulative values raised by the running maximum
    pub downward_revisions: usize,
    /// Daily deltas clamped from negative to 0
    pub negative_deltas_clamped: usize,
    /// Case/death deltas lowered to the series percentile
    pub outliers_capped: usize,
    /// Observations whose coordinates came from the region centroid
    pub coordinates_backfilled: usize,
    /// Regions with no known coordinates at all
    pub regions_without_coordinates: Vec<String>,
}

/// Mean of the known coordinates of one region
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Centroid {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Normalizer for enforcing per-series integrity invariants
pub struct Normalizer;

impl Normalizer {
    /// Normalize every series in the partition
    pub fn normalize(
        partition: Partition<RawObservation>,
        config: &EngineConfig,
    ) -> (Partition<CleanedObservation>, NormalizationStats) {
        let mut stats = NormalizationStats::default();
        let centroids = region_centroids(&partition);

        stats.regions_without_coordinates = centroids
            .iter()
            .filter(|(_, c)| c.latitude.is_none() || c.longitude.is_none())
            .map(|(region, _)| region.clone())
            .collect();

        let cleaned = partition
            .into_iter()
            .map(|(key, series)| {
                let centroid = centroids.get(&key.region).copied().unwrap_or_default();
                let cleaned = normalize_series(series, centroid, config, &mut stats);
                (key, cleaned)
            })
            .collect();

        log::info!(
            "normalized series: {} downward revisions, {} negative deltas, {} outliers capped",
            stats.downward_revisions,
            stats.negative_deltas_clamped,
            stats.outliers_capped
        );

        (cleaned, stats)
    }
}

fn normalize_series(
    mut series: Vec<RawObservation>,
    centroid: Centroid,
    config: &EngineConfig,
    stats: &mut NormalizationStats,
) -> Vec<CleanedObservation> {
    // Every diff and window below assumes chronological order
    series.sort_by_key(|o| o.date);

    // Non-finite cells count as missing
    let (confirmed, revised_c) = running_max(series.iter().map(|o| count_or_zero(o.confirmed)));
    let (deaths, revised_d) = running_max(series.iter().map(|o| count_or_zero(o.deaths)));
    let (recovered, revised_r) = running_max(series.iter().map(|o| count_or_zero(o.recovered)));
    stats.downward_revisions += revised_c + revised_d + revised_r;

    let mut daily_cases = first_difference(&confirmed);
    let mut daily_deaths = first_difference(&deaths);
    let mut daily_recovered = first_difference(&recovered);

    stats.negative_deltas_clamped += clamp_negative(&mut daily_cases)
        + clamp_negative(&mut daily_deaths)
        + clamp_negative(&mut daily_recovered);

    // Recovered deltas are left uncapped
    stats.outliers_capped += cap_upper(&mut daily_cases, config.outlier_quantile)
        + cap_upper(&mut daily_deaths, config.outlier_quantile);

    let cases_7d_avg = trailing_mean(&daily_cases, config.rolling_window);
    let deaths_7d_avg = trailing_mean(&daily_deaths, config.rolling_window);

    series
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let raw_latitude = finite(raw.latitude);
            let raw_longitude = finite(raw.longitude);
            let latitude = raw_latitude.or(centroid.latitude);
            let longitude = raw_longitude.or(centroid.longitude);
            if (raw_latitude.is_none() && latitude.is_some())
                || (raw_longitude.is_none() && longitude.is_some())
            {
                stats.coordinates_backfilled += 1;
            }

            CleanedObservation {
                key: raw.key,
                date: raw.date,
                confirmed: confirmed[i],
                deaths: deaths[i],
                recovered: recovered[i],
                latitude,
                longitude,
                daily_cases: daily_cases[i],
                daily_deaths: daily_deaths[i],
                daily_recovered: daily_recovered[i],
                cases_7d_avg: cases_7d_avg[i],
                deaths_7d_avg: deaths_7d_avg[i],
            }
        })
        .collect()
}

/// Coordinate centroid per region, averaged over every row with a known value
fn region_centroids(partition: &Partition<RawObservation>) -> BTreeMap<String, Centroid> {
    #[derive(Default)]
    struct Acc {
        lat_sum: f64,
        lat_n: usize,
        lon_sum: f64,
        lon_n: usize,
    }

    let mut acc: BTreeMap<String, Acc> = BTreeMap::new();
    for (key, series) in partition {
        let entry = acc.entry(key.region.clone()).or_default();
        for obs in series {
            if let Some(lat) = finite(obs.latitude) {
                entry.lat_sum += lat;
                entry.lat_n += 1;
            }
            if let Some(lon) = finite(obs.longitude) {
                entry.lon_sum += lon;
                entry.lon_n += 1;
            }
        }
    }

    acc.into_iter()
        .map(|(region, a)| {
            let centroid = Centroid {
                latitude: (a.lat_n > 0).then(|| a.lat_sum / a.lat_n as f64),
                longitude: (a.lon_n > 0).then(|| a.lon_sum / a.lon_n as f64),
            };
            (region, centroid)
        })
        .collect()
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn count_or_zero(value: Option<f64>) -> f64 {
    finite(value).unwrap_or(0.0)
}

/// Running maximum, returning the values and how many were raised
pub fn running_max(values: impl IntoIterator<Item = f64>) -> (Vec<f64>, usize) {
    let mut raised = 0;
    let mut current = f64::NEG_INFINITY;
    let out = values
        .into_iter()
        .map(|v| {
            if v < current {
                raised += 1;
            } else {
                current = v;
            }
            current
        })
        .collect();
    (out, raised)
}

/// First difference with the leading gap filled by 0
pub fn first_difference(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if !values.is_empty() {
        out.push(0.0);
    }
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Clamp negative values to 0, returning how many were changed
pub fn clamp_negative(values: &mut [f64]) -> usize {
    let mut clamped = 0;
    for v in values.iter_mut().filter(|v| **v < 0.0) {
        *v = 0.0;
        clamped += 1;
    }
    clamped
}

/// Cap values above the `q` quantile of the slice, returning how many were lowered
pub fn cap_upper(values: &mut [f64], q: f64) -> usize {
    let Some(limit) = quantile(values, q) else {
        return 0;
    };
    let mut capped = 0;
    for v in values.iter_mut().filter(|v| **v > limit) {
        *v = limit;
        capped += 1;
    }
    capped
}
