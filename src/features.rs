//! Growth and severity feature derivation
//!
//! This module derives higher-order metrics from temporal observations:
//! - Noise-floor guarded growth rates and acceleration
//! - Doubling time with an explicit logarithm domain guard
//! - Log-transformed daily volumes
//! - Case-fatality rate, active cases, recovery and death-to-case ratios
//!
//! Every division and logarithm resolves degenerate inputs to `None` or to the
//! documented fallback, never to a non-finite value.

use crate::types::{DerivedObservation, TemporalObservation};

/// Feature deriver for growth and severity metrics
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive features for one date-sorted series
    pub fn derive_series(
        series: Vec<TemporalObservation>,
        case_noise_floor: f64,
        death_noise_floor: f64,
    ) -> Vec<DerivedObservation> {
        let daily_cases: Vec<f64> = series.iter().map(|o| o.cleaned.daily_cases).collect();
        let daily_deaths: Vec<f64> = series.iter().map(|o| o.cleaned.daily_deaths).collect();

        let growth = growth_rates(&daily_cases, case_noise_floor);
        let death_growth = growth_rates(&daily_deaths, death_noise_floor);
        let acceleration = first_difference_opt(&growth);

        series
            .into_iter()
            .enumerate()
            .map(|(i, temporal)| {
                let c = &temporal.cleaned;
                let log_cases = c.daily_cases.max(0.0).ln_1p();
                let log_deaths = c.daily_deaths.max(0.0).ln_1p();
                let cfr = case_fatality_rate(c.deaths, c.confirmed);
                let active_cases = active_cases(c.confirmed, c.deaths, c.recovered);
                let recovery_rate = ratio_or_zero(c.recovered, c.confirmed);
                let death_to_case_ratio = ratio_or_zero(c.daily_deaths, c.daily_cases);

                DerivedObservation {
                    growth_rate: growth[i],
                    death_growth: death_growth[i],
                    acceleration: acceleration[i],
                    doubling_time: growth[i].and_then(doubling_time),
                    log_cases,
                    log_deaths,
                    cfr,
                    active_cases,
                    recovery_rate,
                    death_to_case_ratio,
                    temporal,
                }
            })
            .collect()
    }
}

/// Fractional change between consecutive values at or above the noise floor.
///
/// Values below the floor are suppressed before the change is taken, so the
/// rate is undefined whenever either endpoint is suppressed.
pub fn growth_rates(values: &[f64], noise_floor: f64) -> Vec<Option<f64>> {
    let mut rates = Vec::with_capacity(values.len());
    if values.is_empty() {
        return rates;
    }
    rates.push(None);
    for pair in values.windows(2) {
        rates.push(growth_rate(pair[0], pair[1], noise_floor));
    }
    rates
}

/// Guarded fractional change from `previous` to `current`
pub fn growth_rate(previous: f64, current: f64, noise_floor: f64) -> Option<f64> {
    if previous < noise_floor || current < noise_floor {
        return None;
    }
    if previous <= 0.0 {
        return None;
    }
    let rate = (current - previous) / previous;
    rate.is_finite().then_some(rate)
}

/// First difference of an optional series; undefined if either side is
pub fn first_difference_opt(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    for pair in values.windows(2) {
        out.push(match (pair[0], pair[1]) {
            (Some(prev), Some(curr)) => Some(curr - prev),
            _ => None,
        });
    }
    out
}

/// Days to double at `growth_rate`: `ln 2 / ln(1 + g)` for g > 0
pub fn doubling_time(growth_rate: f64) -> Option<f64> {
    if !growth_rate.is_finite() || growth_rate <= 0.0 {
        return None;
    }
    let denominator = growth_rate.ln_1p();
    if !denominator.is_finite() || denominator <= 0.0 {
        return None;
    }
    let days = std::f64::consts::LN_2 / denominator;
    days.is_finite().then_some(days)
}

/// Deaths as a percentage of confirmed cases, 0 without cases
pub fn case_fatality_rate(deaths: f64, confirmed: f64) -> f64 {
    if confirmed > 0.0 {
        deaths / confirmed * 100.0
    } else {
        0.0
    }
}

/// Confirmed minus deaths minus recovered, floored at 0
pub fn active_cases(confirmed: f64, deaths: f64, recovered: f64) -> f64 {
    (confirmed - deaths - recovered).max(0.0)
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
