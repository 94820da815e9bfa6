//! Forward label assignment
//!
//! For each observation the label is computed from four metrics read
//! `horizon` observations later in the same series: growth rate, cases per
//! 100k, doubling time and case-fatality rate. The last `horizon` rows of
//! every series therefore have no label, and neither does any row where one
//! of the four future metrics is undefined.
//!
//! Each factor is an ordered table of `(threshold, points)` bands evaluated in
//! order, first match wins. The tables are descending for "greater than"
//! factors and ascending for the doubling-time "less than" factor.

use crate::types::{ContextualObservation, ForwardMetrics, LabeledObservation, WarningLabel};

/// Highest achievable risk score
pub const MAX_RISK_SCORE: u8 = 13;

/// Direction of a band comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Band matches when `value > threshold`
    Above,
    /// Band matches when `value < threshold`
    Below,
}

/// One scoring factor: ordered bands plus an optional exclusive lower domain bound
#[derive(Debug, Clone, Copy)]
pub struct ScoreFactor {
    pub name: &'static str,
    pub comparison: Comparison,
    /// Values at or below this bound score 0 regardless of the bands
    pub domain_floor: Option<f64>,
    pub bands: &'static [(f64, u8)],
}

impl ScoreFactor {
    /// Points awarded for `value`; the first matching band wins
    pub fn points(&self, value: f64) -> u8 {
        if let Some(floor) = self.domain_floor {
            if value <= floor {
                return 0;
            }
        }
        self.bands
            .iter()
            .find(|(threshold, _)| match self.comparison {
                Comparison::Above => value > *threshold,
                Comparison::Below => value < *threshold,
            })
            .map(|(_, points)| *points)
            .unwrap_or(0)
    }

    pub fn max_points(&self) -> u8 {
        self.bands.iter().map(|(_, p)| *p).max().unwrap_or(0)
    }
}

/// Future growth rate (fraction), 40% of the achievable score
pub const GROWTH_FACTOR: ScoreFactor = ScoreFactor {
    name: "growth_rate",
    comparison: Comparison::Above,
    domain_floor: None,
    bands: &[(0.20, 4), (0.10, 3), (0.05, 2), (0.0, 1)],
};

/// Future cases per 100k, 30% of the achievable score
pub const BURDEN_FACTOR: ScoreFactor = ScoreFactor {
    name: "cases_per_100k",
    comparison: Comparison::Above,
    domain_floor: None,
    bands: &[(1000.0, 4), (500.0, 3), (200.0, 2), (50.0, 1)],
};

/// Future doubling time in days, 20% of the achievable score
pub const DOUBLING_FACTOR: ScoreFactor = ScoreFactor {
    name: "doubling_time",
    comparison: Comparison::Below,
    domain_floor: Some(0.0),
    bands: &[(7.0, 3), (14.0, 2), (30.0, 1)],
};

/// Future case-fatality rate in percent, 10% of the achievable score
pub const CFR_FACTOR: ScoreFactor = ScoreFactor {
    name: "cfr",
    comparison: Comparison::Above,
    domain_floor: None,
    bands: &[(5.0, 2), (3.0, 1)],
};

/// Minimum score per label, highest first
pub const LABEL_BUCKETS: [(u8, WarningLabel); 3] = [
    (10, WarningLabel::CriticalLockdown),
    (6, WarningLabel::HighRestrictions),
    (3, WarningLabel::ModerateMeasures),
];

/// Points per factor, keyed by factor name; undefined if any input is undefined
pub fn score_breakdown(future: &ForwardMetrics) -> Option<[(&'static str, u8); 4]> {
    let growth = future.growth_rate?;
    let burden = future.cases_per_100k?;
    let doubling = future.doubling_time?;
    let cfr = future.cfr?;

    Some([
        (GROWTH_FACTOR.name, GROWTH_FACTOR.points(growth)),
        (BURDEN_FACTOR.name, BURDEN_FACTOR.points(burden)),
        (DOUBLING_FACTOR.name, DOUBLING_FACTOR.points(doubling)),
        (CFR_FACTOR.name, CFR_FACTOR.points(cfr)),
    ])
}

/// Weighted risk score, undefined if any input is undefined
pub fn risk_score(future: &ForwardMetrics) -> Option<u8> {
    score_breakdown(future).map(|factors| factors.iter().map(|(_, points)| points).sum())
}

impl WarningLabel {
    /// Bucket a risk score into a label
    pub fn from_score(score: u8) -> Self {
        LABEL_BUCKETS
            .iter()
            .find(|(min_score, _)| score >= *min_score)
            .map(|(_, label)| *label)
            .unwrap_or(WarningLabel::LowMonitoring)
    }
}

/// Score and label for a set of future metrics
pub fn assign_warning_level(future: &ForwardMetrics) -> (Option<u8>, Option<WarningLabel>) {
    let score = risk_score(future);
    (score, score.map(WarningLabel::from_score))
}

/// Labeler shifting metrics within a series
pub struct ForwardLabeler;

impl ForwardLabeler {
    /// Label one date-sorted series using values `horizon` observations ahead
    pub fn label_series(
        series: Vec<ContextualObservation>,
        horizon: usize,
    ) -> Vec<LabeledObservation> {
        let futures: Vec<ForwardMetrics> = (0..series.len())
            .map(|i| match i.checked_add(horizon).and_then(|j| series.get(j)) {
                Some(ahead) => ForwardMetrics {
                    growth_rate: ahead.derived.growth_rate,
                    cases_per_100k: Some(ahead.cases_per_100k),
                    doubling_time: ahead.derived.doubling_time,
                    cfr: Some(ahead.derived.cfr),
                },
                None => ForwardMetrics::default(),
            })
            .collect();

        series
            .into_iter()
            .zip(futures)
            .map(|(contextual, future)| {
                let (risk_score, warning_label) = assign_warning_level(&future);
                LabeledObservation {
                    contextual,
                    future,
                    risk_score,
                    warning_label,
                }
            })
            .collect()
    }
}
