//! Pipeline orchestration
//!
//! This module provides the public API for Epiwatch.
//! It runs the full pipeline from wide source tables to the labeled feature table.

use crate::adapters::{JhuCsvAdapter, WideTable, WideTableAdapter};
use crate::config::EngineConfig;
use crate::context::ContextAnnotator;
use crate::dataset::TrainingSet;
use crate::encoder::{to_csv, to_ndjson, OutputFormat, TableEncoder};
use crate::error::ComputeError;
use crate::features::FeatureDeriver;
use crate::labeler::ForwardLabeler;
use crate::merger::SeriesMerger;
use crate::normalizer::{NormalizationStats, Normalizer};
use crate::temporal::TemporalFeatureBuilder;
use crate::types::{LabeledObservation, Metric, QualityFlag, WarningLabel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Source tables for one run
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub confirmed: Option<WideTable>,
    pub deaths: Option<WideTable>,
    pub recovered: Option<WideTable>,
}

/// Summary of one preparation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparationReport {
    pub series_count: usize,
    pub row_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub normalization: NormalizationStats,
    pub quality_flags: Vec<QualityFlag>,
    pub labeled_rows: usize,
    pub unlabeled_rows: usize,
    pub label_distribution: BTreeMap<WarningLabel, usize>,
}

/// Labeled feature table plus its run report
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    /// Rows ordered by series key, then date
    pub rows: Vec<LabeledObservation>,
    pub report: PreparationReport,
}

impl PreparedDataset {
    pub fn to_csv(&self) -> Result<String, ComputeError> {
        to_csv(&self.rows)
    }

    pub fn to_ndjson(&self) -> Result<String, ComputeError> {
        to_ndjson(&self.rows)
    }

    /// Write the table, choosing the format from the file extension
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), ComputeError> {
        let path = path.as_ref();
        TableEncoder::new(OutputFormat::from_path(path)).write_to_path(&self.rows, path)
    }

    /// Rows with a defined label, as a feature matrix
    pub fn training_set(&self) -> TrainingSet {
        TrainingSet::from_observations(&self.rows)
    }
}

/// Feature engineering and labeling engine.
///
/// Holds validated reference data; each run is a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct WarningEngine {
    config: EngineConfig,
}

impl WarningEngine {
    /// Create an engine, rejecting invalid configuration
    pub fn new(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine from a JSON configuration document
    pub fn from_config_json(json: &str) -> Result<Self, ComputeError> {
        Self::new(EngineConfig::from_json(json)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the pipeline over already parsed tables.
    ///
    /// Confirmed and deaths tables are mandatory. A missing recovered table is
    /// recorded as a quality flag and treated as zeros.
    pub fn run(&self, sources: SourceTables) -> Result<PreparedDataset, ComputeError> {
        let confirmed = sources
            .confirmed
            .ok_or(ComputeError::MissingSource(Metric::Confirmed))?;
        let deaths = sources
            .deaths
            .ok_or(ComputeError::MissingSource(Metric::Deaths))?;

        let mut flags = Vec::new();
        if sources.recovered.is_none() {
            log::warn!("no recovered table supplied, recoveries treated as zero");
            flags.push(QualityFlag::MissingRecoveredTable);
        }

        self.execute(&confirmed, &deaths, sources.recovered.as_ref(), flags)
    }

    /// Parse wide CSV text and run the pipeline.
    ///
    /// A recovered table that fails to parse is downgraded to a warning.
    pub fn prepare_from_csv(
        &self,
        confirmed: &str,
        deaths: &str,
        recovered: Option<&str>,
    ) -> Result<PreparedDataset, ComputeError> {
        let adapter = JhuCsvAdapter::default();
        let confirmed = adapter.parse(confirmed, Metric::Confirmed)?;
        let deaths = adapter.parse(deaths, Metric::Deaths)?;

        let Some(raw) = recovered else {
            return self.run(SourceTables {
                confirmed: Some(confirmed),
                deaths: Some(deaths),
                recovered: None,
            });
        };

        match adapter.parse(raw, Metric::Recovered) {
            Ok(table) => self.execute(&confirmed, &deaths, Some(&table), Vec::new()),
            Err(e) => {
                log::warn!("recovered table unusable, recoveries treated as zero: {e}");
                let flags = vec![QualityFlag::UnparseableRecoveredTable {
                    reason: e.to_string(),
                }];
                self.execute(&confirmed, &deaths, None, flags)
            }
        }
    }

    fn execute(
        &self,
        confirmed: &WideTable,
        deaths: &WideTable,
        recovered: Option<&WideTable>,
        mut quality_flags: Vec<QualityFlag>,
    ) -> Result<PreparedDataset, ComputeError> {
        let config = &self.config;

        // Stage 1: Outer-join the counters per series
        let merged = SeriesMerger::merge(confirmed, deaths, recovered);

        // Stage 2: Enforce integrity invariants
        let (cleaned, normalization) = Normalizer::normalize(merged, config);
        quality_flags.extend(
            normalization
                .regions_without_coordinates
                .iter()
                .map(|region| QualityFlag::MissingCoordinates {
                    region: region.clone(),
                }),
        );

        // Stage 3: Calendar fields and outbreak clocks
        let temporal = TemporalFeatureBuilder::build(cleaned, config.case_threshold);

        // Stage 4-6 run per series
        let regions: BTreeSet<&str> = temporal.keys().map(|k| k.region.as_str()).collect();
        let annotator = ContextAnnotator::new(config, regions.iter().copied())?;
        for region in &regions {
            if annotator.population_for(region).1 {
                log::warn!(
                    "no population for {region}, using median fallback {}",
                    annotator.fallback_population()
                );
                quality_flags.push(QualityFlag::ImputedPopulation {
                    region: region.to_string(),
                });
            }
        }

        let series_count = temporal.len();
        let mut rows = Vec::new();
        for (_, series) in temporal {
            let derived = FeatureDeriver::derive_series(
                series,
                config.case_noise_floor,
                config.death_noise_floor,
            );
            let contextual = annotator.annotate_series(derived);
            rows.extend(ForwardLabeler::label_series(contextual, config.horizon));
        }

        let report = build_report(series_count, &rows, normalization, quality_flags);
        log::info!(
            "prepared {} rows across {} series ({} labeled, {} unlabeled, {} quality flags)",
            report.row_count,
            report.series_count,
            report.labeled_rows,
            report.unlabeled_rows,
            report.quality_flags.len()
        );

        Ok(PreparedDataset { rows, report })
    }
}

fn build_report(
    series_count: usize,
    rows: &[LabeledObservation],
    normalization: NormalizationStats,
    quality_flags: Vec<QualityFlag>,
) -> PreparationReport {
    let mut label_distribution = BTreeMap::new();
    for label in rows.iter().filter_map(|r| r.warning_label) {
        *label_distribution.entry(label).or_insert(0) += 1;
    }
    let labeled_rows = label_distribution.values().sum();

    PreparationReport {
        series_count,
        row_count: rows.len(),
        first_date: rows.iter().map(|r| r.contextual.date()).min(),
        last_date: rows.iter().map(|r| r.contextual.date()).max(),
        normalization,
        quality_flags,
        labeled_rows,
        unlabeled_rows: rows.len() - labeled_rows,
        label_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::WideRow;
    use crate::config::PopulationTable;
    use crate::types::GroupKey;

    fn make_table(metric: Metric, rows: &[(&str, Option<&str>, Vec<f64>)]) -> WideTable {
        let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
        let days = rows.first().map(|r| r.2.len()).unwrap_or(0);
        let dates = (0..days)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();

        let mut table = WideTable::new(metric, dates);
        for (region, sub_region, values) in rows {
            table
                .push_row(WideRow {
                    region: region.to_string(),
                    sub_region: sub_region.map(str::to_string),
                    latitude: Some(10.0),
                    longitude: Some(20.0),
                    values: values.iter().map(|v| Some(*v)).collect(),
                })
                .unwrap();
        }
        table
    }

    fn make_config() -> EngineConfig {
        EngineConfig {
            // No capping so hand-computed deltas survive
            outlier_quantile: 1.0,
            population: PopulationTable::new(
                [("Testland", 1_500_000.0), ("Bigland", 50_000_000.0)]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn make_sources() -> SourceTables {
        let confirmed = vec![
            (
                "Testland",
                None,
                vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 100.0, 300.0, 350.0, 340.0],
            ),
            (
                "Bigland",
                Some("North"),
                vec![50.0, 120.0, 200.0, 400.0, 700.0, 900.0, 1500.0, 2100.0, 2600.0, 3300.0],
            ),
        ];
        let deaths = vec![
            ("Testland", None, vec![0.0; 10]),
            (
                "Bigland",
                Some("North"),
                vec![0.0, 1.0, 2.0, 5.0, 4.0, 9.0, 20.0, 31.0, 50.0, 70.0],
            ),
        ];
        SourceTables {
            confirmed: Some(make_table(Metric::Confirmed, &confirmed)),
            deaths: Some(make_table(Metric::Deaths, &deaths)),
            recovered: None,
        }
    }

    fn make_engine() -> WarningEngine {
        WarningEngine::new(make_config()).unwrap()
    }

    fn series<'a>(dataset: &'a PreparedDataset, key: &GroupKey) -> Vec<&'a LabeledObservation> {
        dataset
            .rows
            .iter()
            .filter(|r| r.contextual.key() == key)
            .collect()
    }

    #[test]
    fn test_scenario_label() {
        let dataset = make_engine().run(make_sources()).unwrap();
        let testland = series(&dataset, &GroupKey::new("Testland", None));

        // Day 7: delta 100 -> 200, cumulative 300 over 1.5M people
        let day7 = &testland[7].contextual;
        assert!((day7.derived.growth_rate.unwrap() - 1.0).abs() < 1e-9);
        assert!((day7.derived.doubling_time.unwrap() - 1.0).abs() < 1e-9);
        assert!((day7.cases_per_100k - 20.0).abs() < 1e-9);

        let day0 = testland[0];
        assert_eq!(day0.risk_score, Some(7));
        assert_eq!(day0.warning_label, Some(WarningLabel::HighRestrictions));
    }

    #[test]
    fn test_monotonic_and_non_negative() {
        let dataset = make_engine().run(make_sources()).unwrap();

        for key in [
            GroupKey::new("Testland", None),
            GroupKey::new("Bigland", Some("North")),
        ] {
            let rows = series(&dataset, &key);
            assert_eq!(rows.len(), 10);
            for pair in rows.windows(2) {
                let (a, b) = (pair[0].contextual.cleaned(), pair[1].contextual.cleaned());
                assert!(a.date < b.date);
                assert!(b.confirmed >= a.confirmed);
                assert!(b.deaths >= a.deaths);
                assert!(b.recovered >= a.recovered);
            }
            for row in rows {
                let c = row.contextual.cleaned();
                assert!(c.daily_cases >= 0.0);
                assert!(c.daily_deaths >= 0.0);
                assert!(c.daily_recovered >= 0.0);
            }
        }

        // Testland 350 -> 340 and Bigland deaths 5 -> 4 are revisions
        assert_eq!(dataset.report.normalization.downward_revisions, 2);
    }

    #[test]
    fn test_horizon_edge() {
        let dataset = make_engine().run(make_sources()).unwrap();
        for key in [
            GroupKey::new("Testland", None),
            GroupKey::new("Bigland", Some("North")),
        ] {
            let rows = series(&dataset, &key);
            assert!(rows[3..].iter().all(|r| r.warning_label.is_none()));
        }
    }

    #[test]
    fn test_idempotent_output() {
        let engine = make_engine();
        let first = engine.run(make_sources()).unwrap();
        let second = engine.run(make_sources()).unwrap();

        assert_eq!(first.to_csv().unwrap(), second.to_csv().unwrap());
        assert_eq!(first.to_ndjson().unwrap(), second.to_ndjson().unwrap());
        assert_eq!(first.report, second.report);
    }

    #[test]
    fn test_missing_mandatory_sources() {
        let engine = make_engine();

        let mut sources = make_sources();
        sources.confirmed = None;
        assert!(matches!(
            engine.run(sources),
            Err(ComputeError::MissingSource(Metric::Confirmed))
        ));

        let mut sources = make_sources();
        sources.deaths = None;
        assert!(matches!(
            engine.run(sources),
            Err(ComputeError::MissingSource(Metric::Deaths))
        ));
    }

    #[test]
    fn test_missing_recovered_is_flagged() {
        let dataset = make_engine().run(make_sources()).unwrap();
        assert!(dataset
            .report
            .quality_flags
            .contains(&QualityFlag::MissingRecoveredTable));
        assert!(dataset.rows.iter().all(|r| r.contextual.cleaned().recovered == 0.0));
    }

    #[test]
    fn test_report_counts() {
        let dataset = make_engine().run(make_sources()).unwrap();
        let report = &dataset.report;

        assert_eq!(report.series_count, 2);
        assert_eq!(report.row_count, 20);
        assert_eq!(report.labeled_rows + report.unlabeled_rows, 20);
        assert_eq!(report.first_date, NaiveDate::from_ymd_opt(2020, 3, 1));
        assert_eq!(report.last_date, NaiveDate::from_ymd_opt(2020, 3, 10));
        assert_eq!(
            report.label_distribution.values().sum::<usize>(),
            report.labeled_rows
        );
    }

    #[test]
    fn test_unmapped_region_imputed() {
        let mut sources = make_sources();
        let confirmed = sources.confirmed.as_mut().unwrap();
        confirmed
            .push_row(WideRow {
                region: "Atlantis".to_string(),
                sub_region: None,
                latitude: None,
                longitude: None,
                values: vec![Some(1.0); 10],
            })
            .unwrap();

        let dataset = make_engine().run(sources).unwrap();

        assert!(dataset.report.quality_flags.contains(&QualityFlag::ImputedPopulation {
            region: "Atlantis".to_string()
        }));
        assert!(dataset.report.quality_flags.contains(&QualityFlag::MissingCoordinates {
            region: "Atlantis".to_string()
        }));

        let atlantis = series(&dataset, &GroupKey::new("Atlantis", None));
        // Median of Testland and Bigland
        assert_eq!(atlantis[0].contextual.population, 25_750_000.0);
        assert!(atlantis[0].contextual.population_imputed);
        // Deaths table has no Atlantis row
        assert_eq!(atlantis[0].contextual.cleaned().deaths, 0.0);
    }

    #[test]
    fn test_non_finite_cells_never_reach_output() {
        let mut sources = make_sources();
        let confirmed = sources.confirmed.as_mut().unwrap();
        // Rows pushed directly skip the table's own cell check
        confirmed.rows[0].values[7] = Some(f64::NAN);
        confirmed.rows[1].values[3] = Some(f64::INFINITY);
        confirmed.rows[1].latitude = Some(f64::NAN);

        let dataset = make_engine().run(sources).unwrap();

        for row in &dataset.rows {
            let c = row.contextual.cleaned();
            for v in [
                c.confirmed,
                c.daily_cases,
                c.cases_7d_avg,
                row.contextual.cases_per_100k,
            ] {
                assert!(v.is_finite() && v >= 0.0);
            }
        }
        for key in [
            GroupKey::new("Testland", None),
            GroupKey::new("Bigland", Some("North")),
        ] {
            let rows = series(&dataset, &key);
            assert!(rows.windows(2).all(|w| {
                w[1].contextual.cleaned().confirmed >= w[0].contextual.cleaned().confirmed
            }));
        }

        let csv = dataset.to_csv().unwrap();
        assert!(!csv.contains("NaN"));
        assert!(!csv.contains("inf"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            horizon: 0,
            ..make_config()
        };
        assert!(matches!(
            WarningEngine::new(config),
            Err(ComputeError::InvalidConfig(_))
        ));
    }

    const CONFIRMED_CSV: &str = "Province/State,Country/Region,Lat,Long,3/1/20,3/2/20,3/3/20\n\
                                 ,Testland,1.0,2.0,0,60,200\n";
    const DEATHS_CSV: &str = "Province/State,Country/Region,Lat,Long,3/1/20,3/2/20,3/3/20\n\
                              ,Testland,1.0,2.0,0,0,1\n";

    #[test]
    fn test_prepare_from_csv() {
        let recovered = "Province/State,Country/Region,Lat,Long,3/1/20,3/2/20,3/3/20\n\
                         ,Testland,1.0,2.0,0,10,5\n";
        let dataset = make_engine()
            .prepare_from_csv(CONFIRMED_CSV, DEATHS_CSV, Some(recovered))
            .unwrap();

        assert_eq!(dataset.rows.len(), 3);
        assert!(dataset.report.quality_flags.is_empty());

        let last = dataset.rows[2].contextual.cleaned();
        assert_eq!(last.confirmed, 200.0);
        // Recovered revised downward 10 -> 5 stays at 10
        assert_eq!(last.recovered, 10.0);
        assert_eq!(last.daily_recovered, 0.0);
    }

    #[test]
    fn test_unparseable_recovered_is_not_fatal() {
        let recovered = "Province/State,Country/Region,not-a-date\n,Testland,1\n";
        let dataset = make_engine()
            .prepare_from_csv(CONFIRMED_CSV, DEATHS_CSV, Some(recovered))
            .unwrap();

        assert_eq!(dataset.rows.len(), 3);
        assert!(matches!(
            dataset.report.quality_flags.as_slice(),
            [QualityFlag::UnparseableRecoveredTable { .. }]
        ));
        assert!(dataset.rows.iter().all(|r| r.contextual.cleaned().recovered == 0.0));
    }

    #[test]
    fn test_unparseable_confirmed_is_fatal() {
        let confirmed = "Province/State,Country/Region,3/1/20\n,Testland,abc\n";
        assert!(make_engine()
            .prepare_from_csv(confirmed, DEATHS_CSV, None)
            .is_err());
    }

    #[test]
    fn test_csv_row_per_observation() {
        let dataset = make_engine().run(make_sources()).unwrap();
        let csv = dataset.to_csv().unwrap();
        // Header plus one line per row
        assert_eq!(csv.lines().count(), dataset.rows.len() + 1);
    }

    #[test]
    fn test_training_set_from_prepared() {
        let dataset = make_engine().run(make_sources()).unwrap();
        let training = dataset.training_set();
        assert_eq!(training.len(), dataset.report.labeled_rows);
        assert_eq!(training.dropped_unlabeled, dataset.report.unlabeled_rows);
    }
}
