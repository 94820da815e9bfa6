//! Policy and population context
//!
//! This module annotates derived observations with static reference context:
//! the intervention phase and vaccine era of the date, and population-normalized
//! burden metrics. Regions missing from the population table fall back to the
//! median population of the mapped regions, so per-capita division never sees
//! an undefined or zero denominator.

use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::rolling::median;
use crate::types::{ContextualObservation, DerivedObservation, InterventionPhase, VaccinePeriod};
use std::collections::BTreeSet;

/// Denominator scale for per-capita metrics
pub const PER_CAPITA_SCALE: f64 = 100_000.0;

/// Annotator applying policy calendar and population lookup
pub struct ContextAnnotator<'a> {
    config: &'a EngineConfig,
    fallback_population: f64,
}

impl<'a> ContextAnnotator<'a> {
    /// Create an annotator for a dataset containing `regions`.
    ///
    /// The fallback population is the median over the distinct regions present
    /// in the dataset that the table maps. When none are mapped, the median of
    /// the whole table is used.
    pub fn new<'r>(
        config: &'a EngineConfig,
        regions: impl IntoIterator<Item = &'r str>,
    ) -> Result<Self, ComputeError> {
        let distinct: BTreeSet<&str> = regions.into_iter().collect();
        let mapped: Vec<f64> = distinct
            .iter()
            .filter_map(|region| config.population.get(region))
            .collect();

        let fallback_population = median(&mapped)
            .or_else(|| config.population.median())
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| {
                ComputeError::InvalidConfig(
                    "population table has no positive entries for the median fallback".to_string(),
                )
            })?;

        Ok(Self {
            config,
            fallback_population,
        })
    }

    pub fn fallback_population(&self) -> f64 {
        self.fallback_population
    }

    /// Population for `region` and whether it was imputed
    pub fn population_for(&self, region: &str) -> (f64, bool) {
        match self.config.population.get(region) {
            Some(population) if population.is_finite() && population > 0.0 => (population, false),
            _ => (self.fallback_population, true),
        }
    }

    /// Annotate one series
    pub fn annotate_series(&self, series: Vec<DerivedObservation>) -> Vec<ContextualObservation> {
        series
            .into_iter()
            .map(|derived| self.annotate(derived))
            .collect()
    }

    fn annotate(&self, derived: DerivedObservation) -> ContextualObservation {
        let cleaned = &derived.temporal.cleaned;
        let date = cleaned.date;

        let phase = self.config.policy.phase_for(date);
        let is_post_vaccine = date >= self.config.vaccine_cutoff;
        let vaccine_period = if is_post_vaccine {
            VaccinePeriod::PostVaccine
        } else {
            VaccinePeriod::PreVaccine
        };

        let (population, population_imputed) = self.population_for(&cleaned.key.region);
        let cases_per_100k = cleaned.confirmed / population * PER_CAPITA_SCALE;
        let deaths_per_100k = cleaned.deaths / population * PER_CAPITA_SCALE;

        ContextualObservation {
            phase,
            vaccine_period,
            is_lockdown: phase == InterventionPhase::Lockdown,
            is_post_vaccine,
            population,
            population_imputed,
            cases_per_100k,
            deaths_per_100k,
            derived,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PopulationTable;
    use crate::types::{CleanedObservation, GroupKey, TemporalObservation};
    use chrono::NaiveDate;

    fn make_derived(
        region: &str,
        date: NaiveDate,
        confirmed: f64,
        deaths: f64,
    ) -> DerivedObservation {
        DerivedObservation {
            temporal: TemporalObservation {
                cleaned: CleanedObservation {
                    key: GroupKey::new(region, None),
                    date,
                    confirmed,
                    deaths,
                    recovered: 0.0,
                    latitude: None,
                    longitude: None,
                    daily_cases: 0.0,
                    daily_deaths: 0.0,
                    daily_recovered: 0.0,
                    cases_7d_avg: 0.0,
                    deaths_7d_avg: 0.0,
                },
                day_of_week: 0,
                month: 4,
                quarter: 1,
                year: 2020,
                is_weekend: false,
                days_since_start: 0,
                days_since_threshold: None,
            },
            growth_rate: None,
            death_growth: None,
            acceleration: None,
            doubling_time: None,
            log_cases: 0.0,
            log_deaths: 0.0,
            cfr: 0.0,
            active_cases: 0.0,
            recovery_rate: 0.0,
            death_to_case_ratio: 0.0,
        }
    }

    fn make_config() -> EngineConfig {
        EngineConfig {
            population: PopulationTable::new(
                [("Small", 1_000_000.0), ("Medium", 3_000_000.0), ("Large", 9_000_000.0)]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_per_capita_metrics() {
        let config = make_config();
        let annotator = ContextAnnotator::new(&config, ["Small"]).unwrap();

        let annotated = annotator.annotate_series(vec![make_derived(
            "Small",
            ymd(2020, 4, 1),
            200.0,
            10.0,
        )]);

        assert!((annotated[0].cases_per_100k - 20.0).abs() < 1e-9);
        assert!((annotated[0].deaths_per_100k - 1.0).abs() < 1e-9);
        assert!(!annotated[0].population_imputed);
    }

    #[test]
    fn test_unmapped_region_uses_median_of_mapped_regions() {
        let config = make_config();
        // Only Small and Large appear in the data: median of 1M and 9M
        let annotator =
            ContextAnnotator::new(&config, ["Small", "Large", "Atlantis", "Small"]).unwrap();

        assert_eq!(annotator.fallback_population(), 5_000_000.0);
        let (population, imputed) = annotator.population_for("Atlantis");
        assert_eq!(population, 5_000_000.0);
        assert!(imputed);
    }

    #[test]
    fn test_no_mapped_regions_uses_table_median() {
        let config = make_config();
        let annotator = ContextAnnotator::new(&config, ["Atlantis"]).unwrap();
        assert_eq!(annotator.fallback_population(), 3_000_000.0);
    }

    #[test]
    fn test_policy_context() {
        let config = make_config();
        let annotator = ContextAnnotator::new(&config, ["Small"]).unwrap();

        let annotated = annotator.annotate_series(vec![
            make_derived("Small", ymd(2020, 4, 1), 0.0, 0.0),
            make_derived("Small", ymd(2021, 1, 1), 0.0, 0.0),
        ]);

        assert_eq!(annotated[0].phase, InterventionPhase::Lockdown);
        assert!(annotated[0].is_lockdown);
        assert_eq!(annotated[0].vaccine_period, VaccinePeriod::PreVaccine);
        assert!(!annotated[0].is_post_vaccine);

        assert_eq!(annotated[1].phase, InterventionPhase::PostReopening);
        assert!(!annotated[1].is_lockdown);
        // Cutoff day itself is in the vaccine era
        assert!(annotated[1].is_post_vaccine);
    }
}
