//! Engine configuration and static reference data
//!
//! Reference tables (population lookup, policy calendar, vaccine cutoff) are
//! explicit values handed to the engine at construction, so runs with different
//! reference data can coexist in one process.

use crate::error::ComputeError;
use crate::rolling::median;
use crate::types::InterventionPhase;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default forward offset for labels, in observations
pub const DEFAULT_HORIZON: usize = 7;

/// Default trailing-average window, in observations
pub const DEFAULT_ROLLING_WINDOW: usize = 7;

/// Default daily-case noise floor for growth rate
pub const DEFAULT_CASE_NOISE_FLOOR: f64 = 50.0;

/// Default daily-death noise floor for death growth
pub const DEFAULT_DEATH_NOISE_FLOOR: f64 = 10.0;

/// Default per-series upper quantile for delta capping
pub const DEFAULT_OUTLIER_QUANTILE: f64 = 0.99;

/// Default cumulative-case threshold for the outbreak clock
pub const DEFAULT_CASE_THRESHOLD: f64 = 100.0;

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Label horizon in observations
    pub horizon: usize,
    /// Trailing-average window in observations
    pub rolling_window: usize,
    pub case_noise_floor: f64,
    pub death_noise_floor: f64,
    /// Upper quantile (0-1] used to cap case/death deltas
    pub outlier_quantile: f64,
    /// Cumulative confirmed count that starts the per-series clock
    pub case_threshold: f64,
    pub policy: PolicyCalendar,
    /// First day of the vaccine era
    pub vaccine_cutoff: NaiveDate,
    pub population: PopulationTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            rolling_window: DEFAULT_ROLLING_WINDOW,
            case_noise_floor: DEFAULT_CASE_NOISE_FLOOR,
            death_noise_floor: DEFAULT_DEATH_NOISE_FLOOR,
            outlier_quantile: DEFAULT_OUTLIER_QUANTILE,
            case_threshold: DEFAULT_CASE_THRESHOLD,
            policy: PolicyCalendar::default(),
            vaccine_cutoff: ymd(2021, 1, 1),
            population: PopulationTable::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON; omitted fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.horizon == 0 {
            return Err(ComputeError::InvalidConfig(
                "horizon must be at least 1".to_string(),
            ));
        }
        if self.rolling_window == 0 {
            return Err(ComputeError::InvalidConfig(
                "rolling_window must be at least 1".to_string(),
            ));
        }
        if self.outlier_quantile.is_nan()
            || self.outlier_quantile <= 0.0
            || self.outlier_quantile > 1.0
        {
            return Err(ComputeError::InvalidConfig(format!(
                "outlier_quantile must be in (0, 1], got {}",
                self.outlier_quantile
            )));
        }
        for (name, value) in [
            ("case_noise_floor", self.case_noise_floor),
            ("death_noise_floor", self.death_noise_floor),
            ("case_threshold", self.case_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ComputeError::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        self.policy.validate()?;
        self.population.validate()?;
        Ok(())
    }
}

/// One closed calendar interval of an intervention phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseInterval {
    pub phase: InterventionPhase,
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
}

impl PhaseInterval {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Chronologically ordered, non-overlapping policy intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyCalendar {
    pub intervals: Vec<PhaseInterval>,
}

impl Default for PolicyCalendar {
    fn default() -> Self {
        Self {
            intervals: vec![
                PhaseInterval {
                    phase: InterventionPhase::PreIntervention,
                    start: ymd(2020, 1, 22),
                    end: ymd(2020, 3, 15),
                },
                PhaseInterval {
                    phase: InterventionPhase::Lockdown,
                    start: ymd(2020, 3, 16),
                    end: ymd(2020, 6, 1),
                },
                PhaseInterval {
                    phase: InterventionPhase::Reopening,
                    start: ymd(2020, 6, 2),
                    end: ymd(2020, 12, 1),
                },
                PhaseInterval {
                    phase: InterventionPhase::PostReopening,
                    start: ymd(2020, 12, 2),
                    end: ymd(2023, 3, 9),
                },
            ],
        }
    }
}

impl PolicyCalendar {
    /// Phase containing `date`; uncovered dates fall back to post-reopening
    pub fn phase_for(&self, date: NaiveDate) -> InterventionPhase {
        self.intervals
            .iter()
            .find(|interval| interval.contains(date))
            .map(|interval| interval.phase)
            .unwrap_or(InterventionPhase::PostReopening)
    }

    fn validate(&self) -> Result<(), ComputeError> {
        for interval in &self.intervals {
            if interval.start > interval.end {
                return Err(ComputeError::InvalidConfig(format!(
                    "policy interval {} starts after it ends ({} > {})",
                    interval.phase.as_str(),
                    interval.start,
                    interval.end
                )));
            }
        }
        for pair in self.intervals.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(ComputeError::InvalidConfig(format!(
                    "policy intervals {} and {} overlap or are out of order",
                    pair[0].phase.as_str(),
                    pair[1].phase.as_str()
                )));
            }
        }
        Ok(())
    }
}

/// Population lookup keyed by region name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopulationTable {
    by_region: BTreeMap<String, f64>,
}

impl PopulationTable {
    pub fn new(by_region: BTreeMap<String, f64>) -> Self {
        Self { by_region }
    }

    pub fn get(&self, region: &str) -> Option<f64> {
        self.by_region.get(region).copied()
    }

    pub fn len(&self) -> usize {
        self.by_region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_region.is_empty()
    }

    /// Median over every entry in the table
    pub fn median(&self) -> Option<f64> {
        let values: Vec<f64> = self.by_region.values().copied().collect();
        median(&values)
    }

    fn validate(&self) -> Result<(), ComputeError> {
        if self.by_region.is_empty() {
            return Err(ComputeError::InvalidConfig(
                "population table must not be empty".to_string(),
            ));
        }
        if let Some((region, value)) = self
            .by_region
            .iter()
            .find(|(_, v)| !v.is_finite() || **v <= 0.0)
        {
            return Err(ComputeError::InvalidConfig(format!(
                "population for {region} must be positive, got {value}"
            )));
        }
        Ok(())
    }
}

impl Default for PopulationTable {
    /// 2020 population estimates
    fn default() -> Self {
        let entries: &[(&str, f64)] = &[
            ("US", 331_002_651.0),
            ("India", 1_380_004_385.0),
            ("Brazil", 212_559_417.0),
            ("Russia", 145_934_462.0),
            ("United Kingdom", 67_886_011.0),
            ("France", 65_273_511.0),
            ("Turkey", 84_339_067.0),
            ("Italy", 60_461_826.0),
            ("Germany", 83_783_942.0),
            ("Spain", 46_754_778.0),
            ("Argentina", 45_195_774.0),
            ("Colombia", 50_882_891.0),
            ("Mexico", 128_932_753.0),
            ("Poland", 37_846_611.0),
            ("Iran", 83_992_949.0),
            ("Ukraine", 43_733_762.0),
            ("Peru", 32_971_854.0),
            ("South Africa", 59_308_690.0),
            ("Netherlands", 17_134_872.0),
            ("Iraq", 40_222_493.0),
            ("Indonesia", 273_523_615.0),
            ("Philippines", 109_581_078.0),
            ("Bangladesh", 164_689_383.0),
            ("Japan", 126_476_461.0),
            ("Pakistan", 220_892_340.0),
            ("Nigeria", 206_139_589.0),
            ("Ethiopia", 114_963_588.0),
            ("Egypt", 102_334_404.0),
            ("Vietnam", 97_338_579.0),
            ("Congo (Kinshasa)", 89_561_403.0),
            ("Thailand", 69_799_978.0),
            ("Myanmar", 54_409_800.0),
            ("Kenya", 53_771_296.0),
            ("Korea, South", 51_269_185.0),
            ("Algeria", 43_851_044.0),
            ("Sudan", 43_849_260.0),
            ("Canada", 37_742_154.0),
            ("Morocco", 36_910_560.0),
            ("Saudi Arabia", 34_813_871.0),
            ("Malaysia", 32_365_999.0),
            ("Australia", 25_499_884.0),
            ("Taiwan*", 23_816_775.0),
            ("Sri Lanka", 21_413_249.0),
            ("Romania", 19_237_691.0),
            ("Chile", 19_116_201.0),
            ("Ecuador", 17_643_054.0),
            ("Guatemala", 17_915_568.0),
            ("Belgium", 11_589_623.0),
            ("Bolivia", 11_673_021.0),
            ("Cuba", 11_326_616.0),
            ("Dominican Republic", 10_847_910.0),
            ("Czechia", 10_708_981.0),
            ("Czech Republic (Czechia)", 10_708_981.0),
            ("Greece", 10_423_054.0),
            ("Portugal", 10_196_709.0),
            ("Sweden", 10_099_265.0),
            ("United Arab Emirates", 9_890_402.0),
            ("Hungary", 9_660_351.0),
            ("Belarus", 9_449_323.0),
            ("Austria", 9_006_398.0),
            ("Serbia", 8_737_371.0),
            ("Israel", 8_655_535.0),
            ("Switzerland", 8_654_622.0),
            ("Hong Kong", 7_496_981.0),
            ("Lebanon", 6_825_445.0),
            ("Singapore", 5_850_342.0),
            ("Denmark", 5_792_202.0),
            ("Finland", 5_540_720.0),
            ("Slovakia", 5_459_642.0),
            ("Norway", 5_421_241.0),
            ("Ireland", 4_937_786.0),
            ("New Zealand", 4_822_233.0),
            ("Panama", 4_314_767.0),
            ("Kuwait", 4_270_571.0),
            ("Croatia", 4_105_267.0),
            ("Georgia", 3_989_167.0),
            ("Uruguay", 3_473_730.0),
            ("Bosnia and Herzegovina", 3_280_819.0),
            ("Mongolia", 3_278_290.0),
            ("Armenia", 2_963_243.0),
            ("Qatar", 2_881_053.0),
            ("Albania", 2_877_797.0),
            ("Lithuania", 2_722_289.0),
            ("Slovenia", 2_078_938.0),
            ("Latvia", 1_886_198.0),
            ("Bahrain", 1_701_575.0),
            ("Estonia", 1_326_535.0),
            ("Cyprus", 1_207_359.0),
            ("Luxembourg", 625_978.0),
            ("Malta", 441_543.0),
            ("Iceland", 341_243.0),
            ("Macao", 649_335.0),
            ("Burma", 54_409_800.0),
            ("West Bank and Gaza", 5_101_414.0),
        ];

        Self {
            by_region: entries
                .iter()
                .map(|(region, population)| (region.to_string(), *population))
                .collect(),
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("static calendar date is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.horizon, 7);
        assert_eq!(config.population.get("Italy"), Some(60_461_826.0));
    }

    #[test]
    fn test_phase_lookup() {
        let calendar = PolicyCalendar::default();

        assert_eq!(
            calendar.phase_for(ymd(2020, 2, 1)),
            InterventionPhase::PreIntervention
        );
        // Interval bounds are inclusive
        assert_eq!(
            calendar.phase_for(ymd(2020, 3, 16)),
            InterventionPhase::Lockdown
        );
        assert_eq!(
            calendar.phase_for(ymd(2020, 6, 1)),
            InterventionPhase::Lockdown
        );
        assert_eq!(
            calendar.phase_for(ymd(2020, 6, 2)),
            InterventionPhase::Reopening
        );
    }

    #[test]
    fn test_phase_after_calendar_end_defaults_to_post_reopening() {
        let calendar = PolicyCalendar::default();
        assert_eq!(
            calendar.phase_for(ymd(2024, 1, 1)),
            InterventionPhase::PostReopening
        );
    }

    #[test]
    fn test_phase_before_calendar_start_defaults_to_post_reopening() {
        let calendar = PolicyCalendar::default();
        assert_eq!(
            calendar.phase_for(ymd(2020, 1, 1)),
            InterventionPhase::PostReopening
        );
    }

    #[test]
    fn test_phase_in_calendar_gap_defaults_to_post_reopening() {
        let calendar = PolicyCalendar {
            intervals: vec![
                PhaseInterval {
                    phase: InterventionPhase::Lockdown,
                    start: ymd(2020, 3, 1),
                    end: ymd(2020, 3, 31),
                },
                PhaseInterval {
                    phase: InterventionPhase::Reopening,
                    start: ymd(2020, 5, 1),
                    end: ymd(2020, 5, 31),
                },
            ],
        };
        assert!(calendar.validate().is_ok());

        assert_eq!(
            calendar.phase_for(ymd(2020, 3, 31)),
            InterventionPhase::Lockdown
        );
        assert_eq!(
            calendar.phase_for(ymd(2020, 4, 15)),
            InterventionPhase::PostReopening
        );
        assert_eq!(
            calendar.phase_for(ymd(2020, 5, 1)),
            InterventionPhase::Reopening
        );
    }

    #[test]
    fn test_overlapping_phases_rejected() {
        let mut config = EngineConfig::default();
        config.policy.intervals[1].start = ymd(2020, 3, 1);

        let result = config.validate();
        assert!(matches!(result, Err(ComputeError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_scalars_rejected() {
        let config = EngineConfig {
            horizon: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            outlier_quantile: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            population: PopulationTable::new(BTreeMap::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let json = r#"{
            "horizon": 14,
            "population": { "Atlantis": 250000 }
        }"#;

        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.horizon, 14);
        assert_eq!(config.rolling_window, DEFAULT_ROLLING_WINDOW);
        assert_eq!(config.population.len(), 1);
        assert_eq!(config.population.get("Atlantis"), Some(250_000.0));
        assert_eq!(config.vaccine_cutoff, ymd(2021, 1, 1));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig::default();
        let json = config.to_json().unwrap();
        let loaded = EngineConfig::from_json(&json).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_population_median() {
        let table = PopulationTable::new(
            [("A", 10.0), ("B", 30.0), ("C", 20.0), ("D", 40.0)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        );
        assert_eq!(table.median(), Some(25.0));
    }
}
