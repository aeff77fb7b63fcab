use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    DEFAULT_STANDINGS_SIMS, DEFAULT_TRIALS, IMPORTANCE_THRESHOLD, PROBABILITY_CAP,
    PROBABILITY_FLOOR, VALIDATION_FRACTION,
};
use crate::error::{Result, SimError};
use crate::forest::ForestParams;
use crate::predictor::OutputKind;

/// Settings loaded from a TOML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Monte Carlo settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Trials per matchup for single-game predictions
    pub trials_per_matchup: usize,
    /// Trials per matchup inside a bracket
    pub bracket_trials: usize,
    /// Schedule-wide runs for round-robin standings
    pub standings_sims: usize,
    pub output_kind: OutputKind,
    pub probability_cap: f64,
    pub probability_floor: f64,
    /// Master seed; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            trials_per_matchup: DEFAULT_TRIALS,
            bracket_trials: DEFAULT_TRIALS,
            standings_sims: DEFAULT_STANDINGS_SIMS,
            output_kind: OutputKind::Integer,
            probability_cap: PROBABILITY_CAP,
            probability_floor: PROBABILITY_FLOOR,
            seed: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.trials_per_matchup == 0 || self.bracket_trials == 0 || self.standings_sims == 0 {
            return Err(SimError::InvalidConfig(
                "trial and simulation counts must be positive".to_string(),
            ));
        }
        let (floor, cap) = (self.probability_floor, self.probability_cap);
        if !(floor > 0.0 && floor <= cap && cap < 1.0) {
            return Err(SimError::InvalidConfig(format!(
                "probability bounds must satisfy 0 < floor <= cap < 1, got {} and {}",
                floor, cap
            )));
        }
        Ok(())
    }

    /// Clamp a raw win share into the reportable range.
    pub fn bound_probability(&self, probability: f64) -> f64 {
        probability.clamp(self.probability_floor, self.probability_cap)
    }
}

/// Offline training settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub validation_fraction: f64,
    pub importance_threshold: f64,
    pub seed: u64,
    /// Forest used only to rank features
    pub baseline: ForestParams,
    /// Forest refit on the selected features
    pub refit: ForestParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            validation_fraction: VALIDATION_FRACTION,
            importance_threshold: IMPORTANCE_THRESHOLD,
            seed: 0,
            baseline: ForestParams::baseline(),
            refit: ForestParams::restricted(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(SimError::InvalidConfig(format!(
                "validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        if !(self.importance_threshold >= 0.0) {
            return Err(SimError::InvalidConfig(
                "importance_threshold must be non-negative".to_string(),
            ));
        }
        self.baseline.validate()?;
        self.refit.validate()
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.simulation.validate()?;
        config.training.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
