//! Hoops Core - Monte Carlo game and tournament forecasting.
//!
//! Turns per-team season statistics into matchup feature vectors, jitters
//! them to model single-game variance, runs many trials per matchup
//! through a trained regressor and aggregates the results into win
//! probabilities, bracket champions and standings distributions.
//!
//! Python bindings are available behind the `python` feature.

pub mod bracket;
pub mod config;
pub mod constants;
pub mod differential;
pub mod error;
pub mod field;
pub mod forest;
pub mod lookup;
pub mod matchup;
pub mod predictor;
pub mod simulation;
pub mod standings;
pub mod stats;
pub mod variance;

pub use bracket::{get_matchups, simulate_bracket, BracketOutcome, RoundResult};
pub use config::{Config, SimulationConfig, TrainingConfig};
pub use constants::{PROBABILITY_CAP, PROBABILITY_FLOOR};
pub use differential::{build_differential, MatchupFeatureVector};
pub use error::{Result, SimError};
pub use field::{assign_seeds, populate_field, sort_field};
pub use forest::{ForestParams, MaxFeatures, RandomForest, Regressor, ScorePair};
pub use lookup::{TeamDirectory, TeamEntry};
pub use matchup::{Matchup, MatchupMeta, PredictionRecord};
pub use predictor::{FeatureRow, OutputKind, Predictor, TrainingReport, TrainingSample};
pub use simulation::{master_rng, Side, SimulationEngine, SimulationSummary, TieBreak};
pub use standings::{
    dedup_schedule, rank_teams, simulate_standings, StandingsAccumulator, StandingsRecord,
};
pub use stats::{StatRecord, StatSchema};
pub use variance::{compute_stdev_map, sample_variance, StdevMap};

#[cfg(feature = "python")]
mod python {
    use pyo3::prelude::*;
    use std::collections::HashMap;

    use crate::{
        build_differential, compute_stdev_map, get_matchups, master_rng, Matchup, Predictor,
        SimulationConfig, SimulationEngine, StatRecord, StdevMap,
    };

    fn record(raw: HashMap<String, f64>) -> StatRecord {
        raw.into_iter().collect()
    }

    /// Differential feature vector for a home/away pair of stat records.
    #[pyfunction]
    fn py_build_differential(
        home: HashMap<String, f64>,
        away: HashMap<String, f64>,
    ) -> HashMap<String, f64> {
        build_differential(&record(home), &record(away))
            .iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Per-stat sample standard deviations across a team population.
    #[pyfunction]
    fn py_compute_stdevs(records: Vec<HashMap<String, f64>>) -> PyResult<HashMap<String, f64>> {
        let records: Vec<StatRecord> = records.into_iter().map(record).collect();
        let stdevs = compute_stdev_map(&records)?;
        Ok(stdevs.iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// First-round pairings for a seed-ordered field.
    #[pyfunction]
    fn py_get_matchups(teams: Vec<String>) -> Vec<(String, String)> {
        get_matchups(&teams)
            .into_iter()
            .map(|m| (m.home, m.away))
            .collect()
    }

    /// Simulate one matchup with a saved model.
    ///
    /// Returns (winner, loser, winner_probability, loser_probability,
    /// winner_points, loser_points).
    #[pyfunction]
    #[pyo3(signature = (model_path, home, away, home_stats, away_stats, stdevs, trials = 100, seed = None))]
    #[allow(clippy::too_many_arguments)]
    fn py_simulate_matchup(
        model_path: &str,
        home: String,
        away: String,
        home_stats: HashMap<String, f64>,
        away_stats: HashMap<String, f64>,
        stdevs: HashMap<String, f64>,
        trials: usize,
        seed: Option<u64>,
    ) -> PyResult<(String, String, f64, f64, f64, f64)> {
        let predictor = Predictor::load(model_path)?;
        let stdevs: StdevMap = stdevs.into_iter().collect();
        let config = SimulationConfig {
            trials_per_matchup: trials,
            seed,
            ..SimulationConfig::default()
        };
        let engine = SimulationEngine::new(&predictor, &stdevs, config)?;

        let summary = engine.simulate_matchup(
            &Matchup::new(home, away),
            &record(home_stats),
            &record(away_stats),
            &mut master_rng(seed),
        )?;
        Ok((
            summary.winner_team().to_string(),
            summary.loser_team().to_string(),
            summary.winner_probability,
            summary.loser_probability,
            summary.winner_points,
            summary.loser_points,
        ))
    }

    /// Python module definition
    #[pymodule]
    fn hoops_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(py_build_differential, m)?)?;
        m.add_function(wrap_pyfunction!(py_compute_stdevs, m)?)?;
        m.add_function(wrap_pyfunction!(py_get_matchups, m)?)?;
        m.add_function(wrap_pyfunction!(py_simulate_matchup, m)?)?;

        m.add("PROBABILITY_CAP", crate::PROBABILITY_CAP)?;
        m.add("PROBABILITY_FLOOR", crate::PROBABILITY_FLOOR)?;
        Ok(())
    }
}
