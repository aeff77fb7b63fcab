//! Monte Carlo matchup simulation.
//!
//! Each trial jitters both teams' averages, builds the differential vector
//! and asks the predictor for a score. Trials are independent, so they run
//! on the rayon pool; every trial gets its own seed drawn up front from the
//! caller's RNG, which keeps a seeded batch reproducible under any thread
//! scheduling.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::SimulationConfig;
use crate::differential::build_differential;
use crate::error::{Result, SimError};
use crate::forest::{RandomForest, Regressor, ScorePair};
use crate::matchup::Matchup;
use crate::predictor::Predictor;
use crate::stats::StatRecord;
use crate::variance::{sample_variance, StdevMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

/// Winner of a single predicted score; the home side takes exact ties.
pub fn trial_winner(pair: ScorePair) -> Side {
    if pair[1] > pair[0] {
        Side::Away
    } else {
        Side::Home
    }
}

/// How the home team came to be declared winner without outscoring the away side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Both sides won the same number of trials
    HomeOnEqualWins,
    /// Every trial predicted identical scores for both sides
    DegenerateTie,
}

/// Running counters for a batch of trials.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrialTally {
    pub trials: usize,
    pub home_wins: usize,
    pub away_wins: usize,
    pub tied: usize,
    pub home_points: f64,
    pub away_points: f64,
}

impl TrialTally {
    pub fn record(mut self, pair: ScorePair) -> Self {
        self.trials += 1;
        if pair[0] == pair[1] {
            self.tied += 1;
        }
        match trial_winner(pair) {
            Side::Home => self.home_wins += 1,
            Side::Away => self.away_wins += 1,
        }
        self.home_points += pair[0];
        self.away_points += pair[1];
        self
    }

    pub fn merge(self, other: TrialTally) -> Self {
        TrialTally {
            trials: self.trials + other.trials,
            home_wins: self.home_wins + other.home_wins,
            away_wins: self.away_wins + other.away_wins,
            tied: self.tied + other.tied,
            home_points: self.home_points + other.home_points,
            away_points: self.away_points + other.away_points,
        }
    }

    pub fn wins(&self, side: Side) -> usize {
        match side {
            Side::Home => self.home_wins,
            Side::Away => self.away_wins,
        }
    }

    pub fn points(&self, side: Side) -> f64 {
        match side {
            Side::Home => self.home_points,
            Side::Away => self.away_points,
        }
    }
}

/// Aggregate of one batch of trials for one matchup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub home: String,
    pub away: String,
    pub trials: usize,
    pub home_wins: usize,
    pub away_wins: usize,
    pub home_points_total: f64,
    pub away_points_total: f64,
    pub winner: Side,
    pub winner_probability: f64,
    pub loser_probability: f64,
    pub winner_points: f64,
    pub loser_points: f64,
    pub tie_break: Option<TieBreak>,
}

impl SimulationSummary {
    /// Finalise a tally.
    ///
    /// The side with more trial wins is the winner; equal win counts go to
    /// the home team. Probabilities are win shares clamped to the configured
    /// floor and cap, so a side that never won still reports the floor.
    pub fn from_tally(
        matchup: &Matchup,
        tally: TrialTally,
        config: &SimulationConfig,
    ) -> Result<Self> {
        if tally.trials == 0 {
            return Err(SimError::InvalidConfig(
                "cannot summarise an empty batch".to_string(),
            ));
        }

        let (winner, tie_break) = if tally.tied == tally.trials {
            (Side::Home, Some(TieBreak::DegenerateTie))
        } else if tally.home_wins == tally.away_wins {
            (Side::Home, Some(TieBreak::HomeOnEqualWins))
        } else if tally.home_wins > tally.away_wins {
            (Side::Home, None)
        } else {
            (Side::Away, None)
        };
        let loser = winner.other();
        let n = tally.trials as f64;

        Ok(SimulationSummary {
            home: matchup.home.clone(),
            away: matchup.away.clone(),
            trials: tally.trials,
            home_wins: tally.home_wins,
            away_wins: tally.away_wins,
            home_points_total: tally.home_points,
            away_points_total: tally.away_points,
            winner,
            winner_probability: config.bound_probability(tally.wins(winner) as f64 / n),
            loser_probability: config.bound_probability(tally.wins(loser) as f64 / n),
            winner_points: tally.points(winner) / n,
            loser_points: tally.points(loser) / n,
            tie_break,
        })
    }

    pub fn loser(&self) -> Side {
        self.winner.other()
    }

    pub fn team(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn winner_team(&self) -> &str {
        self.team(self.winner)
    }

    pub fn loser_team(&self) -> &str {
        self.team(self.loser())
    }
}

/// Stats for a team, or `MissingTeamData`.
pub fn lookup_stats<'s>(
    stats: &'s HashMap<String, StatRecord>,
    team: &str,
) -> Result<&'s StatRecord> {
    stats
        .get(team)
        .ok_or_else(|| SimError::MissingTeamData(team.to_string()))
}

/// Seeded RNG from the config seed, or entropy when unset.
pub fn master_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Runs batches of trials against a shared predictor and stdev map.
pub struct SimulationEngine<'a, M: Regressor = RandomForest> {
    predictor: &'a Predictor<M>,
    stdevs: &'a StdevMap,
    config: SimulationConfig,
}

impl<'a, M: Regressor> SimulationEngine<'a, M> {
    pub fn new(
        predictor: &'a Predictor<M>,
        stdevs: &'a StdevMap,
        config: SimulationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(SimulationEngine {
            predictor,
            stdevs,
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn predictor(&self) -> &Predictor<M> {
        self.predictor
    }

    pub fn stdevs(&self) -> &StdevMap {
        self.stdevs
    }

    /// Prediction from season averages with no variance applied.
    pub fn baseline(&self, home: &StatRecord, away: &StatRecord) -> Result<ScorePair> {
        self.predictor
            .predict_vector(&build_differential(home, away), self.config.output_kind)
    }

    /// One trial: jitter both sides independently, then predict.
    pub fn trial<R: Rng>(
        &self,
        home: &StatRecord,
        away: &StatRecord,
        rng: &mut R,
    ) -> Result<ScorePair> {
        let home_line = sample_variance(home, self.stdevs, rng)?;
        let away_line = sample_variance(away, self.stdevs, rng)?;
        self.predictor.predict_vector(
            &build_differential(&home_line, &away_line),
            self.config.output_kind,
        )
    }

    /// Run the configured number of trials for a matchup.
    pub fn simulate_matchup<R: Rng>(
        &self,
        matchup: &Matchup,
        home: &StatRecord,
        away: &StatRecord,
        rng: &mut R,
    ) -> Result<SimulationSummary> {
        self.simulate_trials(matchup, home, away, self.config.trials_per_matchup, rng)
    }

    /// Run `trials` independent trials and summarise them.
    ///
    /// Any trial error aborts the whole batch; no partial summary is returned.
    pub fn simulate_trials<R: Rng>(
        &self,
        matchup: &Matchup,
        home: &StatRecord,
        away: &StatRecord,
        trials: usize,
        rng: &mut R,
    ) -> Result<SimulationSummary> {
        if trials == 0 {
            return Err(SimError::InvalidConfig(
                "trial count must be positive".to_string(),
            ));
        }
        let seeds: Vec<u64> = (0..trials).map(|_| rng.gen()).collect();

        let tally = seeds
            .par_iter()
            .map(|&seed| self.trial(home, away, &mut ChaCha8Rng::seed_from_u64(seed)))
            .try_fold(TrialTally::default, |tally, pair| pair.map(|p| tally.record(p)))
            .try_reduce(TrialTally::default, |a, b| Ok(a.merge(b)))?;

        let summary = SimulationSummary::from_tally(matchup, tally, &self.config)?;
        debug!(
            matchup = %matchup.title(),
            trials,
            winner = summary.winner_team(),
            probability = summary.winner_probability,
            "simulated matchup"
        );
        Ok(summary)
    }

    /// Simulate every matchup of a slate, looking stats up by team.
    ///
    /// Matchups run in order so a seeded RNG yields the same summaries each time.
    pub fn simulate_slate<R: Rng>(
        &self,
        matchups: &[Matchup],
        stats: &HashMap<String, StatRecord>,
        rng: &mut R,
    ) -> Result<Vec<SimulationSummary>> {
        matchups
            .iter()
            .map(|matchup| {
                let home = lookup_stats(stats, &matchup.home)?;
                let away = lookup_stats(stats, &matchup.away)?;
                self.simulate_matchup(matchup, home, away, rng)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::tests::MarginModel;
    use proptest::prelude::*;

    fn record(pts: f64, trb: f64) -> StatRecord {
        [("pts", pts), ("trb", trb)].into_iter().collect()
    }

    /// Home points = 70 + points_difference, away points = 70.
    fn margin_predictor() -> Predictor<MarginModel> {
        Predictor::new(
            MarginModel {
                base: 70.0,
                n_features: 1,
            },
            vec!["points_difference".to_string()],
        )
        .unwrap()
    }

    fn config(trials: usize) -> SimulationConfig {
        SimulationConfig {
            trials_per_matchup: trials,
            output_kind: crate::predictor::OutputKind::Real,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_identical_teams_zero_variance_home_wins() {
        let predictor = margin_predictor();
        let stdevs = StdevMap::uniform(["pts", "trb"], 0.0);
        let team = record(75.0, 36.0);

        for trials in [1, 7, 100] {
            let engine = SimulationEngine::new(&predictor, &stdevs, config(trials)).unwrap();
            let summary = engine
                .simulate_matchup(
                    &Matchup::new("a", "b"),
                    &team,
                    &team,
                    &mut ChaCha8Rng::seed_from_u64(1),
                )
                .unwrap();

            assert_eq!(summary.winner, Side::Home);
            assert_eq!(summary.winner_team(), "a");
            assert_eq!(summary.winner_probability, 0.99);
            assert_eq!(summary.loser_probability, 0.01);
            assert_eq!(summary.tie_break, Some(TieBreak::DegenerateTie));
            assert_eq!(summary.winner_points, 70.0);
        }
    }

    #[test]
    fn test_stronger_away_team_wins() {
        let predictor = margin_predictor();
        let stdevs = StdevMap::uniform(["pts", "trb"], 2.0);
        let engine = SimulationEngine::new(&predictor, &stdevs, config(200)).unwrap();

        let summary = engine
            .simulate_matchup(
                &Matchup::new("home", "away"),
                &record(65.0, 30.0),
                &record(80.0, 40.0),
                &mut ChaCha8Rng::seed_from_u64(5),
            )
            .unwrap();

        assert_eq!(summary.winner, Side::Away);
        assert_eq!(summary.away_wins, 200);
        assert_eq!(summary.winner_probability, 0.99);
        assert_eq!(summary.loser_probability, 0.01);
        assert_eq!(summary.tie_break, None);
        assert!(summary.loser_points < 60.0);
    }

    #[test]
    fn test_seeded_batches_are_reproducible() {
        let predictor = margin_predictor();
        let stdevs = StdevMap::uniform(["pts", "trb"], 8.0);
        let engine = SimulationEngine::new(&predictor, &stdevs, config(64)).unwrap();
        let (home, away) = (record(72.0, 35.0), record(71.0, 34.0));
        let matchup = Matchup::new("x", "y");

        let a = engine
            .simulate_matchup(&matchup, &home, &away, &mut ChaCha8Rng::seed_from_u64(77))
            .unwrap();
        let b = engine
            .simulate_matchup(&matchup, &home, &away, &mut ChaCha8Rng::seed_from_u64(77))
            .unwrap();
        assert_eq!(a.home_wins, b.home_wins);
        assert!((a.home_points_total - b.home_points_total).abs() < 1e-9);
        assert_eq!(a.home_wins + a.away_wins, 64);
    }

    #[test]
    fn test_missing_stdev_aborts_batch() {
        let predictor = margin_predictor();
        let stdevs = StdevMap::uniform(["pts"], 1.0);
        let engine = SimulationEngine::new(&predictor, &stdevs, config(10)).unwrap();

        let result = engine.simulate_matchup(
            &Matchup::new("a", "b"),
            &record(70.0, 30.0),
            &record(70.0, 30.0),
            &mut ChaCha8Rng::seed_from_u64(3),
        );
        assert!(matches!(result, Err(SimError::InsufficientVariance(_))));
    }

    #[test]
    fn test_feature_mismatch_propagates() {
        let predictor = margin_predictor();
        let stdevs = StdevMap::uniform(["trb"], 1.0);
        let engine = SimulationEngine::new(&predictor, &stdevs, config(10)).unwrap();
        let team: StatRecord = [("trb", 30.0)].into_iter().collect();

        let result = engine.simulate_matchup(
            &Matchup::new("a", "b"),
            &team,
            &team,
            &mut ChaCha8Rng::seed_from_u64(3),
        );
        assert!(matches!(result, Err(SimError::FeatureMismatch { .. })));
    }

    #[test]
    fn test_slate_requires_team_stats() {
        let predictor = margin_predictor();
        let stdevs = StdevMap::uniform(["pts", "trb"], 0.0);
        let engine = SimulationEngine::new(&predictor, &stdevs, config(5)).unwrap();
        let mut stats = HashMap::new();
        stats.insert("a".to_string(), record(70.0, 30.0));

        let result = engine.simulate_slate(
            &[Matchup::new("a", "ghost")],
            &stats,
            &mut ChaCha8Rng::seed_from_u64(0),
        );
        assert!(matches!(result, Err(SimError::MissingTeamData(t)) if t == "ghost"));
    }

    #[test]
    fn test_baseline_has_no_variance() {
        let predictor = margin_predictor();
        let stdevs = StdevMap::new();
        let engine = SimulationEngine::new(&predictor, &stdevs, config(5)).unwrap();

        let pair = engine.baseline(&record(80.0, 30.0), &record(74.0, 30.0)).unwrap();
        assert_eq!(pair, [76.0, 70.0]);
    }

    #[test]
    fn test_equal_win_counts_go_home() {
        let tally = TrialTally::default()
            .record([70.0, 60.0])
            .record([60.0, 70.0]);
        let summary =
            SimulationSummary::from_tally(&Matchup::new("h", "a"), tally, &config(2)).unwrap();

        assert_eq!(summary.winner, Side::Home);
        assert_eq!(summary.tie_break, Some(TieBreak::HomeOnEqualWins));
        assert_eq!(summary.winner_probability, 0.5);
        assert_eq!(summary.loser_probability, 0.5);
    }

    #[test]
    fn test_tally_merge() {
        let a = TrialTally::default().record([70.0, 65.0]);
        let b = TrialTally::default().record([61.0, 66.0]).record([60.0, 60.0]);
        let merged = a.merge(b);

        assert_eq!(merged.trials, 3);
        assert_eq!(merged.home_wins, 2);
        assert_eq!(merged.away_wins, 1);
        assert_eq!(merged.tied, 1);
        assert_eq!(merged.home_points, 191.0);
    }

    #[test]
    fn test_empty_tally_rejected() {
        assert!(SimulationSummary::from_tally(
            &Matchup::new("h", "a"),
            TrialTally::default(),
            &config(1)
        )
        .is_err());
    }

    proptest! {
        #[test]
        fn prop_probabilities_bounded(
            outcomes in proptest::collection::vec((40.0f64..100.0, 40.0f64..100.0), 1..200)
        ) {
            let tally = outcomes
                .iter()
                .fold(TrialTally::default(), |t, &(h, a)| t.record([h, a]));
            let summary =
                SimulationSummary::from_tally(&Matchup::new("h", "a"), tally, &config(1)).unwrap();

            prop_assert!(summary.winner_probability >= 0.01 && summary.winner_probability <= 0.99);
            prop_assert!(summary.loser_probability >= 0.01 && summary.loser_probability <= 0.99);
            prop_assert!(summary.winner_probability >= summary.loser_probability);
            prop_assert_eq!(summary.home_wins + summary.away_wins, outcomes.len());
        }

        #[test]
        fn prop_forced_ties_always_home(trials in 1usize..300) {
            let tally = (0..trials).fold(TrialTally::default(), |t, _| t.record([68.0, 68.0]));
            let summary =
                SimulationSummary::from_tally(&Matchup::new("h", "a"), tally, &config(1)).unwrap();
            prop_assert_eq!(summary.winner, Side::Home);
            prop_assert_eq!(summary.tie_break, Some(TieBreak::DegenerateTie));
        }
    }
}
