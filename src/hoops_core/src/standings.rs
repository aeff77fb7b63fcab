//! Round-robin standings projection.
//!
//! Each run samples one game-day line per team, predicts the whole
//! remaining schedule with it and ranks the teams by total wins. Runs are
//! independent; each worker folds its runs into a private accumulator and
//! the partial accumulators are merged at the end.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::differential::build_differential;
use crate::error::{Result, SimError};
use crate::forest::Regressor;
use crate::matchup::Matchup;
use crate::simulation::{lookup_stats, trial_winner, SimulationEngine, Side};
use crate::stats::StatRecord;
use crate::variance::sample_variance;

/// Sort a schedule by (home, away) and drop repeated pairings.
pub fn dedup_schedule(schedule: &[Matchup]) -> Vec<Matchup> {
    let mut games = schedule.to_vec();
    games.sort_by(|a, b| (&a.home, &a.away).cmp(&(&b.home, &b.away)));
    games.dedup_by(|a, b| a.home == b.home && a.away == b.away);
    games
}

/// 1-based rank for each team, indexed like `wins`.
///
/// Teams are ordered by wins descending, then by their position in the
/// list. Equal win totals share the rank of the first team in the band,
/// so four teams on 10, 8, 8 and 5 wins rank 1, 2, 2 and 4.
pub fn rank_teams(wins: &[u32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..wins.len()).collect();
    // stable sort keeps list order within a band
    order.sort_by(|&a, &b| wins[b].cmp(&wins[a]));

    let mut ranks = vec![0; wins.len()];
    for (pos, &team) in order.iter().enumerate() {
        ranks[team] = if pos > 0 && wins[order[pos - 1]] == wins[team] {
            ranks[order[pos - 1]]
        } else {
            pos + 1
        };
    }
    ranks
}

/// Per-team finish distribution in a standings record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeamStanding {
    pub team: String,
    pub expected_wins: f64,
    /// Entry r is the share of runs finishing at rank r + 1
    pub finish_probabilities: Vec<f64>,
}

/// Finish-rank distribution for every team, in team-list order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandingsRecord {
    pub num_sims: usize,
    pub teams: Vec<TeamStanding>,
}

impl StandingsRecord {
    /// Team most likely to finish first; earlier teams win ties.
    pub fn favourite(&self) -> Option<&TeamStanding> {
        self.teams.iter().reduce(|best, t| {
            if t.finish_probabilities[0] > best.finish_probabilities[0] {
                t
            } else {
                best
            }
        })
    }
}

/// How often each team finished at each rank across schedule-wide runs.
#[derive(Clone, Debug, PartialEq)]
pub struct StandingsAccumulator {
    teams: Vec<String>,
    index: HashMap<String, usize>,
    counts: Vec<Vec<u64>>,
    total_wins: Vec<u64>,
    num_sims: usize,
}

impl StandingsAccumulator {
    pub fn new(teams: &[String]) -> Result<Self> {
        if teams.is_empty() {
            return Err(SimError::InsufficientData(
                "standings need at least one team".to_string(),
            ));
        }
        let mut index = HashMap::with_capacity(teams.len());
        for (i, team) in teams.iter().enumerate() {
            if index.insert(team.clone(), i).is_some() {
                return Err(SimError::InvalidConfig(format!(
                    "team listed twice in standings: {}",
                    team
                )));
            }
        }
        Ok(StandingsAccumulator {
            teams: teams.to_vec(),
            index,
            counts: vec![vec![0; teams.len()]; teams.len()],
            total_wins: vec![0; teams.len()],
            num_sims: 0,
        })
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn num_sims(&self) -> usize {
        self.num_sims
    }

    fn position(&self, team: &str) -> Result<usize> {
        self.index
            .get(team)
            .copied()
            .ok_or_else(|| SimError::UnknownTeam(team.to_string()))
    }

    /// Tally one run's final win totals, indexed like `teams()`.
    pub fn record_run(&mut self, wins: &[u32]) -> Result<()> {
        if wins.len() != self.teams.len() {
            return Err(SimError::InvalidConfig(format!(
                "expected {} win totals, got {}",
                self.teams.len(),
                wins.len()
            )));
        }
        for (team, rank) in rank_teams(wins).into_iter().enumerate() {
            self.counts[team][rank - 1] += 1;
            self.total_wins[team] += u64::from(wins[team]);
        }
        self.num_sims += 1;
        Ok(())
    }

    /// Combine two partial accumulators over the same team list.
    pub fn merge(mut self, other: StandingsAccumulator) -> Result<Self> {
        if self.teams != other.teams {
            return Err(SimError::InvalidConfig(
                "cannot merge standings over different teams".to_string(),
            ));
        }
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        for (a, b) in self.total_wins.iter_mut().zip(other.total_wins) {
            *a += b;
        }
        self.num_sims += other.num_sims;
        Ok(self)
    }

    /// Raw per-rank counts for a team.
    pub fn counts(&self, team: &str) -> Result<&[u64]> {
        Ok(&self.counts[self.position(team)?])
    }

    /// Sum of every counter; equals runs times teams.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    fn require_runs(&self) -> Result<f64> {
        if self.num_sims == 0 {
            return Err(SimError::InsufficientData(
                "no standings runs recorded".to_string(),
            ));
        }
        Ok(self.num_sims as f64)
    }

    /// Share of runs in which `team` finished at 1-based `rank`.
    ///
    /// A team that never finished there yields 0.0. A team that is not part
    /// of the standings is an error, not a zero.
    pub fn finish_probability(&self, team: &str, rank: usize) -> Result<f64> {
        let runs = self.require_runs()?;
        let counts = self.counts(team)?;
        if rank == 0 || rank > counts.len() {
            return Err(SimError::InvalidConfig(format!(
                "rank {} outside 1..={}",
                rank,
                counts.len()
            )));
        }
        Ok(counts[rank - 1] as f64 / runs)
    }

    pub fn expected_wins(&self, team: &str) -> Result<f64> {
        let runs = self.require_runs()?;
        Ok(self.total_wins[self.position(team)?] as f64 / runs)
    }

    pub fn finish_probabilities(&self) -> Result<StandingsRecord> {
        let runs = self.require_runs()?;
        let teams = self
            .teams
            .iter()
            .enumerate()
            .map(|(i, team)| TeamStanding {
                team: team.clone(),
                expected_wins: self.total_wins[i] as f64 / runs,
                finish_probabilities: self.counts[i].iter().map(|&c| c as f64 / runs).collect(),
            })
            .collect();
        Ok(StandingsRecord {
            num_sims: self.num_sims,
            teams,
        })
    }
}

/// Project final standings over `num_sims` independent runs.
///
/// `conference_wins` holds wins already banked; teams absent from it start
/// at zero. Every matchup in `schedule` must be between listed teams.
pub fn simulate_standings<M: Regressor, R: Rng>(
    engine: &SimulationEngine<'_, M>,
    teams: &[String],
    schedule: &[Matchup],
    stats: &HashMap<String, StatRecord>,
    conference_wins: &HashMap<String, u32>,
    num_sims: usize,
    rng: &mut R,
) -> Result<StandingsAccumulator> {
    if num_sims == 0 {
        return Err(SimError::InvalidConfig(
            "num_sims must be positive".to_string(),
        ));
    }
    let empty = StandingsAccumulator::new(teams)?;

    let records = teams
        .iter()
        .map(|team| lookup_stats(stats, team))
        .collect::<Result<Vec<_>>>()?;
    let games = schedule
        .iter()
        .map(|m| Ok((empty.position(&m.home)?, empty.position(&m.away)?)))
        .collect::<Result<Vec<(usize, usize)>>>()?;
    let mut banked = vec![0u32; teams.len()];
    for (team, &wins) in conference_wins {
        banked[empty.position(team)?] = wins;
    }

    let seeds: Vec<u64> = (0..num_sims).map(|_| rng.gen()).collect();
    let run = |seed: u64| -> Result<Vec<u32>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let lines = records
            .iter()
            .map(|record| sample_variance(record, engine.stdevs(), &mut rng))
            .collect::<Result<Vec<_>>>()?;

        let predictor = engine.predictor();
        let rows = games
            .iter()
            .map(|&(h, a)| predictor.simplify(&build_differential(&lines[h], &lines[a])))
            .collect::<Result<Vec<_>>>()?;
        let scores = predictor.predict(&rows, engine.config().output_kind)?;

        let mut wins = banked.clone();
        for (&(h, a), pair) in games.iter().zip(scores) {
            match trial_winner(pair) {
                Side::Home => wins[h] += 1,
                Side::Away => wins[a] += 1,
            }
        }
        Ok(wins)
    };

    let accumulator = seeds
        .par_iter()
        .try_fold(
            || empty.clone(),
            |mut acc, &seed| {
                acc.record_run(&run(seed)?)?;
                Ok(acc)
            },
        )
        .try_reduce(|| empty.clone(), |a, b| a.merge(b))?;

    debug!(total = accumulator.total_count(), "standings counters merged");
    info!(
        teams = teams.len(),
        games = games.len(),
        num_sims,
        "projected standings"
    );
    Ok(accumulator)
}
