use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::constants::round_label;
use crate::error::{Result, SimError};
use crate::forest::Regressor;
use crate::matchup::Matchup;
use crate::simulation::{lookup_stats, SimulationEngine, SimulationSummary};
use crate::stats::StatRecord;

/// Pair a seed-ordered list: position i meets position len - 1 - i.
///
/// The better seed hosts. With an odd count the middle team has no opponent
/// and is left out.
pub fn get_matchups(teams: &[String]) -> Vec<Matchup> {
    let n = teams.len();
    (0..n / 2)
        .map(|i| Matchup::new(teams[i].clone(), teams[n - 1 - i].clone()))
        .collect()
}

/// One completed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub label: String,
    pub summaries: Vec<SimulationSummary>,
    /// Winners in pairing order; this is the next round's seed list
    pub winners: Vec<String>,
}

/// Every round of a simulated bracket plus the champion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BracketOutcome {
    pub rounds: Vec<RoundResult>,
    pub champion: String,
}

impl BracketOutcome {
    /// Winners of each round, first round first.
    pub fn champion_chain(&self) -> Vec<&[String]> {
        self.rounds.iter().map(|r| r.winners.as_slice()).collect()
    }

    /// Deepest round label a team reached by winning, if any.
    pub fn furthest_win(&self, team: &str) -> Option<&str> {
        self.rounds
            .iter()
            .rev()
            .find(|r| r.winners.iter().any(|w| w == team))
            .map(|r| r.label.as_str())
    }
}

fn validate_field(seeds: &[String]) -> Result<()> {
    if seeds.len() < 2 || !seeds.len().is_power_of_two() {
        return Err(SimError::InvalidBracket(format!(
            "field size must be a power of two of at least 2, got {}",
            seeds.len()
        )));
    }
    let mut unique: Vec<&String> = seeds.iter().collect();
    unique.sort();
    unique.dedup();
    if unique.len() != seeds.len() {
        return Err(SimError::InvalidBracket(
            "a team appears more than once in the field".to_string(),
        ));
    }
    Ok(())
}

/// Play a single-elimination bracket to a champion.
///
/// Games within a round are independent and run in parallel, each with a
/// seed drawn from `rng` in pairing order. Rounds are sequential. Every
/// game uses `bracket_trials` trials.
pub fn simulate_bracket<M: Regressor, R: Rng>(
    engine: &SimulationEngine<'_, M>,
    seeds: &[String],
    stats: &HashMap<String, StatRecord>,
    rng: &mut R,
) -> Result<BracketOutcome> {
    validate_field(seeds)?;
    for team in seeds {
        lookup_stats(stats, team)?;
    }

    let total_rounds = seeds.len().trailing_zeros() as usize;
    let trials = engine.config().bracket_trials;
    let mut field = seeds.to_vec();
    let mut rounds = Vec::with_capacity(total_rounds);

    for round in 0..total_rounds {
        let label = round_label(round, total_rounds);
        let matchups = get_matchups(&field);
        let game_seeds: Vec<u64> = matchups.iter().map(|_| rng.gen()).collect();

        let summaries = matchups
            .par_iter()
            .zip(game_seeds.par_iter())
            .map(|(matchup, &seed)| {
                let home = lookup_stats(stats, &matchup.home)?;
                let away = lookup_stats(stats, &matchup.away)?;
                engine.simulate_trials(
                    matchup,
                    home,
                    away,
                    trials,
                    &mut ChaCha8Rng::seed_from_u64(seed),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        field = summaries
            .iter()
            .map(|s| s.winner_team().to_string())
            .collect();
        info!(round = %label, games = summaries.len(), "bracket round complete");

        rounds.push(RoundResult {
            label,
            summaries,
            winners: field.clone(),
        });
    }

    // validate_field guarantees at least one round with one winner
    let champion = field
        .pop()
        .ok_or_else(|| SimError::InvalidBracket("bracket produced no champion".to_string()))?;
    Ok(BracketOutcome { rounds, champion })
}
