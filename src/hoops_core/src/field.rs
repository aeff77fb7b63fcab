use std::collections::{BTreeMap, HashMap, HashSet};

use crate::constants::{PLAY_IN_SEED_SLOTS, REGULAR_SEED_SLOTS};
use crate::error::{Result, SimError};

/// Fill a tournament field of `size` teams.
///
/// Automatic bids go in first, taken from the back of the list. The rest
/// of the field is at-large bids: the best-ranked teams not already in.
pub fn populate_field(
    auto_bids: &[String],
    rankings: &[String],
    size: usize,
) -> Result<Vec<String>> {
    let mut field = Vec::with_capacity(size);
    let mut seen = HashSet::with_capacity(size);

    for team in auto_bids.iter().rev().chain(rankings) {
        if field.len() == size {
            break;
        }
        if seen.insert(team.as_str()) {
            field.push(team.clone());
        }
    }

    if field.len() < size {
        return Err(SimError::InsufficientData(format!(
            "only {} distinct teams available for a field of {}",
            field.len(),
            size
        )));
    }
    Ok(field)
}

/// Order a field by ranking position, best first.
pub fn sort_field(field: &[String], rankings: &[String]) -> Result<Vec<String>> {
    let position: HashMap<&str, usize> = rankings
        .iter()
        .enumerate()
        .rev()
        .map(|(i, team)| (team.as_str(), i))
        .collect();

    let mut ranked = field
        .iter()
        .map(|team| {
            position
                .get(team.as_str())
                .map(|&rank| (rank, team.clone()))
                .ok_or_else(|| SimError::UnknownTeam(team.clone()))
        })
        .collect::<Result<Vec<_>>>()?;
    ranked.sort();
    Ok(ranked.into_iter().map(|(_, team)| team).collect())
}

fn seed_slots(seed: u32) -> usize {
    PLAY_IN_SEED_SLOTS
        .iter()
        .find(|(s, _)| *s == seed)
        .map(|&(_, slots)| slots)
        .unwrap_or(REGULAR_SEED_SLOTS)
}

/// Group a sorted field into seed lines.
///
/// Lines hold four teams, apart from the play-in lines which hold six.
pub fn assign_seeds(field: &[String]) -> BTreeMap<u32, Vec<String>> {
    let mut seeds: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    let mut seed = 1;
    for team in field {
        let line = seeds.entry(seed).or_default();
        if line.len() == seed_slots(seed) {
            seed += 1;
        }
        seeds.entry(seed).or_default().push(team.clone());
    }
    seeds
}
