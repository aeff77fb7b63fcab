//! Single-game variance around season averages.
//!
//! [`compute_stdev_map`] measures how far each stat spreads across the team
//! population; [`sample_variance`] uses that spread to jitter one team's
//! averages into a plausible single-game line.

use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{Result, SimError};
use crate::stats::{is_opponent_field, StatRecord};

/// Per-statistic standard deviation across the team population.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StdevMap {
    stdevs: BTreeMap<String, f64>,
}

impl StdevMap {
    pub fn new() -> Self {
        StdevMap::default()
    }

    /// Same deviation for every listed stat.
    pub fn uniform<'a>(stats: impl IntoIterator<Item = &'a str>, stdev: f64) -> Self {
        stats.into_iter().map(|s| (s, stdev)).collect()
    }

    pub fn insert(&mut self, stat: impl Into<String>, stdev: f64) {
        self.stdevs.insert(stat.into(), stdev);
    }

    /// Deviation for a stat; a missing entry is an error, never zero.
    pub fn get(&self, stat: &str) -> Result<f64> {
        let stdev = *self
            .stdevs
            .get(stat)
            .ok_or_else(|| SimError::InsufficientVariance(stat.to_string()))?;
        if !stdev.is_finite() || stdev < 0.0 {
            return Err(SimError::InvalidStdev {
                stat: stat.to_string(),
                value: stdev,
            });
        }
        Ok(stdev)
    }

    pub fn contains(&self, stat: &str) -> bool {
        self.stdevs.contains_key(stat)
    }

    pub fn len(&self) -> usize {
        self.stdevs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stdevs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.stdevs.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for StdevMap {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        StdevMap {
            stdevs: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Sample standard deviation of every stat column over the population.
///
/// Each team contributes its home-formatted row and its opponent-prefixed
/// row, so both `x` and `opp_x` get a deviation. Columns with fewer than two
/// observations are left out; sampling them later fails loudly.
pub fn compute_stdev_map<'a, I>(records: I) -> Result<StdevMap>
where
    I: IntoIterator<Item = &'a StatRecord>,
{
    let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut teams = 0usize;

    for record in records {
        teams += 1;
        for row in [record.own_view(), record.opponent_view()] {
            for (stat, value) in row.iter() {
                columns.entry(stat.to_string()).or_default().push(value);
            }
        }
    }

    if teams < 2 {
        return Err(SimError::InsufficientData(format!(
            "need at least 2 teams to measure variance, got {}",
            teams
        )));
    }

    let mut stdevs = StdevMap::new();
    for (stat, values) in columns {
        if values.len() < 2 {
            warn!(stat = %stat, "skipping stdev for stat reported by a single team");
            continue;
        }
        stdevs.insert(stat, values.iter().std_dev());
    }
    debug!(teams, columns = stdevs.len(), "computed stdev map");
    Ok(stdevs)
}

/// Perturb every own-side stat by `uniform(-stdev, +stdev)`.
///
/// Opponent-prefixed fields are carried over unchanged.
pub fn sample_variance<R: Rng>(
    record: &StatRecord,
    stdevs: &StdevMap,
    rng: &mut R,
) -> Result<StatRecord> {
    let mut sampled = StatRecord::new();
    for (stat, value) in record.iter() {
        if is_opponent_field(stat) {
            sampled.insert(stat, value);
            continue;
        }
        let stdev = stdevs.get(stat)?;
        let noise = if stdev > 0.0 {
            rng.gen_range(-stdev..=stdev)
        } else {
            0.0
        };
        sampled.insert(stat, value + noise);
    }
    Ok(sampled)
}
