use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, SimError};
use crate::lookup::TeamDirectory;
use crate::simulation::SimulationSummary;

/// Optional context carried alongside a matchup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchupMeta {
    pub home_rank: Option<u32>,
    pub away_rank: Option<u32>,
    /// Game between two ranked teams or otherwise featured
    pub marquee: bool,
    pub scheduled: Option<String>,
}

/// A directional pairing: `home` hosts `away`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    pub home: String,
    pub away: String,
    #[serde(default)]
    pub meta: MatchupMeta,
}

impl Matchup {
    pub fn new(home: impl Into<String>, away: impl Into<String>) -> Self {
        Matchup {
            home: home.into(),
            away: away.into(),
            meta: MatchupMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: MatchupMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn title(&self) -> String {
        format!("{} at {}", self.away, self.home)
    }
}

/// Prediction handed to persistence for one matchup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub home_name: String,
    pub home_abbreviation: String,
    pub away_name: String,
    pub away_abbreviation: String,
    pub time: Option<String>,
    pub predicted_winner: String,
    pub predicted_winner_abbreviation: String,
    pub predicted_loser: String,
    pub predicted_loser_abbreviation: String,
    pub winner_probability: f64,
    pub loser_probability: f64,
    pub winner_points: f64,
    pub loser_points: f64,
    pub tags: Vec<String>,
}

impl PredictionRecord {
    /// Both teams must be in the directory.
    pub fn from_summary(
        matchup: &Matchup,
        summary: &SimulationSummary,
        directory: &TeamDirectory,
    ) -> Result<Self> {
        let home_name = display_name(directory, &matchup.home, matchup.meta.home_rank)?;
        let away_name = display_name(directory, &matchup.away, matchup.meta.away_rank)?;

        let mut tags: BTreeSet<String> = BTreeSet::new();
        tags.insert("all".to_string());
        if matchup.meta.marquee {
            tags.insert("top-25".to_string());
        }
        for team in [&matchup.home, &matchup.away] {
            let conference = directory
                .conference_of(team)
                .ok_or_else(|| SimError::UnknownTeam(team.clone()))?;
            tags.insert(conference.to_string());
        }

        let (winner_name, loser_name) = if summary.winner_team() == matchup.home {
            (home_name.clone(), away_name.clone())
        } else {
            (away_name.clone(), home_name.clone())
        };

        Ok(PredictionRecord {
            home_name,
            home_abbreviation: matchup.home.clone(),
            away_name,
            away_abbreviation: matchup.away.clone(),
            time: matchup.meta.scheduled.clone(),
            predicted_winner: winner_name,
            predicted_winner_abbreviation: summary.winner_team().to_string(),
            predicted_loser: loser_name,
            predicted_loser_abbreviation: summary.loser_team().to_string(),
            winner_probability: summary.winner_probability,
            loser_probability: summary.loser_probability,
            winner_points: summary.winner_points,
            loser_points: summary.loser_points,
            tags: tags.into_iter().collect(),
        })
    }
}

fn display_name(directory: &TeamDirectory, team: &str, rank: Option<u32>) -> Result<String> {
    let name = directory.name_for(team)?;
    Ok(match rank {
        Some(rank) => format!("({}) {}", rank, name),
        None => name.to_string(),
    })
}
