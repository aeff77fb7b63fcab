//! Per-team statistic records.
//!
//! A [`StatRecord`] is one team's season-to-date snapshot with counting stats
//! already expressed as per-game averages. Records are read-only once built;
//! every helper here returns a new record.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::constants::{
    COUNTING_FIELDS, FREE_THROW_POSSESSION_WEIGHT, GAME_MINUTES, OPPONENT_PREFIX, RANKED_FLAG,
    RANK_TIERS,
};
use crate::differential::FIELDS_TO_COMBINE;
use crate::error::{Result, SimError};

/// Statistic name to value for one team.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    fields: BTreeMap<String, f64>,
}

impl StatRecord {
    pub fn new() -> Self {
        StatRecord::default()
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    /// Get a field that must be present.
    pub fn require(&self, field: &str) -> Result<f64> {
        self.get(field)
            .ok_or_else(|| SimError::MissingField(field.to_string()))
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) {
        self.fields.insert(field.into(), value);
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Only the stats describing this team (no `opp_` fields).
    pub fn own_view(&self) -> StatRecord {
        self.iter()
            .filter(|(name, _)| !is_opponent_field(name))
            .collect()
    }

    /// This team's own stats relabelled as the away side of a matchup.
    pub fn opponent_view(&self) -> StatRecord {
        self.iter()
            .filter(|(name, _)| !is_opponent_field(name))
            .map(|(name, value)| (format!("{}{}", OPPONENT_PREFIX, name), value))
            .collect()
    }

    /// Convert season totals into per-game averages.
    ///
    /// Opponent counting fields are averaged alongside the team's own, so
    /// derived rates such as pace see a single scale.
    pub fn per_game_averages(&self, games: f64) -> Result<StatRecord> {
        if !(games > 0.0) {
            return Err(SimError::InsufficientData(format!(
                "cannot average over {} games",
                games
            )));
        }
        let mut averaged = self.clone();
        for field in COUNTING_FIELDS {
            let opponent = format!("{}{}", OPPONENT_PREFIX, field);
            for name in [field, opponent.as_str()] {
                if let Some(total) = self.get(name) {
                    averaged.insert(name, total / games);
                }
            }
        }
        Ok(averaged)
    }

    /// Add two-point and defensive rebound splits.
    pub fn with_derived_shooting(&self) -> Result<StatRecord> {
        let fg2 = self.require("fg")? - self.require("fg3")?;
        let fg2a = self.require("fga")? - self.require("fg3a")?;
        let drb = self.require("trb")? - self.require("orb")?;

        let mut derived = self.clone();
        derived.insert("fg2", fg2);
        derived.insert("fg2a", fg2a);
        derived.insert("fg2_pct", if fg2a != 0.0 { fg2 / fg2a } else { 0.0 });
        derived.insert("drb", drb);
        Ok(derived)
    }

    /// Add pace (possessions per 40 minutes).
    ///
    /// Needs the opponent shooting fields alongside the team's own.
    pub fn with_pace(&self) -> Result<StatRecord> {
        let poss = possessions(
            [
                self.require("fga")?,
                self.require("fta")?,
                self.require("orb")?,
                self.require("tov")?,
            ],
            [
                self.require("opp_fga")?,
                self.require("opp_fta")?,
                self.require("opp_orb")?,
                self.require("opp_tov")?,
            ],
        );
        // Team minutes played, scaled to the five players on the floor.
        let minutes = self.require("mp")?;
        if minutes <= 0.0 {
            return Err(SimError::InsufficientData("no minutes played".to_string()));
        }
        let mut derived = self.clone();
        derived.insert("pace", GAME_MINUTES * (poss / (0.2 * minutes * 5.0)));
        Ok(derived)
    }

    /// Fill in defensive rating from offensive and net rating when absent.
    pub fn with_defensive_rating(&self) -> StatRecord {
        let mut derived = self.clone();
        if !self.contains("def_rtg") {
            if let (Some(off), Some(net)) = (self.get("off_rtg"), self.get("net_rtg")) {
                derived.insert("def_rtg", off - net);
            }
        }
        derived
    }

    pub fn with_record(&self, wins: f64, losses: f64) -> Result<StatRecord> {
        let games = wins + losses;
        if games <= 0.0 {
            return Err(SimError::InsufficientData(
                "win percentage needs at least one game".to_string(),
            ));
        }
        let mut derived = self.clone();
        derived.insert("wins", wins);
        derived.insert("losses", losses);
        derived.insert("win_pct", wins / games);
        Ok(derived)
    }

    /// Strength of schedule shifted to start at zero and scaled by win percentage.
    pub fn with_weighted_sos(&self, min_sos: f64) -> Result<StatRecord> {
        let weighted = (self.require("sos")? - min_sos) * self.require("win_pct")?;
        let mut derived = self.clone();
        derived.insert("weighted_sos", weighted);
        Ok(derived)
    }

    /// Set the rank tier indicator flags for a poll ranking.
    pub fn with_rank(&self, ranking: Option<u32>) -> StatRecord {
        let mut derived = self.clone();
        for (tier, _) in RANK_TIERS {
            derived.insert(tier, 0.0);
        }
        derived.insert(RANKED_FLAG, 0.0);

        if let Some(rank) = ranking {
            if let Some((tier, _)) = RANK_TIERS.iter().find(|(_, upper)| rank <= *upper) {
                derived.insert(*tier, 1.0);
            }
            derived.insert(RANKED_FLAG, 1.0);
        }
        derived
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for StatRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        StatRecord {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

pub fn is_opponent_field(name: &str) -> bool {
    name.starts_with(OPPONENT_PREFIX)
}

fn possessions(team: [f64; 4], opp: [f64; 4]) -> f64 {
    let side = |[fga, fta, orb, tov]: [f64; 4]| fga + FREE_THROW_POSSESSION_WEIGHT * fta - orb + tov;
    0.5 * side(team) + 0.5 * side(opp)
}

/// Field set a stat record must carry when it enters the core.
#[derive(Clone, Debug)]
pub struct StatSchema {
    required: BTreeSet<String>,
    optional: BTreeSet<String>,
}

impl StatSchema {
    pub fn new<I, J, S, T>(required: I, optional: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        StatSchema {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
        }
    }

    /// Every own-side stat of the pairing table, with the rank tier flags
    /// and raw stats the table doesn't pair as optional.
    pub fn standard() -> Self {
        let required = FIELDS_TO_COMBINE
            .iter()
            .map(|(own, _)| *own)
            // win_loss_pct is an alias that is renamed to win_pct
            .filter(|own| *own != "win_loss_pct");
        let optional = RANK_TIERS
            .iter()
            .map(|(tier, _)| *tier)
            .chain(["win_loss_pct", "g", "srs"]);
        StatSchema::new(required, optional)
    }

    pub fn allows(&self, field: &str) -> bool {
        self.required.contains(field) || self.optional.contains(field)
    }

    /// Check a raw record at the ingestion boundary.
    pub fn validate(&self, raw: &HashMap<String, f64>) -> Result<StatRecord> {
        let mut unknown: Vec<&String> = raw.keys().filter(|k| !self.allows(k)).collect();
        unknown.sort();
        if let Some(field) = unknown.first() {
            return Err(SimError::UnknownField((*field).clone()));
        }
        if let Some(field) = self.required.iter().find(|f| !raw.contains_key(*f)) {
            return Err(SimError::MissingField(field.clone()));
        }
        Ok(raw.iter().map(|(k, &v)| (k.clone(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals() -> StatRecord {
        [
            ("g", 10.0),
            ("mp", 400.0),
            ("fg", 300.0),
            ("fga", 650.0),
            ("fg3", 80.0),
            ("fg3a", 230.0),
            ("fta", 200.0),
            ("orb", 100.0),
            ("trb", 380.0),
            ("tov", 120.0),
            ("pts", 780.0),
            ("opp_fga", 600.0),
            ("opp_fta", 180.0),
            ("opp_orb", 90.0),
            ("opp_tov", 130.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_opponent_view_prefixes_own_fields_only() {
        let record = totals();
        let away = record.opponent_view();

        assert_eq!(away.get("opp_pts"), Some(780.0));
        assert_eq!(away.get("opp_g"), Some(10.0));
        // Existing opponent stats are not double prefixed
        assert!(!away.contains("opp_opp_fga"));
        assert!(away.field_names().all(is_opponent_field));
    }

    #[test]
    fn test_per_game_averages() {
        let averaged = totals().per_game_averages(10.0).unwrap();
        assert_eq!(averaged.get("pts"), Some(78.0));
        assert_eq!(averaged.get("mp"), Some(40.0));
        // Non-counting fields are untouched
        assert_eq!(averaged.get("g"), Some(10.0));
        assert_eq!(averaged.get("opp_fga"), Some(60.0));
        assert_eq!(averaged.get("opp_tov"), Some(13.0));

        assert!(totals().per_game_averages(0.0).is_err());
    }

    #[test]
    fn test_derived_shooting() {
        let derived = totals().with_derived_shooting().unwrap();
        assert_eq!(derived.get("fg2"), Some(220.0));
        assert_eq!(derived.get("fg2a"), Some(420.0));
        assert_eq!(derived.get("drb"), Some(280.0));
        assert!((derived.get("fg2_pct").unwrap() - 220.0 / 420.0).abs() < 1e-12);
    }

    #[test]
    fn test_pace() {
        let from_totals = totals().with_pace().unwrap().get("pace").unwrap();
        let poss = 0.5 * (650.0 + 0.475 * 200.0 - 100.0 + 120.0)
            + 0.5 * (600.0 + 0.475 * 180.0 - 90.0 + 130.0);
        let expected = 40.0 * (poss / (0.2 * 400.0 * 5.0));
        assert!((from_totals - expected).abs() < 1e-9);

        // Same pace whether derived before or after averaging
        let from_averages = totals()
            .per_game_averages(10.0)
            .unwrap()
            .with_pace()
            .unwrap()
            .get("pace")
            .unwrap();
        assert!((from_averages - from_totals).abs() < 1e-9);
    }

    #[test]
    fn test_pace_needs_opponent_fields() {
        let record = totals().own_view();
        assert!(matches!(record.with_pace(), Err(SimError::MissingField(f)) if f == "opp_fga"));
    }

    #[test]
    fn test_defensive_rating_filled() {
        let record: StatRecord = [("off_rtg", 112.0), ("net_rtg", 9.5)].into_iter().collect();
        assert_eq!(record.with_defensive_rating().get("def_rtg"), Some(102.5));

        let explicit: StatRecord = [("off_rtg", 112.0), ("net_rtg", 9.5), ("def_rtg", 100.0)]
            .into_iter()
            .collect();
        assert_eq!(explicit.with_defensive_rating().get("def_rtg"), Some(100.0));
    }

    #[test]
    fn test_record_and_weighted_sos() {
        let record: StatRecord = [("sos", 4.0)].into_iter().collect();
        let record = record.with_record(15.0, 5.0).unwrap();
        assert_eq!(record.get("win_pct"), Some(0.75));

        let weighted = record.with_weighted_sos(-6.0).unwrap();
        assert!((weighted.get("weighted_sos").unwrap() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_rank_tiers() {
        let base = StatRecord::new();

        let top = base.with_rank(Some(3));
        assert_eq!(top.get("rank1-5"), Some(1.0));
        assert_eq!(top.get("rank6-10"), Some(0.0));
        assert_eq!(top.get("ranked"), Some(1.0));

        let edge = base.with_rank(Some(25));
        assert_eq!(edge.get("rank21-25"), Some(1.0));

        let unranked = base.with_rank(None);
        assert!(unranked.iter().all(|(_, v)| v == 0.0));
        assert_eq!(unranked.len(), 6);
    }

    #[test]
    fn test_schema_rejects_unknown_and_missing() {
        let schema = StatSchema::new(["pts", "trb"], ["ranked"]);

        let mut raw = HashMap::new();
        raw.insert("pts".to_string(), 70.0);
        assert!(matches!(schema.validate(&raw), Err(SimError::MissingField(f)) if f == "trb"));

        raw.insert("trb".to_string(), 35.0);
        raw.insert("mascot_height".to_string(), 7.0);
        assert!(
            matches!(schema.validate(&raw), Err(SimError::UnknownField(f)) if f == "mascot_height")
        );

        raw.remove("mascot_height");
        raw.insert("ranked".to_string(), 1.0);
        let record = schema.validate(&raw).unwrap();
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_standard_schema_covers_pairing_table() {
        let schema = StatSchema::standard();
        assert!(schema.allows("pts"));
        assert!(schema.allows("pace"));
        assert!(schema.allows("rank1-5"));
        assert!(!schema.allows("opp_pts"));
    }
}
