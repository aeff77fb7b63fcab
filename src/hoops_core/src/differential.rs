use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{POINTS_DIFFERENCE, POINTS_FIELD};
use crate::stats::StatRecord;

/// Own-stat to opponent-stat pairs collapsed into home-minus-away features.
///
/// The trained model's column set depends on this exact table.
pub const FIELDS_TO_COMBINE: [(&str, &str); 45] = [
    ("pts", "opp_pts"),
    ("fg2a", "opp_fg2a"),
    ("losses", "opp_losses"),
    ("sos", "opp_sos"),
    ("trb", "opp_trb"),
    ("fg_pct", "opp_fg_pct"),
    ("fg2", "opp_fg2"),
    ("fg3", "opp_fg3"),
    ("win_pct", "opp_win_pct"),
    ("weighted_sos", "opp_weighted_sos"),
    ("fg3_pct", "opp_fg3_pct"),
    ("tov", "opp_tov"),
    ("fta", "opp_fta"),
    ("mp", "opp_mp"),
    ("stl", "opp_stl"),
    ("fg3a", "opp_fg3a"),
    ("pf", "opp_pf"),
    ("blk", "opp_blk"),
    ("ft_pct", "opp_ft_pct"),
    ("ft", "opp_ft"),
    ("orb", "opp_orb"),
    ("ast", "opp_ast"),
    ("fg", "opp_fg"),
    ("fga", "opp_fga"),
    ("wins", "opp_wins"),
    ("drb", "opp_drb"),
    ("fg2_pct", "opp_fg2_pct"),
    ("ranked", "opp_ranked"),
    ("win_loss_pct", "opp_win_loss_pct"),
    ("pace", "opp_pace"),
    ("off_rtg", "opp_off_rtg"),
    ("def_rtg", "opp_def_rtg"),
    ("net_rtg", "opp_net_rtg"),
    ("ftr", "opp_ftr"),
    ("fg3a_per_fga_pct", "opp_fg3a_per_fga_pct"),
    ("fta_per_fga_pct", "opp_fta_per_fga_pct"),
    ("ft_rate", "opp_ft_rate"),
    ("ts_pct", "opp_ts_pct"),
    ("trb_pct", "opp_trb_pct"),
    ("ast_pct", "opp_ast_pct"),
    ("stl_pct", "opp_stl_pct"),
    ("blk_pct", "opp_blk_pct"),
    ("efg_pct", "opp_efg_pct"),
    ("tov_pct", "opp_tov_pct"),
    ("orb_pct", "opp_orb_pct"),
];

/// Column aliases normalised after collapsing.
const FIELDS_TO_RENAME: [(&str, &str); 2] = [
    ("win_loss_pct", "win_pct"),
    ("opp_win_loss_pct", "opp_win_pct"),
];

/// One matchup row: home stats, away stats under the `opp_` prefix, and
/// after [`MatchupFeatureVector::differential`] the collapsed pairs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchupFeatureVector {
    fields: BTreeMap<String, f64>,
}

impl MatchupFeatureVector {
    /// Side-by-side row for `home` hosting `away`.
    pub fn combine(home: &StatRecord, away: &StatRecord) -> Self {
        home.own_view()
            .iter()
            .chain(away.opponent_view().iter())
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Collapse every paired stat into `home - away`.
    ///
    /// Pairs with a side missing are left as they are; not every feed
    /// populates the advanced stats.
    pub fn differential(mut self) -> Self {
        for (own, opp) in FIELDS_TO_COMBINE {
            let (Some(home), Some(away)) = (self.get(own), self.get(opp)) else {
                continue;
            };
            // Points stay as-is; they also feed the scoring differential.
            if own == POINTS_FIELD {
                self.insert(POINTS_DIFFERENCE, home - away);
                continue;
            }
            self.insert(own, home - away);
            self.fields.remove(opp);
        }

        for (from, to) in FIELDS_TO_RENAME {
            if self.fields.contains_key(to) {
                continue;
            }
            if let Some(value) = self.fields.remove(from) {
                self.insert(to, value);
            }
        }
        self
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<f64> {
        self.fields.remove(field)
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

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for MatchupFeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        MatchupFeatureVector {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Differential feature vector for `home` hosting `away`.
pub fn build_differential(home: &StatRecord, away: &StatRecord) -> MatchupFeatureVector {
    MatchupFeatureVector::combine(home, away).differential()
}
