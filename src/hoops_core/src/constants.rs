/// Prefix marking a statistic as belonging to the away/opponent side
pub const OPPONENT_PREFIX: &str = "opp_";

/// Scoring field that becomes `points_difference` instead of being collapsed
pub const POINTS_FIELD: &str = "pts";

/// Name of the home-minus-away scoring differential column
pub const POINTS_DIFFERENCE: &str = "points_difference";

/// Default number of trials per matchup batch
pub const DEFAULT_TRIALS: usize = 100;

/// Default number of schedule-wide simulations for round-robin standings
pub const DEFAULT_STANDINGS_SIMS: usize = 200;

/// Reported probabilities never exceed this value
pub const PROBABILITY_CAP: f64 = 0.99;

/// Reported probabilities never drop below this value
pub const PROBABILITY_FLOOR: f64 = 0.01;

/// Minimum feature importance kept by feature selection
pub const IMPORTANCE_THRESHOLD: f64 = 0.01;

/// Share of historical matchups held out for validation
pub const VALIDATION_FRACTION: f64 = 0.25;

/// Free throws weighting used in the possessions estimate
pub const FREE_THROW_POSSESSION_WEIGHT: f64 = 0.475;

/// Regulation game length in minutes
pub const GAME_MINUTES: f64 = 40.0;

/// Round labels for a 64-team single elimination field
pub const ROUND_NAMES: [&str; 6] = [
    "Round of 64",
    "Round of 32",
    "Sweet 16",
    "Elite 8",
    "Final 4",
    "Championship",
];

/// Teams per seed line in the tournament field
pub const REGULAR_SEED_SLOTS: usize = 4;

/// Seed lines holding extra teams because of play-in games
pub const PLAY_IN_SEED_SLOTS: [(u32, usize); 2] = [(11, 6), (16, 6)];

/// Size of a full tournament field including play-in teams
pub const FIELD_SIZE: usize = 68;

/// Counting statistics that arrive as season totals and must be averaged
pub const COUNTING_FIELDS: [&str; 18] = [
    "mp", "fg", "fga", "fg2", "fg2a", "fg3", "fg3a", "ft", "fta", "orb", "drb", "trb", "ast",
    "stl", "blk", "tov", "pf", "pts",
];

/// Rank tier indicator flags with the highest ranking each tier covers
pub const RANK_TIERS: [(&str, u32); 5] = [
    ("rank1-5", 5),
    ("rank6-10", 10),
    ("rank11-15", 15),
    ("rank16-20", 20),
    ("rank21-25", 25),
];

/// Flag set for any team appearing in the rankings
pub const RANKED_FLAG: &str = "ranked";

/// Get the label for a bracket round
pub fn round_label(round: usize, total_rounds: usize) -> String {
    // Label from the championship backwards so smaller fields still end
    // with "Championship".
    let offset = ROUND_NAMES.len() as isize - total_rounds as isize;
    let idx = offset + round as isize;
    if idx >= 0 && (idx as usize) < ROUND_NAMES.len() {
        ROUND_NAMES[idx as usize].to_string()
    } else {
        format!("Round {}", round + 1)
    }
}
