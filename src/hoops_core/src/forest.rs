//! Ensemble regression over (home points, away points).
//!
//! [`Regressor`] is the contract the predictor relies on: fit, predict a row,
//! and report per-feature importances for feature selection.
//! [`RandomForest`] is the bundled implementation: CART trees grown on summed
//! squared error over both outputs, with impurity-decrease importances.

use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Predicted (home, away) points.
pub type ScorePair = [f64; 2];

const N_OUTPUTS: usize = 2;

/// Splits that improve squared error by less than this are ignored
const MIN_GAIN: f64 = 1e-12;

/// Multi-output regressor with feature importances.
pub trait Regressor: Send + Sync {
    fn fit(&mut self, x: &[Vec<f64>], y: &[ScorePair]) -> Result<()>;

    fn predict_row(&self, row: &[f64]) -> Result<ScorePair>;

    /// Importance per input column, summing to 1 for a fitted model.
    fn feature_importances(&self) -> Vec<f64>;

    /// Number of input columns the model was fitted on.
    fn n_features(&self) -> usize;
}

/// Number of candidate features tried at each split.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Count(count) => count.min(n_features),
        };
        n.max(1)
    }
}

/// Forest hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl ForestParams {
    /// Unconstrained forest used to rank features.
    pub fn baseline() -> Self {
        ForestParams {
            n_estimators: 50,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }

    /// Shallow forest refit on the selected features.
    pub fn restricted() -> Self {
        ForestParams {
            n_estimators: 50,
            max_depth: Some(6),
            min_samples_split: 10,
            min_samples_leaf: 3,
            max_features: MaxFeatures::Sqrt,
            bootstrap: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(SimError::InvalidConfig("n_estimators must be at least 1".into()));
        }
        if self.min_samples_split < 2 {
            return Err(SimError::InvalidConfig("min_samples_split must be at least 2".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(SimError::InvalidConfig("min_samples_leaf must be at least 1".into()));
        }
        if let MaxFeatures::Count(0) = self.max_features {
            return Err(SimError::InvalidConfig("max_features must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams::baseline()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: ScorePair,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One fitted regression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict(&self, row: &[f64]) -> ScorePair {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Check that every split refers to a column below `n_features` and to
    /// children stored after it, so prediction always reaches a leaf.
    fn validate(&self, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(SimError::InvalidConfig("tree has no nodes".into()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if !value.iter().all(|v| v.is_finite()) {
                        return Err(SimError::InvalidConfig(format!(
                            "leaf {} holds a non-finite value",
                            idx
                        )));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(SimError::InvalidConfig(format!(
                            "node {} splits on column {} of {}",
                            idx, feature, n_features
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(SimError::InvalidConfig(format!(
                            "node {} has a non-finite threshold",
                            idx
                        )));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(SimError::InvalidConfig(format!(
                                "node {} points at child {} of {}",
                                idx,
                                child,
                                self.nodes.len()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Running target sums for a set of samples.
#[derive(Clone, Copy, Default)]
struct TargetSums {
    n: usize,
    sum: [f64; N_OUTPUTS],
    sum_sq: [f64; N_OUTPUTS],
}

impl TargetSums {
    fn of(y: &[ScorePair], indices: &[usize]) -> Self {
        let mut sums = TargetSums::default();
        for &i in indices {
            sums.add(&y[i]);
        }
        sums
    }

    fn add(&mut self, target: &ScorePair) {
        self.n += 1;
        for o in 0..N_OUTPUTS {
            self.sum[o] += target[o];
            self.sum_sq[o] += target[o] * target[o];
        }
    }

    fn minus(&self, other: &TargetSums) -> TargetSums {
        let mut rest = *self;
        rest.n -= other.n;
        for o in 0..N_OUTPUTS {
            rest.sum[o] -= other.sum[o];
            rest.sum_sq[o] -= other.sum_sq[o];
        }
        rest
    }

    /// Summed squared error around the mean, over both outputs.
    fn sse(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        (0..N_OUTPUTS)
            .map(|o| (self.sum_sq[o] - self.sum[o] * self.sum[o] / n).max(0.0))
            .sum()
    }

    fn mean(&self) -> ScorePair {
        let n = self.n.max(1) as f64;
        [self.sum[0] / n, self.sum[1] / n]
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [ScorePair],
    params: &'a ForestParams,
    n_features: usize,
    max_features: usize,
    nodes: Vec<Node>,
    gains: Vec<f64>,
    rng: ChaCha8Rng,
}

impl<'a> TreeBuilder<'a> {
    fn new(x: &'a [Vec<f64>], y: &'a [ScorePair], params: &'a ForestParams, seed: u64) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        TreeBuilder {
            x,
            y,
            params,
            n_features,
            max_features: params.max_features.resolve(n_features),
            nodes: Vec::new(),
            gains: vec![0.0; n_features],
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Grow the tree; returns it with its normalised importances.
    fn grow(mut self) -> (RegressionTree, Vec<f64>) {
        let n = self.x.len();
        let indices: Vec<usize> = if self.params.bootstrap {
            (0..n).map(|_| self.rng.gen_range(0..n)).collect()
        } else {
            (0..n).collect()
        };
        self.build(indices, 0);

        let total: f64 = self.gains.iter().sum();
        if total > 0.0 {
            self.gains.iter_mut().for_each(|g| *g /= total);
        }
        (RegressionTree { nodes: self.nodes }, self.gains)
    }

    fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let sums = TargetSums::of(self.y, &indices);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: sums.mean() });

        let depth_ok = self.params.max_depth.map_or(true, |max| depth < max);
        let size_ok = indices.len() >= self.params.min_samples_split
            && indices.len() >= 2 * self.params.min_samples_leaf;
        if !depth_ok || !size_ok || sums.sse() <= MIN_GAIN {
            return id;
        }

        let Some(split) = self.best_split(&indices, &sums) else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return id;
        }
        self.gains[split.feature] += split.gain;

        let left_id = self.build(left, depth + 1);
        let right_id = self.build(right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn best_split(&mut self, indices: &[usize], parent: &TargetSums) -> Option<SplitCandidate> {
        let parent_sse = parent.sse();
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = indices.to_vec();

        for feature in sample(&mut self.rng, self.n_features, self.max_features).into_iter() {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left = TargetSums::default();
            for pos in 0..sorted.len() - 1 {
                left.add(&self.y[sorted[pos]]);
                let here = self.x[sorted[pos]][feature];
                let next = self.x[sorted[pos + 1]][feature];
                if here == next
                    || !here.is_finite()
                    || !next.is_finite()
                    || left.n < min_leaf
                    || sorted.len() - left.n < min_leaf
                {
                    continue;
                }

                let right = parent.minus(&left);
                let gain = parent_sse - left.sse() - right.sse();
                if gain > best.as_ref().map_or(MIN_GAIN, |b| b.gain) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Bagged (or unbagged) ensemble of regression trees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    seed: u64,
    n_features: usize,
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(params: ForestParams, seed: u64) -> Self {
        RandomForest {
            params,
            seed,
            n_features: 0,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Check a fitted forest read from outside, e.g. a saved model file.
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        if !self.is_fitted() || self.n_features == 0 {
            return Err(SimError::InvalidConfig("forest has not been fitted".into()));
        }
        if self.importances.len() != self.n_features {
            return Err(SimError::InvalidConfig(format!(
                "{} importances for {} features",
                self.importances.len(),
                self.n_features
            )));
        }
        for tree in &self.trees {
            tree.validate(self.n_features)?;
        }
        Ok(())
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[ScorePair]) -> Result<()> {
        self.params.validate()?;
        if x.is_empty() {
            return Err(SimError::InsufficientData("no training rows".into()));
        }
        if x.len() != y.len() {
            return Err(SimError::InsufficientData(format!(
                "{} rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
            return Err(SimError::InsufficientData(
                "training rows must share a non-empty column set".into(),
            ));
        }
        if let Some(row) = x
            .iter()
            .zip(y)
            .position(|(row, target)| !row.iter().chain(target).all(|v| v.is_finite()))
        {
            return Err(SimError::InsufficientData(format!(
                "training row {} has a non-finite value",
                row
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..self.params.n_estimators).map(|_| rng.gen()).collect();

        let params = &self.params;
        let grown: Vec<(RegressionTree, Vec<f64>)> = seeds
            .par_iter()
            .map(|&seed| TreeBuilder::new(x, y, params, seed).grow())
            .collect();

        let mut importances = vec![0.0; n_features];
        for (_, tree_importances) in &grown {
            for (total, value) in importances.iter_mut().zip(tree_importances) {
                *total += value;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        self.n_features = n_features;
        self.trees = grown.into_iter().map(|(tree, _)| tree).collect();
        self.importances = importances;
        Ok(())
    }

    fn predict_row(&self, row: &[f64]) -> Result<ScorePair> {
        if !self.is_fitted() {
            return Err(SimError::InsufficientData("forest has not been fitted".into()));
        }
        if row.len() != self.n_features {
            return Err(SimError::InsufficientData(format!(
                "expected {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        let mut total = [0.0; N_OUTPUTS];
        for tree in &self.trees {
            let value = tree.predict(row);
            total[0] += value[0];
            total[1] += value[1];
        }
        let n = self.trees.len() as f64;
        Ok([total[0] / n, total[1] / n])
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}
