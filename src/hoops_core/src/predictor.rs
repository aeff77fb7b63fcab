use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::TrainingConfig;
use crate::differential::MatchupFeatureVector;
use crate::error::{Result, SimError};
use crate::forest::{RandomForest, Regressor, ScorePair};

/// Outcome columns that never enter the feature set.
pub const LABEL_FIELDS: [&str; 2] = ["home_points", "away_points"];

/// How predicted points are reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Truncated to whole points
    #[default]
    Integer,
    /// Raw regressor output
    Real,
}

impl OutputKind {
    pub fn apply(self, pair: ScorePair) -> ScorePair {
        match self {
            OutputKind::Integer => [pair[0].trunc(), pair[1].trunc()],
            OutputKind::Real => pair,
        }
    }
}

/// A feature vector reduced to the predictor's selected columns, in order.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRow {
    columns: Arc<[String]>,
    values: Vec<f64>,
}

impl FeatureRow {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// One historical matchup with its final score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: MatchupFeatureVector,
    pub home_points: f64,
    pub away_points: f64,
}

/// Summary of an offline training run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_size: usize,
    pub validation_size: usize,
    pub candidate_features: usize,
    pub selected_features: Vec<String>,
    /// Share of validation matchups whose winner was called correctly
    pub validation_accuracy: f64,
}

/// On-disk form of a trained predictor.
#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    features: Vec<String>,
    model: RandomForest,
}

/// Trained regressor plus the ordered feature subset it was fitted on.
///
/// The model is never mutated after construction, so one predictor can be
/// shared across simulation threads.
#[derive(Clone, Debug)]
pub struct Predictor<M: Regressor = RandomForest> {
    model: M,
    features: Arc<[String]>,
}

impl<M: Regressor> Predictor<M> {
    pub fn new(model: M, features: Vec<String>) -> Result<Self> {
        if model.n_features() != features.len() {
            return Err(SimError::InvalidConfig(format!(
                "model expects {} features but {} names were given",
                model.n_features(),
                features.len()
            )));
        }
        let mut unique = features.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != features.len() {
            return Err(SimError::InvalidConfig(
                "selected feature names must be unique".to_string(),
            ));
        }
        Ok(Predictor {
            model,
            features: features.into(),
        })
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Restrict and reorder a vector to exactly the selected features.
    pub fn simplify(&self, vector: &MatchupFeatureVector) -> Result<FeatureRow> {
        let mut values = Vec::with_capacity(self.features.len());
        let mut missing = Vec::new();
        for name in self.features.iter() {
            match vector.get(name) {
                Some(value) => values.push(value),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(SimError::FeatureMismatch { missing });
        }
        Ok(FeatureRow {
            columns: Arc::clone(&self.features),
            values,
        })
    }

    /// Predict (home, away) points for every row.
    pub fn predict(&self, rows: &[FeatureRow], kind: OutputKind) -> Result<Vec<ScorePair>> {
        rows.iter()
            .map(|row| {
                if !Arc::ptr_eq(&row.columns, &self.features) && row.columns != self.features {
                    let missing = self
                        .features
                        .iter()
                        .filter(|name| !row.columns.contains(name))
                        .cloned()
                        .collect();
                    return Err(SimError::FeatureMismatch { missing });
                }
                Ok(kind.apply(self.model.predict_row(&row.values)?))
            })
            .collect()
    }

    /// Simplify and predict a single matchup.
    pub fn predict_vector(
        &self,
        vector: &MatchupFeatureVector,
        kind: OutputKind,
    ) -> Result<ScorePair> {
        let row = self.simplify(vector)?;
        Ok(kind.apply(self.model.predict_row(&row.values)?))
    }
}

impl Predictor<RandomForest> {
    /// Fit a predictor on historical matchups.
    ///
    /// A baseline forest ranks every candidate column; columns whose
    /// importance reaches the threshold are kept and a second, restricted
    /// forest is fitted on them alone.
    pub fn train(
        samples: &[TrainingSample],
        config: &TrainingConfig,
    ) -> Result<(Self, TrainingReport)> {
        config.validate()?;
        if samples.len() < 2 {
            return Err(SimError::InsufficientData(format!(
                "need at least 2 training samples, got {}",
                samples.len()
            )));
        }

        let columns: Vec<String> = samples[0]
            .features
            .columns()
            .filter(|c| !LABEL_FIELDS.contains(c))
            .map(str::to_string)
            .collect();
        let mut x = Vec::with_capacity(samples.len());
        let mut y: Vec<ScorePair> = Vec::with_capacity(samples.len());
        for sample in samples {
            let row = project(&sample.features, &columns)?;
            let target = [sample.home_points, sample.away_points];
            if row.iter().chain(&target).all(|v| v.is_finite()) {
                x.push(row);
                y.push(target);
            }
        }
        if x.len() < samples.len() {
            warn!(
                dropped = samples.len() - x.len(),
                "skipping training samples with missing values"
            );
        }
        if x.len() < 2 {
            return Err(SimError::InsufficientData(format!(
                "need at least 2 complete training samples, got {}",
                x.len()
            )));
        }

        let mut order: Vec<usize> = (0..x.len()).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(config.seed));
        let n_validation = ((x.len() as f64 * config.validation_fraction).ceil() as usize)
            .clamp(1, x.len() - 1);
        let (validation_idx, train_idx) = order.split_at(n_validation);

        let x_train: Vec<Vec<f64>> = train_idx.iter().map(|&i| x[i].clone()).collect();
        let y_train: Vec<ScorePair> = train_idx.iter().map(|&i| y[i]).collect();

        let mut baseline = RandomForest::new(config.baseline.clone(), config.seed);
        baseline.fit(&x_train, &y_train)?;

        let importances = baseline.feature_importances();
        let keep: Vec<usize> = (0..columns.len())
            .filter(|&i| importances[i] >= config.importance_threshold)
            .collect();
        if keep.is_empty() {
            return Err(SimError::EmptyFeatureSelection {
                threshold: config.importance_threshold,
            });
        }
        let selected: Vec<String> = keep.iter().map(|&i| columns[i].clone()).collect();
        debug!(
            candidates = columns.len(),
            selected = selected.len(),
            "feature selection complete"
        );

        let restrict = |row: &Vec<f64>| keep.iter().map(|&i| row[i]).collect::<Vec<f64>>();
        let x_train_selected: Vec<Vec<f64>> = x_train.iter().map(restrict).collect();

        let mut refit = RandomForest::new(config.refit.clone(), config.seed.wrapping_add(1));
        refit.fit(&x_train_selected, &y_train)?;
        let predictor = Predictor::new(refit, selected.clone())?;

        let mut correct = 0usize;
        for &i in validation_idx {
            let predicted = predictor.model.predict_row(&restrict(&x[i]))?;
            if home_wins(predicted) == home_wins(y[i]) {
                correct += 1;
            }
        }
        let validation_accuracy = correct as f64 / validation_idx.len() as f64;

        info!(
            train = train_idx.len(),
            validation = validation_idx.len(),
            features = selected.len(),
            accuracy = validation_accuracy,
            "trained predictor"
        );

        let report = TrainingReport {
            train_size: train_idx.len(),
            validation_size: validation_idx.len(),
            candidate_features: columns.len(),
            selected_features: selected,
            validation_accuracy,
        };
        Ok((predictor, report))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let artifact = ModelArtifact {
            features: self.features.to_vec(),
            model: self.model.clone(),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &artifact)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let artifact: ModelArtifact = serde_json::from_reader(reader)?;
        artifact.model.validate()?;
        Predictor::new(artifact.model, artifact.features)
    }
}

/// Home side takes ties.
fn home_wins(pair: ScorePair) -> bool {
    pair[0] >= pair[1]
}

fn project(vector: &MatchupFeatureVector, columns: &[String]) -> Result<Vec<f64>> {
    let missing: Vec<String> = columns
        .iter()
        .filter(|c| !vector.contains(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SimError::FeatureMismatch { missing });
    }
    Ok(columns.iter().filter_map(|c| vector.get(c)).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::Rng;

    /// Scores home and away from fixed columns: `home = base + margin`,
    /// `away = base`.
    #[derive(Clone, Debug)]
    pub(crate) struct MarginModel {
        pub base: f64,
        pub n_features: usize,
    }

    impl Regressor for MarginModel {
        fn fit(&mut self, _x: &[Vec<f64>], _y: &[ScorePair]) -> Result<()> {
            Ok(())
        }

        fn predict_row(&self, row: &[f64]) -> Result<ScorePair> {
            Ok([self.base + row[0], self.base])
        }

        fn feature_importances(&self) -> Vec<f64> {
            vec![1.0 / self.n_features as f64; self.n_features]
        }

        fn n_features(&self) -> usize {
            self.n_features
        }
    }

    fn margin_predictor() -> Predictor<MarginModel> {
        let model = MarginModel {
            base: 70.0,
            n_features: 2,
        };
        Predictor::new(model, vec!["points_difference".to_string(), "pace".to_string()]).unwrap()
    }

    fn samples(n: usize, seed: u64) -> Vec<TrainingSample> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let margin: f64 = rng.gen_range(-15.0..15.0);
                let pace: f64 = rng.gen_range(-5.0..5.0);
                let noise: f64 = rng.gen_range(-1.0..1.0);
                let features: MatchupFeatureVector = [
                    ("points_difference", margin),
                    ("pace", pace),
                    ("ranked", noise),
                    ("home_points", 0.0),
                ]
                .into_iter()
                .collect();
                TrainingSample {
                    features,
                    home_points: 70.0 + margin / 2.0 + pace,
                    away_points: 70.0 - margin / 2.0 + pace,
                }
            })
            .collect()
    }

    #[test]
    fn test_simplify_orders_columns() {
        let predictor = margin_predictor();
        let vector: MatchupFeatureVector = [("pace", 3.0), ("trb", 1.0), ("points_difference", 5.0)]
            .into_iter()
            .collect();

        let row = predictor.simplify(&vector).unwrap();
        assert_eq!(row.columns(), predictor.features());
        assert_eq!(row.values(), &[5.0, 3.0]);
    }

    #[test]
    fn test_simplify_missing_feature_is_mismatch() {
        let predictor = margin_predictor();
        let vector: MatchupFeatureVector = [("pace", 3.0)].into_iter().collect();

        match predictor.simplify(&vector) {
            Err(SimError::FeatureMismatch { missing }) => {
                assert_eq!(missing, vec!["points_difference".to_string()])
            }
            other => panic!("expected feature mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_predict_output_kinds() {
        let predictor = margin_predictor();
        let vector: MatchupFeatureVector = [("pace", 3.0), ("points_difference", 4.7)]
            .into_iter()
            .collect();
        let rows = vec![predictor.simplify(&vector).unwrap()];

        let real = predictor.predict(&rows, OutputKind::Real).unwrap();
        assert!((real[0][0] - 74.7).abs() < 1e-12);

        let whole = predictor.predict(&rows, OutputKind::Integer).unwrap();
        assert_eq!(whole[0], [74.0, 70.0]);
    }

    #[test]
    fn test_predict_rejects_foreign_rows() {
        let predictor = margin_predictor();
        let other = Predictor::new(
            MarginModel {
                base: 0.0,
                n_features: 1,
            },
            vec!["pace".to_string()],
        )
        .unwrap();
        let vector: MatchupFeatureVector = [("pace", 3.0)].into_iter().collect();
        let foreign = other.simplify(&vector).unwrap();

        assert!(matches!(
            predictor.predict(&[foreign], OutputKind::Real),
            Err(SimError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn test_new_validates_feature_count() {
        let model = MarginModel {
            base: 0.0,
            n_features: 3,
        };
        assert!(Predictor::new(model.clone(), vec!["a".to_string()]).is_err());
        assert!(Predictor::new(
            model,
            vec!["a".to_string(), "a".to_string(), "b".to_string()]
        )
        .is_err());
    }

    #[test]
    fn test_train_selects_and_reports() {
        let data = samples(200, 4);
        let (predictor, report) = Predictor::train(&data, &TrainingConfig::default()).unwrap();

        assert_eq!(report.validation_size, 50);
        assert_eq!(report.train_size, 150);
        assert_eq!(report.candidate_features, 3);
        assert!(!predictor.features().iter().any(|f| f == "home_points"));
        assert!(predictor.features().contains(&"points_difference".to_string()));
        assert_eq!(report.selected_features, predictor.features());
        assert!(report.validation_accuracy > 0.7);
    }

    #[test]
    fn test_train_is_reproducible() {
        let data = samples(80, 9);
        let config = TrainingConfig::default();
        let (a, _) = Predictor::train(&data, &config).unwrap();
        let (b, _) = Predictor::train(&data, &config).unwrap();
        assert_eq!(a.features(), b.features());
        assert_eq!(a.model(), b.model());
    }

    #[test]
    fn test_train_requires_common_columns() {
        let mut data = samples(20, 1);
        data[7].features.remove("pace");
        assert!(matches!(
            Predictor::train(&data, &TrainingConfig::default()),
            Err(SimError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn test_train_threshold_too_high() {
        let data = samples(40, 2);
        let config = TrainingConfig {
            importance_threshold: 1.5,
            ..TrainingConfig::default()
        };
        assert!(matches!(
            Predictor::train(&data, &config),
            Err(SimError::EmptyFeatureSelection { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let data = samples(60, 3);
        let (predictor, _) = Predictor::train(&data, &TrainingConfig::default()).unwrap();
        let path = std::env::temp_dir().join(format!("hoops_model_{}.json", std::process::id()));

        predictor.save(&path).unwrap();
        let loaded = Predictor::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.features(), predictor.features());
        let vector = &data[0].features;
        assert_eq!(
            loaded.predict_vector(vector, OutputKind::Real).unwrap(),
            predictor.predict_vector(vector, OutputKind::Real).unwrap()
        );
    }

    #[test]
    fn test_train_skips_incomplete_samples() {
        let mut data = samples(40, 5);
        data[39].features.insert("pace", f64::NAN);
        data[12].away_points = f64::NAN;

        let (_, report) = Predictor::train(&data, &TrainingConfig::default()).unwrap();
        assert_eq!(report.train_size + report.validation_size, 38);

        for sample in data.iter_mut().skip(1) {
            sample.home_points = f64::NAN;
        }
        assert!(matches!(
            Predictor::train(&data, &TrainingConfig::default()),
            Err(SimError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_load_rejects_corrupt_model() {
        let data = samples(60, 6);
        let (predictor, _) = Predictor::train(&data, &TrainingConfig::default()).unwrap();
        let path =
            std::env::temp_dir().join(format!("hoops_corrupt_{}.json", std::process::id()));
        predictor.save(&path).unwrap();
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        let leaf = serde_json::json!({ "Leaf": { "value": [70.0, 70.0] } });
        let split = |feature: usize, left: usize, right: usize| {
            serde_json::json!({
                "Split": { "feature": feature, "threshold": 0.0, "left": left, "right": right }
            })
        };
        let corruptions = vec![
            serde_json::json!([split(5, 1, 2)]),
            serde_json::json!([]),
            serde_json::json!([split(0, 0, 1), leaf.clone()]),
            serde_json::json!([split(0, 1, 7), leaf.clone(), leaf.clone()]),
        ];

        for nodes in corruptions {
            let mut artifact = saved.clone();
            artifact["model"]["trees"][0]["nodes"] = nodes;
            std::fs::write(&path, artifact.to_string()).unwrap();
            assert!(matches!(
                Predictor::load(&path),
                Err(SimError::InvalidConfig(_))
            ));
        }

        let mut artifact = saved.clone();
        artifact["model"]["importances"] = serde_json::json!([0.4, 0.3, 0.2, 0.1]);
        std::fs::write(&path, artifact.to_string()).unwrap();
        let result = Predictor::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(SimError::InvalidConfig(_))));
    }

    proptest! {
        #[test]
        fn prop_simplify_matches_selection(
            extra in proptest::collection::btree_map("[a-z]{3,8}", -50.0f64..50.0, 0..12),
            pace in -10.0f64..10.0,
            diff in -20.0f64..20.0,
        ) {
            let predictor = margin_predictor();
            let mut vector: MatchupFeatureVector = extra.into_iter().collect();
            vector.insert("pace", pace);
            vector.insert("points_difference", diff);

            let row = predictor.simplify(&vector).unwrap();
            prop_assert_eq!(row.columns(), predictor.features());
            prop_assert_eq!(row.values(), &[diff, pace][..]);
        }
    }
}
