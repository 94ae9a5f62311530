//! Pluggable classifier seam
//!
//! The pipeline only needs fit / predict / predict_proba from a model. Two
//! families ship: L2-regularised logistic regression from `linfa-logistic`
//! and a bagged forest of `linfa-trees` decision trees. Each family is a
//! [`TrainedModel`] variant so the persisted blob keeps a single loader.

use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Binary overtake classifier
pub trait OvertakeClassifier {
    fn name(&self) -> &str;

    fn is_fitted(&self) -> bool;

    /// Fit on a feature matrix and 0/1 labels
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()>;

    /// Probability of class 1 (overtake) for every row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard 0/1 predictions at the 0.5 cut-off
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        Ok(self.predict_proba(x)?.mapv(|p| u8::from(p >= 0.5)))
    }
}

/// Logistic regression candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticClassifier {
    name: String,
    alpha: f64,
    max_iterations: u64,
    fitted: Option<FittedLogisticRegression<f64, bool>>,
    /// True when the fitted model's positive class is `false`
    inverted: bool,
}

impl LogisticClassifier {
    pub fn new(name: impl Into<String>, alpha: f64) -> Self {
        Self {
            name: name.into(),
            alpha,
            max_iterations: 1000,
            fitted: None,
            inverted: false,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    fn model(&self) -> Result<&FittedLogisticRegression<f64, bool>> {
        self.fitted
            .as_ref()
            .ok_or_else(|| PipelineError::Model(format!("{} is not fitted", self.name)))
    }
}

impl OvertakeClassifier for LogisticClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(PipelineError::Model(format!("{}: no training rows", self.name)));
        }
        if x.nrows() != y.len() {
            return Err(PipelineError::Model(format!(
                "{} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }

        let dataset = Dataset::new(x.clone(), y.mapv(|v| v == 1));
        let fitted = LogisticRegression::default()
            .alpha(self.alpha)
            .max_iterations(self.max_iterations)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(|e| PipelineError::Model(format!("{}: {}", self.name, e)))?;

        // linfa picks its own positive class; derive which one it chose
        // from the hard prediction of the first row
        let first = x.slice(ndarray::s![0..1, ..]);
        let p = fitted.predict_probabilities(&first)[0];
        let predicted: Array1<bool> = fitted.predict(&first);
        self.inverted = (p >= 0.5) != predicted[0];

        debug!(
            "Fitted {} (alpha {}, positive class inverted: {})",
            self.name, self.alpha, self.inverted
        );
        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model()?;
        let expected = model.params().len();
        if x.ncols() != expected {
            return Err(PipelineError::FeatureMismatch {
                expected,
                actual: x.ncols(),
            });
        }

        let proba = model.predict_probabilities(x);
        Ok(if self.inverted {
            proba.mapv(|p| 1.0 - p)
        } else {
            proba
        })
    }
}

/// Random forest: decision trees fitted on bootstrap samples
///
/// The overtake probability is the share of trees voting for class 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestClassifier {
    name: String,
    n_trees: usize,
    max_depth: Option<usize>,
    seed: u64,
    n_features: usize,
    trees: Vec<DecisionTree<f64, bool>>,
}

impl ForestClassifier {
    pub fn new(name: impl Into<String>, n_trees: usize) -> Self {
        Self {
            name: name.into(),
            n_trees,
            max_depth: Some(10),
            seed: 42,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }
}

impl OvertakeClassifier for ForestClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        let n = x.nrows();
        if n == 0 || self.n_trees == 0 {
            return Err(PipelineError::Model(format!(
                "{}: needs training rows and at least one tree",
                self.name
            )));
        }
        if n != y.len() {
            return Err(PipelineError::Model(format!("{} rows but {} labels", n, y.len())));
        }

        let labels = y.mapv(|v| v == 1);
        if labels.iter().all(|&l| l == labels[0]) {
            return Err(PipelineError::Model(format!(
                "{}: training labels contain a single class",
                self.name
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_trees);
        for _ in 0..self.n_trees {
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let sample = Dataset::new(x.select(Axis(0), &rows), labels.select(Axis(0), &rows));
            let tree = DecisionTree::<f64, bool>::params()
                .max_depth(self.max_depth)
                .fit(&sample)
                .map_err(|e| PipelineError::Model(format!("{}: {}", self.name, e)))?;
            trees.push(tree);
        }

        debug!(
            "Fitted {} ({} trees, max depth {:?})",
            self.name, self.n_trees, self.max_depth
        );
        self.n_features = x.ncols();
        self.trees = trees;
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::Model(format!("{} is not fitted", self.name)));
        }
        if x.ncols() != self.n_features {
            return Err(PipelineError::FeatureMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }

        let mut votes = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            let predicted: Array1<bool> = tree.predict(x);
            votes.zip_mut_with(&predicted, |v, &p| {
                if p {
                    *v += 1.0;
                }
            });
        }
        Ok(votes / self.trees.len() as f64)
    }
}

/// Persistable model, tagged by family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    Logistic(LogisticClassifier),
    Forest(ForestClassifier),
}

impl TrainedModel {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn inner(&self) -> &dyn OvertakeClassifier {
        match self {
            TrainedModel::Logistic(m) => m,
            TrainedModel::Forest(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn OvertakeClassifier {
        match self {
            TrainedModel::Logistic(m) => m,
            TrainedModel::Forest(m) => m,
        }
    }
}

impl OvertakeClassifier for TrainedModel {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict_proba(x)
    }
}

/// Default candidate set: logistic regression at three regularisation
/// strengths and a 100-tree random forest
pub fn default_candidates() -> Vec<TrainedModel> {
    vec![
        TrainedModel::Logistic(LogisticClassifier::new("logistic_regression", 1.0)),
        TrainedModel::Logistic(LogisticClassifier::new("logistic_regression_weak_l2", 0.01)),
        TrainedModel::Logistic(LogisticClassifier::new("logistic_regression_strong_l2", 10.0)),
        TrainedModel::Forest(ForestClassifier::new("random_forest", 100)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Overtakes happen when the first feature (pace delta) is negative
    fn separable() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [-2.0, 0.1],
            [-1.5, -0.3],
            [-1.2, 0.4],
            [-0.9, 0.0],
            [0.8, 0.2],
            [1.1, -0.1],
            [1.6, 0.3],
            [2.0, -0.2]
        ];
        let y = array![1u8, 1, 1, 1, 0, 0, 0, 0];
        (x, y)
    }

    #[test]
    fn test_logistic_fit_predict() {
        let (x, y) = separable();
        let mut model = LogisticClassifier::new("lr", 0.1);
        assert!(!model.is_fitted());

        model.fit(&x, &y).unwrap();
        assert!(model.is_fitted());

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[0] > 0.5);
        assert!(proba[7] < 0.5);

        let pred = model.predict(&x).unwrap();
        assert_eq!(pred, y);
    }

    #[test]
    fn test_positive_class_orientation_independent_of_first_row() {
        let (x, y) = separable();
        let mut a = LogisticClassifier::new("lr", 0.1);
        a.fit(&x, &y).unwrap();

        // Same data, first row now negative
        let order = [7, 1, 2, 3, 4, 5, 6, 0];
        let x2 = x.select(ndarray::Axis(0), &order);
        let y2: Array1<u8> = order.iter().map(|&i| y[i]).collect();
        let mut b = LogisticClassifier::new("lr", 0.1);
        b.fit(&x2, &y2).unwrap();

        let points = array![[-1.0, 0.0]];
        let pa = a.predict_proba(&points).unwrap()[0];
        let pb = b.predict_proba(&points).unwrap()[0];
        assert!(pa > 0.5 && pb > 0.5);
    }

    #[test]
    fn test_unfitted_errors() {
        let model = LogisticClassifier::new("lr", 1.0);
        assert!(model.predict_proba(&array![[0.0, 0.0]]).is_err());
    }

    #[test]
    fn test_single_class_fit_fails() {
        let mut model = LogisticClassifier::new("lr", 1.0);
        let x = array![[0.0], [1.0]];
        let y = array![0u8, 0];
        assert!(model.fit(&x, &y).is_err());
    }

    #[test]
    fn test_trained_model_persistence() {
        let (x, y) = separable();
        let mut model = TrainedModel::Logistic(LogisticClassifier::new("lr", 0.1));
        model.fit(&x, &y).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best_model.json");
        model.save(&path).unwrap();
        let loaded = TrainedModel::load(&path).unwrap();

        assert_eq!(loaded.name(), "lr");
        let a = model.predict_proba(&x).unwrap();
        let b = loaded.predict_proba(&x).unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            assert!((p - q).abs() < 1e-12);
        }
    }

    /// Overtakes only inside a band of pace deltas: not linearly separable
    fn band() -> (Array2<f64>, Array1<u8>) {
        let xs: Vec<f64> = (0..=40).map(|i| -2.0 + i as f64 * 0.1).collect();
        let y: Array1<u8> = xs.iter().map(|v| u8::from(v.abs() < 0.65)).collect();
        let x = Array2::from_shape_vec((xs.len(), 1), xs).unwrap();
        (x, y)
    }

    #[test]
    fn test_forest_fits_band() {
        let (x, y) = band();
        let mut model = ForestClassifier::new("rf", 25).with_seed(7);
        assert!(!model.is_fitted());
        model.fit(&x, &y).unwrap();
        assert!(model.is_fitted());

        let points = array![[-1.6], [-0.2], [0.0], [0.3], [1.2]];
        let proba = model.predict_proba(&points).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(model.predict(&points).unwrap(), array![0u8, 1, 1, 1, 0]);
    }

    #[test]
    fn test_forest_is_seeded() {
        let (x, y) = band();
        let mut a = ForestClassifier::new("rf", 10).with_seed(3);
        let mut b = ForestClassifier::new("rf", 10).with_seed(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_forest_persistence() {
        let (x, y) = band();
        let mut model = TrainedModel::Forest(ForestClassifier::new("rf", 10));
        model.fit(&x, &y).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best_model.json");
        model.save(&path).unwrap();
        let loaded = TrainedModel::load(&path).unwrap();

        assert!(matches!(loaded, TrainedModel::Forest(_)));
        assert_eq!(loaded.name(), "rf");
        assert_eq!(
            model.predict_proba(&x).unwrap(),
            loaded.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn test_forest_rejects_bad_input() {
        let (x, y) = band();
        let mut model = ForestClassifier::new("rf", 5);
        assert!(model.predict_proba(&x).is_err());
        assert!(model.fit(&x, &Array1::zeros(x.nrows())).is_err());

        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict_proba(&array![[0.0, 1.0]]).unwrap_err(),
            PipelineError::FeatureMismatch { .. }
        ));
    }

    #[test]
    fn test_feature_width_checked() {
        let (x, y) = separable();
        let mut model = LogisticClassifier::new("lr", 0.1);
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict_proba(&array![[0.0, 0.0, 0.0]]).unwrap_err(),
            PipelineError::FeatureMismatch { .. }
        ));
    }
}
