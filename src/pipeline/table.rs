//! Training-ready feature matrices

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::RelativePair;
use crate::pipeline::features::{RelativeFeatureEncoder, NUM_FEATURES};

/// Train and test partitions, scaled, with the training side balanced
#[derive(Debug, Clone)]
pub struct TrainingTable {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<u8>,
    pub y_test: Array1<u8>,
}

/// Count of each label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBalance {
    pub negative: usize,
    pub positive: usize,
}

impl ClassBalance {
    pub fn of(labels: &[u8]) -> Self {
        let positive = labels.iter().filter(|&&v| v == 1).count();
        Self {
            negative: labels.len() - positive,
            positive,
        }
    }

    pub fn total(&self) -> usize {
        self.negative + self.positive
    }

    /// Share of positive labels, 0.0 when empty
    pub fn positive_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.positive as f64 / self.total() as f64
        }
    }
}

impl TrainingTable {
    pub fn train_balance(&self) -> ClassBalance {
        ClassBalance::of(&self.y_train.to_vec())
    }

    pub fn test_balance(&self) -> ClassBalance {
        ClassBalance::of(&self.y_test.to_vec())
    }
}

/// Unscaled feature matrix and label vector of labeled pairs
pub fn pairs_to_matrix(pairs: &[RelativePair]) -> Result<(Array2<f64>, Array1<u8>)> {
    let flat: Vec<f64> = pairs
        .iter()
        .flat_map(|p| RelativeFeatureEncoder::features(p).to_vec())
        .collect();
    let x = Array2::from_shape_vec((pairs.len(), NUM_FEATURES), flat)?;
    let y: Array1<u8> = pairs.iter().map(|p| p.overtook).collect();
    Ok((x, y))
}

/// Rows of `x` at the given indices
pub fn select_rows(x: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    x.select(Axis(0), indices)
}

/// Labels at the given indices
pub fn select_labels(y: &Array1<u8>, indices: &[usize]) -> Array1<u8> {
    indices.iter().map(|&i| y[i]).collect()
}
