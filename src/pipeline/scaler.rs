//! Standard scaler fitted on the training partition
//!
//! The fitted parameters are persisted next to the model so inference
//! applies exactly the transform used at training time.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Per-feature mean and scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    /// Population standard deviation, 1.0 for constant features
    pub scale: Vec<f64>,
    pub n_samples: usize,
}

impl FittedScaler {
    /// Fit on training rows only
    pub fn fit(x: &Array2<f64>, feature_names: &[String]) -> Result<Self> {
        if x.ncols() != feature_names.len() {
            return Err(PipelineError::FeatureMismatch {
                expected: feature_names.len(),
                actual: x.ncols(),
            });
        }
        if x.nrows() == 0 {
            return Err(PipelineError::Model(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let n = x.nrows() as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());

        for column in x.axis_iter(Axis(1)) {
            let m = column.sum() / n;
            let var = column.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > 0.0 && std.is_finite() { std } else { 1.0 });
        }

        Ok(Self {
            feature_names: feature_names.to_vec(),
            mean,
            scale,
            n_samples: x.nrows(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Standardize a matrix
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;

        let mut out = x.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    /// Standardize a single feature vector
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;

        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    fn check_width(&self, actual: usize) -> Result<()> {
        if actual != self.n_features() {
            return Err(PipelineError::FeatureMismatch {
                expected: self.n_features(),
                actual,
            });
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
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
}
