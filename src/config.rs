//! Pipeline configuration
//!
//! Every heuristic constant of the pipeline lives here so it can be tuned
//! without touching the stages themselves.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Rule used to reject non-representative laps (pit stops, safety car)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutlierRule {
    /// Drop laps slower than mean + k * stddev
    MeanPlusSigma { k: f64 },
    /// Drop laps slower than ratio * mean
    MeanRatio { ratio: f64 },
}

impl Default for OutlierRule {
    fn default() -> Self {
        OutlierRule::MeanPlusSigma { k: 2.0 }
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Held-out fraction for the test partition
    pub test_size: f64,
    /// Seed for split shuffling and synthetic sample generation
    pub random_seed: u64,
    pub outlier_rule: OutlierRule,
    /// Estimated gap = |delta pace| * gap_factor
    pub gap_factor: f64,
    /// Upper bound on SMOTE neighbours (effective value is capped by minority size - 1)
    pub smote_neighbors: usize,
    /// Try a label-stratified split before falling back to a plain one
    pub stratify: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_seed: 42,
            outlier_rule: OutlierRule::default(),
            gap_factor: 0.5,
            smote_neighbors: 5,
            stratify: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file; missing keys take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if !(self.gap_factor.is_finite() && self.gap_factor >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "gap_factor must be non-negative, got {}",
                self.gap_factor
            )));
        }
        if self.smote_neighbors == 0 {
            return Err(PipelineError::InvalidConfig(
                "smote_neighbors must be at least 1".to_string(),
            ));
        }
        match self.outlier_rule {
            OutlierRule::MeanPlusSigma { k } if !(k.is_finite() && k > 0.0) => {
                Err(PipelineError::InvalidConfig(format!(
                    "outlier sigma multiplier must be positive, got {}",
                    k
                )))
            }
            OutlierRule::MeanRatio { ratio } if !(ratio.is_finite() && ratio > 1.0) => {
                Err(PipelineError::InvalidConfig(format!(
                    "outlier mean ratio must be greater than 1, got {}",
                    ratio
                )))
            }
            _ => Ok(()),
        }
    }
}
