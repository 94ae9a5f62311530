//! Persisted pipeline and model artifacts
//!
//! Layout of an artifact directory:
//!
//! | File | Written by |
//! |---|---|
//! | `relative_features.csv` | build |
//! | `x_train.npy`, `x_test.npy`, `y_train.npy`, `y_test.npy` | build |
//! | `scaler.json`, `feature_names.json`, `pipeline_report.json` | build |
//! | `best_model.json`, `model_info.json`, `training_report.json` | train |

use ndarray::{Array1, Array2};
use ndarray_npy::{read_npy, write_npy};
use polars::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::models::RelativePair;
use crate::pipeline::{FittedScaler, PipelineOutput, TrainingTable};

pub const RELATIVE_FEATURES_FILE: &str = "relative_features.csv";
pub const X_TRAIN_FILE: &str = "x_train.npy";
pub const X_TEST_FILE: &str = "x_test.npy";
pub const Y_TRAIN_FILE: &str = "y_train.npy";
pub const Y_TEST_FILE: &str = "y_test.npy";
pub const SCALER_FILE: &str = "scaler.json";
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";
pub const PIPELINE_REPORT_FILE: &str = "pipeline_report.json";
pub const MODEL_FILE: &str = "best_model.json";
pub const MODEL_INFO_FILE: &str = "model_info.json";
pub const TRAINING_REPORT_FILE: &str = "training_report.json";
pub const CORRELATION_FILE: &str = "correlation_matrix.csv";

/// Files `train` needs
pub const TRAINING_INPUTS: [&str; 5] = [
    X_TRAIN_FILE,
    X_TEST_FILE,
    Y_TRAIN_FILE,
    Y_TEST_FILE,
    FEATURE_NAMES_FILE,
];

/// Files the estimation context needs
pub const INFERENCE_INPUTS: [&str; 3] = [SCALER_FILE, FEATURE_NAMES_FILE, MODEL_FILE];

/// Artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Create the directory if needed
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Names from `required` that are not on disk
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.path(name).exists())
            .map(|name| name.to_string())
            .collect()
    }

    /// Fail with `ArtifactsNotReady` unless every file in `required` exists
    pub fn require(&self, required: &[&str]) -> Result<()> {
        let missing = self.missing(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::ArtifactsNotReady {
                dir: self.dir.clone(),
                missing,
            })
        }
    }

    /// Persist everything the build stage produces
    pub fn save_pipeline_output(&self, output: &PipelineOutput) -> Result<()> {
        self.ensure_dir()?;
        self.write_relative_pairs(&output.pairs)?;
        self.save_table(&output.table)?;
        output.scaler.save(self.path(SCALER_FILE))?;
        self.save_json(FEATURE_NAMES_FILE, &output.table.feature_names)?;
        self.save_json(PIPELINE_REPORT_FILE, &output.report)?;

        info!("Saved pipeline artifacts to {:?}", self.dir);
        Ok(())
    }

    pub fn save_table(&self, table: &TrainingTable) -> Result<()> {
        write_npy(self.path(X_TRAIN_FILE), &table.x_train)?;
        write_npy(self.path(X_TEST_FILE), &table.x_test)?;
        write_npy(self.path(Y_TRAIN_FILE), &table.y_train)?;
        write_npy(self.path(Y_TEST_FILE), &table.y_test)?;
        Ok(())
    }

    /// Load the matrices written by [`ArtifactStore::save_table`]
    pub fn load_table(&self) -> Result<TrainingTable> {
        self.require(&TRAINING_INPUTS)?;

        let x_train: Array2<f64> = read_npy(self.path(X_TRAIN_FILE))?;
        let x_test: Array2<f64> = read_npy(self.path(X_TEST_FILE))?;
        let y_train: Array1<u8> = read_npy(self.path(Y_TRAIN_FILE))?;
        let y_test: Array1<u8> = read_npy(self.path(Y_TEST_FILE))?;
        let feature_names = self.load_feature_names()?;

        for width in [x_train.ncols(), x_test.ncols()] {
            if width != feature_names.len() {
                return Err(PipelineError::FeatureMismatch {
                    expected: feature_names.len(),
                    actual: width,
                });
            }
        }

        Ok(TrainingTable {
            feature_names,
            x_train,
            x_test,
            y_train,
            y_test,
        })
    }

    pub fn load_scaler(&self) -> Result<FittedScaler> {
        FittedScaler::load(self.path(SCALER_FILE))
    }

    pub fn load_feature_names(&self) -> Result<Vec<String>> {
        self.load_json(FEATURE_NAMES_FILE)
    }

    pub fn save_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        fs::write(self.path(name), serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        if !path.exists() {
            return Err(PipelineError::MissingInput { path });
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write a frame as CSV
    pub fn write_frame(&self, name: &str, df: &mut DataFrame) -> Result<()> {
        self.ensure_dir()?;
        let mut file = File::create(self.path(name))?;
        CsvWriter::new(&mut file).include_header(true).finish(df)?;
        Ok(())
    }

    /// Write the labeled pairs, descriptive columns included
    pub fn write_relative_pairs(&self, pairs: &[RelativePair]) -> Result<()> {
        let mut df = relative_pairs_frame(pairs)?;
        self.write_frame(RELATIVE_FEATURES_FILE, &mut df)
    }
}

/// Labeled pairs as a polars frame
pub fn relative_pairs_frame(pairs: &[RelativePair]) -> Result<DataFrame> {
    let df = df!(
        "session" => pairs.iter().map(|p| p.session.as_str()).collect::<Vec<_>>(),
        "interval" => pairs.iter().map(|p| p.interval).collect::<Vec<_>>(),
        "attacker" => pairs.iter().map(|p| p.attacker.as_str()).collect::<Vec<_>>(),
        "defender" => pairs.iter().map(|p| p.defender.as_str()).collect::<Vec<_>>(),
        "attacker_standing" => pairs.iter().map(|p| p.attacker_standing).collect::<Vec<_>>(),
        "attacker_pace" => pairs.iter().map(|p| p.attacker_pace).collect::<Vec<_>>(),
        "attacker_tire_age" => pairs.iter().map(|p| p.attacker_tire_age).collect::<Vec<_>>(),
        "attacker_compound" => pairs.iter().map(|p| p.attacker_compound.as_str()).collect::<Vec<_>>(),
        "defender_pace" => pairs.iter().map(|p| p.defender_pace).collect::<Vec<_>>(),
        "defender_tire_age" => pairs.iter().map(|p| p.defender_tire_age).collect::<Vec<_>>(),
        "defender_compound" => pairs.iter().map(|p| p.defender_compound.as_str()).collect::<Vec<_>>(),
        "delta_pace" => pairs.iter().map(|p| p.delta_pace).collect::<Vec<_>>(),
        "delta_tire_age" => pairs.iter().map(|p| p.delta_tire_age).collect::<Vec<_>>(),
        "compound_advantage" => pairs.iter().map(|p| p.compound_advantage).collect::<Vec<_>>(),
        "estimated_gap" => pairs.iter().map(|p| p.estimated_gap).collect::<Vec<_>>(),
        "overtook" => pairs.iter().map(|p| p.overtook as u32).collect::<Vec<_>>()
    )?;
    Ok(df)
}
