use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Errors raised by the overtake pipeline and the estimation boundary
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required upstream file is absent
    #[error("missing input file: {}", path.display())]
    MissingInput { path: PathBuf },

    /// Required column absent after synonym reconciliation
    #[error("required column '{column}' not found (available: {})", available.join(", "))]
    MissingColumn {
        column: &'static str,
        available: Vec<String>,
    },

    /// A stage produced nothing to hand to the next one
    #[error("stage {stage} produced no output: {reason}")]
    EmptyStage {
        stage: PipelineStage,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Trained artifacts absent at the inference boundary
    #[error("model not ready, run training first (missing in {}: {})", dir.display(), missing.join(", "))]
    ArtifactsNotReady { dir: PathBuf, missing: Vec<String> },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Feature vector width differs from what the scaler or model was fitted on
    #[error("feature mismatch: expected {expected} columns, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("model error: {0}")]
    Model(String),

    #[error("polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write npy: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error("failed to read npy: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl PipelineError {
    /// True when the error means "no trained model yet" rather than a failure
    pub fn is_not_ready(&self) -> bool {
        matches!(self, PipelineError::ArtifactsNotReady { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(feature = "api")]
mod api {
    use actix_web::{http::StatusCode, HttpResponse, ResponseError};

    use super::PipelineError;
    use crate::models::ErrorResponse;

    impl ResponseError for PipelineError {
        fn status_code(&self) -> StatusCode {
            match self {
                PipelineError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                PipelineError::ArtifactsNotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }

        fn error_response(&self) -> HttpResponse {
            let error_code = match self {
                PipelineError::InvalidQuery(_) => "validation_error",
                PipelineError::ArtifactsNotReady { .. } => "not_ready",
                PipelineError::Model(_) => "prediction_error",
                _ => "internal_error",
            };

            HttpResponse::build(self.status_code()).json(ErrorResponse {
                error: error_code.to_string(),
                message: self.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_display() {
        let err = PipelineError::MissingColumn {
            column: "standing",
            available: vec!["Driver".to_string(), "LapTime".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("standing"));
        assert!(msg.contains("Driver, LapTime"));
    }

    #[test]
    fn test_empty_stage_names_stage() {
        let err = PipelineError::EmptyStage {
            stage: PipelineStage::Paired,
            reason: "no adjacent competitors".to_string(),
        };
        assert!(err.to_string().contains("PAIRED"));
    }

    #[test]
    fn test_not_ready() {
        let err = PipelineError::ArtifactsNotReady {
            dir: PathBuf::from("models"),
            missing: vec!["scaler.json".to_string()],
        };
        assert!(err.is_not_ready());
        assert!(err.to_string().contains("run training first"));
        assert!(!PipelineError::InvalidQuery("x".to_string()).is_not_ready());
    }
}
