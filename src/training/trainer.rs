//! Candidate fitting and best-model selection

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::TrainingTable;
use crate::training::classifier::{OvertakeClassifier, TrainedModel};
use crate::training::metrics::{calculate_metrics, ClassificationMetrics, SelectionMetric};

/// Metrics of the selected model, persisted as `model_info.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub selection_metric: SelectionMetric,
    pub metrics: ClassificationMetrics,
    pub feature_names: Vec<String>,
    pub trained_at: String,
}

/// Every candidate's evaluation, persisted as `training_report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub models: BTreeMap<String, ClassificationMetrics>,
    /// Candidates that failed to fit, with the reason
    pub failed: BTreeMap<String, String>,
    pub best_model: String,
    pub selection_metric: SelectionMetric,
    pub feature_names: Vec<String>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub generated_at: String,
}

/// One evaluated candidate
#[derive(Debug, Clone)]
pub struct CandidateResult {
    pub name: String,
    pub metrics: ClassificationMetrics,
}

/// Training outcome
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub best: TrainedModel,
    pub info: ModelInfo,
    pub report: TrainingReport,
}

/// Fits candidates on the training partition and selects on the test partition
#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    selection: SelectionMetric,
}

impl ModelTrainer {
    pub fn new(selection: SelectionMetric) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> SelectionMetric {
        self.selection
    }

    /// Fit one candidate and evaluate it on the untouched test partition
    pub fn evaluate<M: OvertakeClassifier + ?Sized>(
        &self,
        model: &mut M,
        table: &TrainingTable,
    ) -> Result<ClassificationMetrics> {
        model.fit(&table.x_train, &table.y_train)?;

        let proba = model.predict_proba(&table.x_test)?;
        let pred = model.predict(&table.x_test)?;

        Ok(calculate_metrics(
            &table.y_test.to_vec(),
            &pred.to_vec(),
            &proba.to_vec(),
        ))
    }

    /// Train every candidate and keep the best by the selection metric
    ///
    /// `on_done` is called after each candidate (for progress reporting).
    /// Ties keep the earlier candidate. A candidate that fails to fit is
    /// recorded and skipped; the run fails only if none succeeds.
    pub fn train<F>(
        &self,
        table: &TrainingTable,
        candidates: Vec<TrainedModel>,
        mut on_done: F,
    ) -> Result<TrainingOutcome>
    where
        F: FnMut(&CandidateResult),
    {
        if table.x_test.nrows() == 0 {
            return Err(PipelineError::Model("test partition is empty".to_string()));
        }

        let mut models = BTreeMap::new();
        let mut failed = BTreeMap::new();
        let mut best: Option<(TrainedModel, ClassificationMetrics)> = None;

        for mut candidate in candidates {
            let name = candidate.name().to_string();
            let metrics = match self.evaluate(&mut candidate, table) {
                Ok(metrics) => metrics,
                Err(e) => {
                    warn!("Candidate {} failed: {}", name, e);
                    failed.insert(name, e.to_string());
                    continue;
                }
            };

            info!(
                "{}: accuracy {:.3}, precision {:.3}, recall {:.3}, f1 {:.3}, auc {:.3}",
                name,
                metrics.accuracy,
                metrics.precision,
                metrics.recall,
                metrics.f1,
                metrics.roc_auc
            );
            on_done(&CandidateResult {
                name: name.clone(),
                metrics: metrics.clone(),
            });
            models.insert(name, metrics.clone());

            let better = match &best {
                Some((_, current)) => self.selection.value(&metrics) > self.selection.value(current),
                None => true,
            };
            if better {
                best = Some((candidate, metrics));
            }
        }

        let (best, metrics) = best.ok_or_else(|| {
            PipelineError::Model(format!(
                "no candidate could be fitted ({})",
                failed
                    .iter()
                    .map(|(name, reason)| format!("{}: {}", name, reason))
                    .collect::<Vec<_>>()
                    .join("; ")
            ))
        })?;

        info!(
            "Best model: {} ({} = {:.3})",
            best.name(),
            self.selection,
            self.selection.value(&metrics)
        );

        let now = Utc::now().to_rfc3339();
        let info = ModelInfo {
            name: best.name().to_string(),
            selection_metric: self.selection,
            metrics,
            feature_names: table.feature_names.clone(),
            trained_at: now.clone(),
        };
        let report = TrainingReport {
            models,
            failed,
            best_model: info.name.clone(),
            selection_metric: self.selection,
            feature_names: table.feature_names.clone(),
            train_rows: table.x_train.nrows(),
            test_rows: table.x_test.nrows(),
            generated_at: now,
        };

        Ok(TrainingOutcome { best, info, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::classifier::{default_candidates, ForestClassifier, LogisticClassifier};
    use ndarray::{array, Array1, Array2};

    fn table() -> TrainingTable {
        let x_train: Array2<f64> = array![
            [-2.0, 0.1],
            [-1.5, -0.3],
            [-1.2, 0.4],
            [-0.9, 0.0],
            [0.8, 0.2],
            [1.1, -0.1],
            [1.6, 0.3],
            [2.0, -0.2]
        ];
        let y_train: Array1<u8> = array![1, 1, 1, 1, 0, 0, 0, 0];
        TrainingTable {
            feature_names: vec!["delta_pace".to_string(), "noise".to_string()],
            x_train,
            x_test: array![[-1.0, 0.0], [1.0, 0.1], [-1.8, 0.2], [1.4, -0.3]],
            y_train,
            y_test: array![1, 0, 1, 0],
        }
    }

    #[test]
    fn test_train_selects_best() {
        let trainer = ModelTrainer::default();
        let mut seen = Vec::new();
        let outcome = trainer
            .train(&table(), default_candidates(), |r| seen.push(r.name.clone()))
            .unwrap();

        assert_eq!(seen.len(), 4);
        assert_eq!(outcome.report.models.len(), 4);
        assert!(outcome.report.failed.is_empty());
        assert_eq!(outcome.report.selection_metric, SelectionMetric::F1);
        assert_eq!(outcome.info.name, outcome.report.best_model);
        assert!(outcome.best.is_fitted());
        assert!((outcome.info.metrics.f1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let candidates = vec![
            TrainedModel::Logistic(LogisticClassifier::new("first", 0.1)),
            TrainedModel::Logistic(LogisticClassifier::new("second", 0.1)),
        ];
        let outcome = ModelTrainer::new(SelectionMetric::Accuracy)
            .train(&table(), candidates, |_| {})
            .unwrap();
        assert_eq!(outcome.info.name, "first");
    }

    #[test]
    fn test_forest_wins_on_band_data() {
        // Overtakes only for small pace deltas: no single linear cut works
        let xs: Vec<f64> = (0..=40).map(|i| -2.0 + i as f64 * 0.1).collect();
        let y_train: Array1<u8> = xs.iter().map(|v| u8::from(v.abs() < 0.65)).collect();
        let x_train = Array2::from_shape_vec((xs.len(), 1), xs).unwrap();
        let t = TrainingTable {
            feature_names: vec!["delta_pace".to_string()],
            x_train,
            x_test: array![[-1.6], [-1.2], [-0.3], [-0.2], [0.0], [0.2], [0.3], [1.2], [1.6]],
            y_train,
            y_test: array![0, 0, 1, 1, 1, 1, 1, 0, 0],
        };
        let candidates = vec![
            TrainedModel::Logistic(LogisticClassifier::new("logistic_regression", 1.0)),
            TrainedModel::Forest(ForestClassifier::new("random_forest", 25)),
        ];

        let outcome = ModelTrainer::default().train(&t, candidates, |_| {}).unwrap();

        assert_eq!(outcome.info.name, "random_forest");
        assert!(matches!(outcome.best, TrainedModel::Forest(_)));
        assert!((outcome.report.models["random_forest"].f1 - 1.0).abs() < 1e-9);
        assert!(outcome.report.models["logistic_regression"].f1 < 1.0);
    }

    #[test]
    fn test_all_candidates_fail() {
        let mut t = table();
        t.y_train = Array1::zeros(8);
        let err = ModelTrainer::default()
            .train(&t, default_candidates(), |_| {})
            .unwrap_err();
        assert!(err.to_string().contains("no candidate"));
    }
}
