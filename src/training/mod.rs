//! Model fitting, evaluation and selection

pub mod classifier;
pub mod metrics;
pub mod trainer;

pub use classifier::{
    default_candidates, ForestClassifier, LogisticClassifier, OvertakeClassifier, TrainedModel,
};
pub use metrics::{calculate_metrics, roc_auc, ClassificationMetrics, ConfusionMatrix, SelectionMetric};
pub use trainer::{CandidateResult, ModelInfo, ModelTrainer, TrainingOutcome, TrainingReport};
