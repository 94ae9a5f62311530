//! Classification Metrics
//!
//! Evaluate a classifier on the held-out partition: accuracy, precision,
//! recall, F1, ROC-AUC and the confusion matrix.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Binary confusion matrix (class 1 = overtake)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    pub tn: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1, p == 1) {
                (true, true) => cm.tp += 1,
                (false, true) => cm.fp += 1,
                (true, false) => cm.fn_ += 1,
                (false, false) => cm.tn += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.fn_ + self.tn
    }
}

/// Evaluation metrics on the test partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Calculate metrics from labels, hard predictions and class-1 probabilities
pub fn calculate_metrics(y_true: &[u8], y_pred: &[u8], y_prob: &[f64]) -> ClassificationMetrics {
    if y_true.is_empty() {
        return ClassificationMetrics::default();
    }

    let confusion = ConfusionMatrix::from_predictions(y_true, y_pred);

    let accuracy = ratio(confusion.tp + confusion.tn, confusion.total());
    let precision = ratio(confusion.tp, confusion.tp + confusion.fp);
    let recall = ratio(confusion.tp, confusion.tp + confusion.fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassificationMetrics {
        accuracy,
        precision,
        recall,
        f1,
        roc_auc: roc_auc(y_true, y_prob),
        confusion,
    }
}

/// Area under the ROC curve via the Mann-Whitney rank statistic
///
/// Tied scores receive their average rank. Returns 0.5 when only one class
/// is present, since the curve is undefined there.
pub fn roc_auc(y_true: &[u8], y_prob: &[f64]) -> f64 {
    let n_pos = y_true.iter().filter(|&&t| t == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..y_prob.len()).collect();
    order.sort_by(|&a, &b| y_prob[a].partial_cmp(&y_prob[b]).unwrap_or(Ordering::Equal));

    // 1-based ranks, averaged over ties
    let mut ranks = vec![0.0; y_prob.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && y_prob[order[j + 1]] == y_prob[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(&t, _)| t == 1)
        .map(|(_, &r)| r)
        .sum();

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Metric used to pick the best candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
    Accuracy,
    Precision,
    Recall,
    #[default]
    F1,
    RocAuc,
}

impl SelectionMetric {
    pub fn value(self, metrics: &ClassificationMetrics) -> f64 {
        match self {
            SelectionMetric::Accuracy => metrics.accuracy,
            SelectionMetric::Precision => metrics.precision,
            SelectionMetric::Recall => metrics.recall,
            SelectionMetric::F1 => metrics.f1,
            SelectionMetric::RocAuc => metrics.roc_auc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SelectionMetric::Accuracy => "accuracy",
            SelectionMetric::Precision => "precision",
            SelectionMetric::Recall => "recall",
            SelectionMetric::F1 => "f1",
            SelectionMetric::RocAuc => "roc_auc",
        }
    }
}

impl fmt::Display for SelectionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "accuracy" => Ok(SelectionMetric::Accuracy),
            "precision" => Ok(SelectionMetric::Precision),
            "recall" => Ok(SelectionMetric::Recall),
            "f1" => Ok(SelectionMetric::F1),
            "roc_auc" | "auc" => Ok(SelectionMetric::RocAuc),
            other => Err(format!("unknown selection metric: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_metrics() {
        let y_true = [1, 1, 0, 0, 0, 1];
        let y_pred = [1, 0, 0, 1, 0, 1];
        let y_prob = [0.9, 0.4, 0.2, 0.6, 0.1, 0.8];

        let m = calculate_metrics(&y_true, &y_pred, &y_prob);
        assert_eq!(
            m.confusion,
            ConfusionMatrix {
                tp: 2,
                fp: 1,
                fn_: 1,
                tn: 2
            }
        );
        assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-9);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-9);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-9);
        // Positives 0.9, 0.4, 0.8 vs negatives 0.2, 0.6, 0.1: 8 of 9 orderings correct
        assert!((m.roc_auc - 8.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_positive_predictions() {
        let m = calculate_metrics(&[1, 0, 0], &[0, 0, 0], &[0.3, 0.2, 0.1]);
        assert!((m.precision).abs() < 1e-9);
        assert!((m.recall).abs() < 1e-9);
        assert!((m.f1).abs() < 1e-9);
        assert!((m.roc_auc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty() {
        let m = calculate_metrics(&[], &[], &[]);
        assert_eq!(m, ClassificationMetrics::default());
    }

    #[test]
    fn test_roc_auc_ties_and_single_class() {
        assert!((roc_auc(&[1, 0], &[0.5, 0.5]) - 0.5).abs() < 1e-9);
        assert!((roc_auc(&[0, 0, 0], &[0.1, 0.2, 0.3]) - 0.5).abs() < 1e-9);
        assert!((roc_auc(&[0, 1], &[0.9, 0.1])).abs() < 1e-9);
    }

    #[test]
    fn test_selection_metric() {
        let m = ClassificationMetrics {
            accuracy: 0.9,
            f1: 0.4,
            ..Default::default()
        };
        assert_eq!(SelectionMetric::default(), SelectionMetric::F1);
        assert!((SelectionMetric::default().value(&m) - 0.4).abs() < 1e-9);
        assert_eq!("roc-auc".parse::<SelectionMetric>().unwrap(), SelectionMetric::RocAuc);
        assert!("mcc".parse::<SelectionMetric>().is_err());
    }

    #[test]
    fn test_confusion_serializes_fn() {
        let json = serde_json::to_string(&ConfusionMatrix::default()).unwrap();
        assert!(json.contains("\"fn\":0"));
    }
}
