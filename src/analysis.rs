//! Feature Correlation Analysis
//!
//! Pearson correlation over the numeric columns of the labeled pairs, used to
//! spot redundant relative features before training.

use ndarray::Array2;
use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::models::RelativePair;

/// Default |r| above which two columns are reported as redundant
pub const DEFAULT_REDUNDANCY_THRESHOLD: f64 = 0.7;

/// Columns included in the analysis
pub const ANALYSIS_COLUMNS: [&str; 10] = [
    "attacker_standing",
    "attacker_pace",
    "attacker_tire_age",
    "defender_pace",
    "defender_tire_age",
    "delta_pace",
    "delta_tire_age",
    "compound_advantage",
    "estimated_gap",
    "overtook",
];

fn column_values(pair: &RelativePair) -> [f64; 10] {
    [
        pair.attacker_standing as f64,
        pair.attacker_pace,
        pair.attacker_tire_age as f64,
        pair.defender_pace,
        pair.defender_tire_age as f64,
        pair.delta_pace,
        pair.delta_tire_age as f64,
        pair.compound_advantage as f64,
        pair.estimated_gap,
        pair.overtook as f64,
    ]
}

/// Two strongly correlated columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedundantPair {
    pub first: String,
    pub second: String,
    pub r: f64,
}

/// Symmetric correlation matrix
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl CorrelationMatrix {
    /// Correlation matrix of the labeled pairs
    pub fn from_pairs(pairs: &[RelativePair]) -> Self {
        let width = ANALYSIS_COLUMNS.len();
        let rows: Vec<[f64; 10]> = pairs.iter().map(column_values).collect();

        let mut values = Array2::<f64>::eye(width);
        for i in 0..width {
            for j in (i + 1)..width {
                let a: Vec<f64> = rows.iter().map(|r| r[i]).collect();
                let b: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                let r = pearson(&a, &b);
                values[[i, j]] = r;
                values[[j, i]] = r;
            }
        }

        Self {
            columns: ANALYSIS_COLUMNS.iter().map(|s| s.to_string()).collect(),
            values,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[[i, j]])
    }

    /// Column pairs with |r| above `threshold`, strongest first
    pub fn redundant_pairs(&self, threshold: f64) -> Vec<RedundantPair> {
        let mut found = Vec::new();
        for i in 0..self.columns.len() {
            for j in (i + 1)..self.columns.len() {
                let r = self.values[[i, j]];
                if r.abs() > threshold {
                    found.push(RedundantPair {
                        first: self.columns[i].clone(),
                        second: self.columns[j].clone(),
                        r,
                    });
                }
            }
        }
        found.sort_by(|a, b| {
            b.r.abs()
                .partial_cmp(&a.r.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        found
    }

    /// Correlations with the label, strongest first (label itself excluded)
    pub fn label_correlations(&self) -> Vec<(String, f64)> {
        let Some(label) = self.columns.iter().position(|c| c == "overtook") else {
            return Vec::new();
        };
        let mut out: Vec<(String, f64)> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label)
            .map(|(i, c)| (c.clone(), self.values[[i, label]]))
            .collect();
        out.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    /// Matrix as a frame with a leading `feature` column
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut series = vec![Series::new("feature", self.columns.clone())];
        for (j, name) in self.columns.iter().enumerate() {
            let column: Vec<f64> = self.values.column(j).to_vec();
            series.push(Series::new(name, column));
        }
        Ok(DataFrame::new(series)?)
    }
}

/// Pearson correlation; 0.0 when either side is constant or empty
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        0.0
    } else {
        cov / (var_a.sqrt() * var_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Compound;

    fn pair(delta: f64, age_delta: i64, overtook: u8) -> RelativePair {
        RelativePair {
            session: "2023".to_string(),
            interval: 1,
            attacker: "NOR".to_string(),
            defender: "LEC".to_string(),
            attacker_standing: 4,
            attacker_pace: 85.0 + delta,
            attacker_tire_age: 10,
            attacker_compound: Compound::Medium,
            defender_pace: 85.0,
            defender_tire_age: (10 - age_delta) as u32,
            defender_compound: Compound::Medium,
            delta_pace: delta,
            delta_tire_age: age_delta,
            compound_advantage: 0,
            estimated_gap: delta.abs() * 0.5,
            overtook,
        }
    }

    #[test]
    fn test_pearson() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-12);
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).abs() < 1e-12);
        assert!(pearson(&[1.0], &[1.0]).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_symmetric_without_nan() {
        let pairs = vec![pair(-1.0, -5, 1), pair(0.5, 2, 0), pair(1.2, 4, 0), pair(-0.3, -1, 1)];
        let m = CorrelationMatrix::from_pairs(&pairs);

        assert_eq!(m.values.dim(), (10, 10));
        assert!(m.values.iter().all(|v| v.is_finite()));
        for i in 0..10 {
            assert!((m.values[[i, i]] - 1.0).abs() < 1e-12);
            for j in 0..10 {
                assert!((m.values[[i, j]] - m.values[[j, i]]).abs() < 1e-12);
            }
        }
        // Standing is constant here
        assert!(m.get("attacker_standing", "delta_pace").unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_redundant_pairs() {
        let pairs = vec![pair(-1.0, -5, 1), pair(0.5, 2, 0), pair(1.2, 4, 0), pair(-0.3, -1, 1)];
        let m = CorrelationMatrix::from_pairs(&pairs);
        let redundant = m.redundant_pairs(DEFAULT_REDUNDANCY_THRESHOLD);

        // attacker pace is delta pace shifted by a constant
        assert!(redundant.iter().any(|p| {
            p.first == "attacker_pace" && p.second == "delta_pace" && (p.r - 1.0).abs() < 1e-9
        }));
        assert!(redundant.iter().all(|p| p.r.abs() > DEFAULT_REDUNDANCY_THRESHOLD));

        let label = m.label_correlations();
        assert_eq!(label.len(), 9);
        assert!(label.iter().all(|(c, _)| c != "overtook"));
    }

    #[test]
    fn test_to_frame() {
        let m = CorrelationMatrix::from_pairs(&[pair(-1.0, -5, 1), pair(0.5, 2, 0)]);
        let df = m.to_frame().unwrap();
        assert_eq!(df.height(), 10);
        assert_eq!(df.width(), 11);
    }
}
