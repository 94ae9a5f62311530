//! Minority oversampling (SMOTE)
//!
//! Balances the training partition by interpolating between minority
//! samples and their nearest minority neighbours. Only ever applied to the
//! training partition.

use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Result;

/// Resampling result
#[derive(Debug, Clone)]
pub struct ResampleOutcome {
    pub x: Array2<f64>,
    pub y: Array1<u8>,
    /// Number of synthetic rows appended
    pub synthesized: usize,
    /// Set when balancing was not possible and the input was returned as-is
    pub skipped: Option<String>,
}

/// Seeded SMOTE oversampler
#[derive(Debug, Clone)]
pub struct SmoteResampler {
    k_neighbors: usize,
    seed: u64,
}

impl SmoteResampler {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Oversample the minority class up to the majority count
    pub fn resample(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<ResampleOutcome> {
        let positives = y.iter().filter(|&&v| v == 1).count();
        let negatives = y.len() - positives;

        if positives == negatives {
            return Ok(unchanged(x, y, None));
        }

        let (minority_label, minority, majority) = if positives < negatives {
            (1u8, positives, negatives)
        } else {
            (0u8, negatives, positives)
        };

        if minority < 2 {
            return Ok(unchanged(
                x,
                y,
                Some(format!(
                    "minority class {} has {} sample(s), at least 2 are needed",
                    minority_label, minority
                )),
            ));
        }

        let members: Vec<usize> = y
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == minority_label)
            .map(|(i, _)| i)
            .collect();
        let k = self.k_neighbors.min(minority - 1);
        let neighbors = nearest_neighbors(x, &members, k);

        let needed = majority - minority;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out = x.clone();

        for _ in 0..needed {
            let i = rng.gen_range(0..members.len());
            let j = neighbors[i][rng.gen_range(0..k)];
            let base = x.row(members[i]);
            let other = x.row(j);
            let gap: f64 = rng.gen();

            let synthetic: Array1<f64> = &base + &((&other - &base) * gap);
            out.push_row(synthetic.view())?;
        }

        let labels: Array1<u8> = y
            .iter()
            .copied()
            .chain(std::iter::repeat(minority_label).take(needed))
            .collect();

        debug!(
            "SMOTE: {} synthetic rows for class {} (k = {})",
            needed, minority_label, k
        );

        Ok(ResampleOutcome {
            x: out,
            y: labels,
            synthesized: needed,
            skipped: None,
        })
    }
}

fn unchanged(x: &Array2<f64>, y: &Array1<u8>, skipped: Option<String>) -> ResampleOutcome {
    ResampleOutcome {
        x: x.clone(),
        y: y.clone(),
        synthesized: 0,
        skipped,
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum()
}

/// For each member, the row indices of its k nearest other members
fn nearest_neighbors(x: &Array2<f64>, members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .map(|&i| {
            let mut distances: Vec<(f64, usize)> = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (squared_distance(x.row(i), x.row(j)), j))
                .collect();
            distances.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then(a.1.cmp(&b.1))
            });
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn imbalanced() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [0.3, 0.3],
            [0.4, 0.2],
            [0.5, 0.4],
            [0.6, 0.1],
            [0.7, 0.3],
            [5.0, 5.0],
            [5.5, 5.2],
            [6.0, 5.1]
        ];
        let y = array![0u8, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_balances_classes() {
        let (x, y) = imbalanced();
        let outcome = SmoteResampler::new(5, 42).resample(&x, &y).unwrap();

        let positives = outcome.y.iter().filter(|&&v| v == 1).count();
        let negatives = outcome.y.iter().filter(|&&v| v == 0).count();
        assert_eq!(negatives, 8);
        assert_eq!(positives, 8);
        assert_eq!(outcome.synthesized, 5);
        assert_eq!(outcome.x.nrows(), 16);
        assert!(outcome.skipped.is_none());

        // Original rows are kept in place
        assert_eq!(outcome.x.row(0), x.row(0));
        assert_eq!(outcome.x.row(10), x.row(10));
    }

    #[test]
    fn test_synthetic_rows_stay_within_minority_hull() {
        let (x, y) = imbalanced();
        let outcome = SmoteResampler::new(5, 42).resample(&x, &y).unwrap();

        for row in outcome.x.rows().into_iter().skip(11) {
            assert!(row[0] >= 5.0 && row[0] <= 6.0);
            assert!(row[1] >= 5.0 && row[1] <= 5.2);
        }
    }

    #[test]
    fn test_seeded_output_is_reproducible() {
        let (x, y) = imbalanced();
        let a = SmoteResampler::new(5, 42).resample(&x, &y).unwrap();
        let b = SmoteResampler::new(5, 42).resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_single_minority_sample_skipped() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0u8, 0, 1];
        let outcome = SmoteResampler::new(5, 42).resample(&x, &y).unwrap();

        assert_eq!(outcome.synthesized, 0);
        assert_eq!(outcome.x.nrows(), 3);
        assert!(outcome.skipped.is_some());
    }

    #[test]
    fn test_already_balanced() {
        let x = array![[0.0], [1.0]];
        let y = array![0u8, 1];
        let outcome = SmoteResampler::new(5, 42).resample(&x, &y).unwrap();
        assert_eq!(outcome.synthesized, 0);
        assert!(outcome.skipped.is_none());
    }

    #[test]
    fn test_nearest_neighbors_excludes_self() {
        let x = array![[0.0], [1.0], [3.0], [10.0]];
        let nn = nearest_neighbors(&x, &[0, 1, 2, 3], 2);
        assert_eq!(nn[0], vec![1, 2]);
        assert_eq!(nn[3], vec![2, 1]);
    }
}
