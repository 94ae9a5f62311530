//! Train/test partitioning
//!
//! Label-stratified when every class can be represented on both sides,
//! otherwise a plain shuffled split.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of the two partitions
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    /// False when the split fell back to a non-stratified shuffle
    pub stratified: bool,
    /// Why stratification was not used, if it was requested
    pub fallback_reason: Option<String>,
}

/// Seeded train/test splitter
#[derive(Debug, Clone)]
pub struct TrainTestSplitter {
    test_size: f64,
    seed: u64,
    stratify: bool,
}

impl TrainTestSplitter {
    pub fn new(test_size: f64, seed: u64, stratify: bool) -> Self {
        Self {
            test_size,
            seed,
            stratify,
        }
    }

    /// Split `labels.len()` rows. Returns `None` with fewer than two rows.
    pub fn split(&self, labels: &[u8]) -> Option<SplitIndices> {
        let n = labels.len();
        if n < 2 {
            return None;
        }
        let n_test = test_count(n, self.test_size);
        let mut rng = StdRng::seed_from_u64(self.seed);

        if self.stratify {
            match self.stratified(labels, n_test, &mut rng) {
                Ok(split) => return Some(split),
                Err(reason) => {
                    let mut split = shuffled(n, n_test, &mut rng);
                    split.fallback_reason = Some(reason);
                    return Some(split);
                }
            }
        }

        Some(shuffled(n, n_test, &mut rng))
    }

    fn stratified(&self, labels: &[u8], n_test: usize, rng: &mut StdRng) -> Result<SplitIndices, String> {
        let n = labels.len();
        let mut classes: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
        for (i, &label) in labels.iter().enumerate() {
            classes.entry(label).or_default().push(i);
        }

        if let Some((label, members)) = classes.iter().find(|(_, m)| m.len() < 2) {
            return Err(format!(
                "class {} has only {} member(s), at least 2 are needed",
                label,
                members.len()
            ));
        }
        if n_test < classes.len() || n - n_test < classes.len() {
            return Err(format!(
                "test size {} cannot hold {} classes on both sides",
                n_test,
                classes.len()
            ));
        }

        let allocation = allocate(&classes, n_test);

        let mut train = Vec::with_capacity(n - n_test);
        let mut test = Vec::with_capacity(n_test);
        for ((_, members), take) in classes.into_iter().zip(allocation) {
            let mut members = members;
            members.shuffle(rng);
            test.extend_from_slice(&members[..take]);
            train.extend_from_slice(&members[take..]);
        }
        train.shuffle(rng);
        test.shuffle(rng);

        Ok(SplitIndices {
            train,
            test,
            stratified: true,
            fallback_reason: None,
        })
    }
}

/// Held-out row count: ceil(n * test_size), leaving at least one row per side
fn test_count(n: usize, test_size: f64) -> usize {
    let raw = (n as f64 * test_size).ceil() as usize;
    raw.clamp(1, n - 1)
}

/// Per-class test counts proportional to class size (largest remainder),
/// keeping at least one member of every class on each side
fn allocate(classes: &BTreeMap<u8, Vec<usize>>, n_test: usize) -> Vec<usize> {
    let n: usize = classes.values().map(Vec::len).sum();
    let quotas: Vec<f64> = classes
        .values()
        .map(|m| m.len() as f64 * n_test as f64 / n as f64)
        .collect();

    let mut counts: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();
    let mut remaining = n_test.saturating_sub(counts.iter().sum());

    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = quotas[a] - quotas[a].floor();
        let rb = quotas[b] - quotas[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
    });
    for &i in &order {
        if remaining == 0 {
            break;
        }
        counts[i] += 1;
        remaining -= 1;
    }

    for (count, members) in counts.iter_mut().zip(classes.values()) {
        *count = (*count).clamp(1, members.len() - 1);
    }
    counts
}

fn shuffled(n: usize, n_test: usize, rng: &mut StdRng) -> SplitIndices {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let train = indices.split_off(n_test);

    SplitIndices {
        train,
        test: indices,
        stratified: false,
        fallback_reason: None,
    }
}
