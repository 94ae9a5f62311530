//! Outlier and leakage filtering
//!
//! [`PaceOutlierFilter`] rejects laps that do not reflect racing pace (pit
//! stops, safety car periods). [`NextIntervalIndex`] resolves the attacker's
//! record at interval + 1, and refuses to guess when the data is ambiguous.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OutlierRule;
use crate::models::LapRecord;

/// Pace threshold fitted once on the full candidate set
///
/// The threshold is computed a single time from the records passed to
/// [`PaceOutlierFilter::fit`]; applying the fitted filter again to its own
/// output removes nothing further.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaceOutlierFilter {
    rule: OutlierRule,
    mean: f64,
    std: f64,
    threshold: f64,
}

impl PaceOutlierFilter {
    /// Fit the threshold on a set of records (`None` when there are none)
    pub fn fit(records: &[LapRecord], rule: OutlierRule) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let n = records.len() as f64;
        let mean = records.iter().map(|r| r.pace).sum::<f64>() / n;
        // Sample standard deviation; a single lap has no spread
        let std = if records.len() > 1 {
            let var = records.iter().map(|r| (r.pace - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };

        let threshold = match rule {
            OutlierRule::MeanPlusSigma { k } => mean + k * std,
            OutlierRule::MeanRatio { ratio } => mean * ratio,
        };

        debug!(
            "Pace outlier threshold {:.3}s (mean {:.3}s, std {:.3}s)",
            threshold, mean, std
        );

        Some(Self {
            rule,
            mean,
            std,
            threshold,
        })
    }

    pub fn rule(&self) -> OutlierRule {
        self.rule
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    /// Laps slower than this (in seconds) are outliers
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Strictly above the threshold, so constant-pace data keeps every lap
    pub fn is_outlier(&self, record: &LapRecord) -> bool {
        record.pace > self.threshold
    }

    /// Keep only representative laps
    pub fn apply(&self, records: &[LapRecord]) -> Vec<LapRecord> {
        records
            .iter()
            .filter(|r| !self.is_outlier(r))
            .cloned()
            .collect()
    }
}

type RecordKey<'a> = (&'a str, &'a str, u32);

/// Result of a next-interval lookup
#[derive(Debug, Clone, Copy)]
pub enum NextInterval<'a> {
    /// Exactly one record at interval + 1
    Found(&'a LapRecord),
    /// No record at interval + 1 (end of session, retirement, skipped lap)
    Missing,
    /// Duplicate (session, competitor, interval) keys make the label unsafe
    Ambiguous,
}

/// Index of records by (session, competitor, interval)
pub struct NextIntervalIndex<'a> {
    records: HashMap<RecordKey<'a>, &'a LapRecord>,
    ambiguous: HashSet<RecordKey<'a>>,
}

impl<'a> NextIntervalIndex<'a> {
    pub fn build(records: &'a [LapRecord]) -> Self {
        let mut index: HashMap<RecordKey<'a>, &'a LapRecord> = HashMap::with_capacity(records.len());
        let mut ambiguous = HashSet::new();

        for record in records {
            let key = (record.session.as_str(), record.competitor.as_str(), record.interval);
            if index.insert(key, record).is_some() {
                ambiguous.insert(key);
            }
        }

        if !ambiguous.is_empty() {
            warn!(
                "{} duplicate (session, competitor, interval) keys, affected pairs will be excluded",
                ambiguous.len()
            );
        }

        Self {
            records: index,
            ambiguous,
        }
    }

    /// Number of duplicated keys
    pub fn ambiguous_keys(&self) -> usize {
        self.ambiguous.len()
    }

    /// The same competitor's record at exactly interval + 1 of the same session
    ///
    /// A record whose own key is duplicated is treated as ambiguous too,
    /// since there is no way to tell which duplicate the label belongs to.
    pub fn next_for(&self, record: &'a LapRecord) -> NextInterval<'a> {
        let current: RecordKey<'a> = (&record.session, &record.competitor, record.interval);
        if self.ambiguous.contains(&current) {
            return NextInterval::Ambiguous;
        }

        let Some(next_interval) = record.interval.checked_add(1) else {
            return NextInterval::Missing;
        };
        let key: RecordKey<'a> = (&record.session, &record.competitor, next_interval);

        if self.ambiguous.contains(&key) {
            return NextInterval::Ambiguous;
        }
        match self.records.get(&key).copied() {
            Some(next) => NextInterval::Found(next),
            None => NextInterval::Missing,
        }
    }
}

/// Counters reported by the labeling and filtering stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Candidate pairs entering the stage
    pub candidates: usize,
    /// Records above the pace threshold
    pub outlier_records: usize,
    /// Pairs discarded because a participant or the next lap was an outlier
    pub outlier_pairs: usize,
    /// Pairs without an exact interval + 1 record for the attacker
    pub missing_next: usize,
    /// Pairs excluded because of duplicate keys
    pub ambiguous: usize,
    /// Labeled pairs kept
    pub kept: usize,
}
