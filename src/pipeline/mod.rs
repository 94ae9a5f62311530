//! Overtake training pipeline
//!
//! Stages run strictly in order, each consuming the previous stage's output:
//!
//! ```text
//! INGESTED -> NORMALIZED -> PAIRED -> LABELED_FILTERED -> SPLIT -> SCALED -> BALANCED -> READY_FOR_FIT
//! ```
//!
//! A stage that produces nothing aborts the run with
//! [`PipelineError::EmptyStage`]. Data shortages that only prevent
//! stratification or balancing are recorded as [`PipelineWarning`]s.

pub mod features;
pub mod filter;
pub mod pairing;
pub mod resample;
pub mod scaler;
pub mod split;
pub mod table;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::data::{LapRecordNormalizer, LapTable};
use crate::error::{PipelineError, Result};
use crate::models::{LapRecord, RelativePair};

pub use features::{feature_names, RelativeFeatureEncoder, RelativeFeatures, FEATURE_NAMES, NUM_FEATURES};
pub use filter::{FilterStats, NextInterval, NextIntervalIndex, PaceOutlierFilter};
pub use pairing::{AdjacencyPairBuilder, CandidatePair};
pub use resample::{ResampleOutcome, SmoteResampler};
pub use scaler::FittedScaler;
pub use split::{SplitIndices, TrainTestSplitter};
pub use table::{pairs_to_matrix, ClassBalance, TrainingTable};

/// Pipeline stage, used in logs and to locate fatal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Ingested,
    Normalized,
    Paired,
    LabeledFiltered,
    Split,
    Scaled,
    Balanced,
    ReadyForFit,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Ingested => "INGESTED",
            PipelineStage::Normalized => "NORMALIZED",
            PipelineStage::Paired => "PAIRED",
            PipelineStage::LabeledFiltered => "LABELED_FILTERED",
            PipelineStage::Split => "SPLIT",
            PipelineStage::Scaled => "SCALED",
            PipelineStage::Balanced => "BALANCED",
            PipelineStage::ReadyForFit => "READY_FOR_FIT",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Degradation the run recovered from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    /// Split fell back to a plain shuffle
    StratificationSkipped { reason: String },
    /// Training partition left unbalanced
    ResamplingSkipped { reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::StratificationSkipped { reason } => {
                write!(f, "stratified split skipped: {}", reason)
            }
            PipelineWarning::ResamplingSkipped { reason } => {
                write!(f, "class balancing skipped: {}", reason)
            }
        }
    }
}

/// Labeled pairs and the filter counters that produced them
#[derive(Debug, Clone)]
pub struct LabeledPairs {
    pub pairs: Vec<RelativePair>,
    pub filter: Option<PaceOutlierFilter>,
    pub stats: FilterStats,
}

/// Summary of one pipeline run, persisted as `pipeline_report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub generated_at: String,
    pub config: PipelineConfig,
    pub ingested_rows: usize,
    pub normalized_records: usize,
    pub dropped_rows: usize,
    pub outlier_threshold: Option<f64>,
    pub filter: FilterStats,
    pub label_balance: ClassBalance,
    pub stratified: bool,
    pub train_balance_before: ClassBalance,
    pub train_balance_after: ClassBalance,
    pub test_balance: ClassBalance,
    pub synthesized: usize,
    pub feature_names: Vec<String>,
    pub warnings: Vec<PipelineWarning>,
}

/// Everything a model fit needs, plus what inference must reuse
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Labeled pairs before splitting, with the descriptive columns
    pub pairs: Vec<RelativePair>,
    pub table: TrainingTable,
    pub scaler: FittedScaler,
    pub report: PipelineReport,
}

impl PipelineOutput {
    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.report.warnings
    }
}

/// Stage-by-stage pipeline runner
pub struct OvertakePipeline {
    config: PipelineConfig,
}

impl OvertakePipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on a raw lap table
    pub fn run(&self, table: &LapTable) -> Result<PipelineOutput> {
        info!("[{}] {} raw rows", PipelineStage::Ingested, table.len());
        if table.is_empty() {
            return Err(PipelineError::EmptyStage {
                stage: PipelineStage::Ingested,
                reason: "lap table has no rows".to_string(),
            });
        }

        let laps = LapRecordNormalizer::normalize(table)?;
        let mut output = self.run_records(&laps.records)?;
        output.report.ingested_rows = table.len();
        output.report.dropped_rows = laps.dropped;
        Ok(output)
    }

    /// Run every stage after normalization
    pub fn run_records(&self, records: &[LapRecord]) -> Result<PipelineOutput> {
        info!("[{}] {} lap records", PipelineStage::Normalized, records.len());
        if records.is_empty() {
            return Err(PipelineError::EmptyStage {
                stage: PipelineStage::Normalized,
                reason: "no lap record has all required fields".to_string(),
            });
        }

        let labeled = self.label_pairs(records)?;
        let mut warnings = Vec::new();

        // SPLIT
        let (x_all, y_all) = pairs_to_matrix(&labeled.pairs)?;
        let splitter = TrainTestSplitter::new(
            self.config.test_size,
            self.config.random_seed,
            self.config.stratify,
        );
        let split = splitter
            .split(&y_all.to_vec())
            .ok_or_else(|| PipelineError::EmptyStage {
                stage: PipelineStage::Split,
                reason: format!(
                    "{} labeled pair(s), at least 2 are needed for a train/test split",
                    labeled.pairs.len()
                ),
            })?;
        if let Some(reason) = &split.fallback_reason {
            warn!("[{}] stratification skipped: {}", PipelineStage::Split, reason);
            warnings.push(PipelineWarning::StratificationSkipped {
                reason: reason.clone(),
            });
        }
        info!(
            "[{}] {} train / {} test (stratified: {})",
            PipelineStage::Split,
            split.train.len(),
            split.test.len(),
            split.stratified
        );

        let x_train = table::select_rows(&x_all, &split.train);
        let x_test = table::select_rows(&x_all, &split.test);
        let y_train = table::select_labels(&y_all, &split.train);
        let y_test = table::select_labels(&y_all, &split.test);

        // SCALED
        let names = feature_names();
        let scaler = FittedScaler::fit(&x_train, &names)?;
        let x_train = scaler.transform(&x_train)?;
        let x_test = scaler.transform(&x_test)?;
        info!(
            "[{}] scaler fitted on {} training rows",
            PipelineStage::Scaled,
            scaler.n_samples
        );

        // BALANCED
        let train_balance_before = ClassBalance::of(&y_train.to_vec());
        let resampler = SmoteResampler::new(self.config.smote_neighbors, self.config.random_seed);
        let balanced = resampler.resample(&x_train, &y_train)?;
        if let Some(reason) = &balanced.skipped {
            warn!("[{}] resampling skipped: {}", PipelineStage::Balanced, reason);
            warnings.push(PipelineWarning::ResamplingSkipped {
                reason: reason.clone(),
            });
        }
        let train_balance_after = ClassBalance::of(&balanced.y.to_vec());
        info!(
            "[{}] train classes {}/{} -> {}/{} ({} synthetic)",
            PipelineStage::Balanced,
            train_balance_before.negative,
            train_balance_before.positive,
            train_balance_after.negative,
            train_balance_after.positive,
            balanced.synthesized
        );

        let table = TrainingTable {
            feature_names: names.clone(),
            x_train: balanced.x,
            x_test,
            y_train: balanced.y,
            y_test,
        };
        let test_balance = table.test_balance();

        info!(
            "[{}] {} x {} training matrix, {} test rows",
            PipelineStage::ReadyForFit,
            table.x_train.nrows(),
            table.x_train.ncols(),
            table.x_test.nrows()
        );

        let report = PipelineReport {
            generated_at: Utc::now().to_rfc3339(),
            config: self.config.clone(),
            ingested_rows: records.len(),
            normalized_records: records.len(),
            dropped_rows: 0,
            outlier_threshold: labeled.filter.map(|f| f.threshold()),
            filter: labeled.stats,
            label_balance: ClassBalance::of(&y_all.to_vec()),
            stratified: split.stratified,
            train_balance_before,
            train_balance_after,
            test_balance,
            synthesized: balanced.synthesized,
            feature_names: names,
            warnings,
        };

        Ok(PipelineOutput {
            pairs: labeled.pairs,
            table,
            scaler,
            report,
        })
    }

    /// PAIRED and LABELED_FILTERED stages
    ///
    /// The outlier threshold is fitted once on all normalized records. A
    /// pair is discarded when the attacker, the defender or the attacker's
    /// next-interval lap is above it, and excluded when the attacker has no
    /// unambiguous record at exactly interval + 1.
    pub fn label_pairs(&self, records: &[LapRecord]) -> Result<LabeledPairs> {
        let filter = PaceOutlierFilter::fit(records, self.config.outlier_rule);
        let is_outlier = |r: &LapRecord| filter.map_or(false, |f| f.is_outlier(r));

        let candidates = AdjacencyPairBuilder::build(records);
        info!("[{}] {} candidate pairs", PipelineStage::Paired, candidates.len());
        if candidates.is_empty() {
            return Err(PipelineError::EmptyStage {
                stage: PipelineStage::Paired,
                reason: "no interval has two competitors at adjacent standings".to_string(),
            });
        }

        let index = NextIntervalIndex::build(records);
        let encoder = RelativeFeatureEncoder::new(self.config.gap_factor);

        let mut stats = FilterStats {
            candidates: candidates.len(),
            outlier_records: records.iter().filter(|r| is_outlier(*r)).count(),
            ..Default::default()
        };
        let mut pairs = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            if is_outlier(candidate.attacker) || is_outlier(candidate.defender) {
                stats.outlier_pairs += 1;
                continue;
            }

            let next = match index.next_for(candidate.attacker) {
                NextInterval::Found(next) => next,
                NextInterval::Missing => {
                    stats.missing_next += 1;
                    continue;
                }
                NextInterval::Ambiguous => {
                    stats.ambiguous += 1;
                    continue;
                }
            };
            if is_outlier(next) {
                stats.outlier_pairs += 1;
                continue;
            }

            match encoder.encode(candidate, Some(next)) {
                Some(pair) => pairs.push(pair),
                None => stats.missing_next += 1,
            }
        }
        stats.kept = pairs.len();

        info!(
            "[{}] {} labeled pairs ({} outlier, {} without next lap, {} ambiguous)",
            PipelineStage::LabeledFiltered,
            stats.kept,
            stats.outlier_pairs,
            stats.missing_next,
            stats.ambiguous
        );

        if pairs.is_empty() {
            return Err(PipelineError::EmptyStage {
                stage: PipelineStage::LabeledFiltered,
                reason: "every candidate pair was filtered or lacked a next-interval record"
                    .to_string(),
            });
        }

        Ok(LabeledPairs {
            pairs,
            filter,
            stats,
        })
    }
}
