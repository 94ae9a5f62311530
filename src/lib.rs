//! Overtake Predictor - overtake probability from lap-by-lap race telemetry
//!
//! This library provides:
//! - Lap export ingestion and normalization
//! - Attacker/defender pairing, relative features and overtake labels
//! - Outlier and leakage filtering, stratified split, scaling and SMOTE balancing
//! - Logistic regression training with F1-based model selection
//! - An estimation context for live "will I get past?" queries
//!
//! # Example
//!
//! ```no_run
//! use overtake::config::PipelineConfig;
//! use overtake::data::LapTable;
//! use overtake::pipeline::OvertakePipeline;
//!
//! let laps = LapTable::load("data/laps.csv")?;
//! let pipeline = OvertakePipeline::new(PipelineConfig::default())?;
//! let output = pipeline.run(&laps)?;
//! println!("{} labeled pairs", output.pairs.len());
//! # Ok::<(), overtake::error::PipelineError>(())
//! ```

pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod predictor;
pub mod training;

// Re-export commonly used types
pub use artifacts::ArtifactStore;
pub use config::{OutlierRule, PipelineConfig};
pub use error::{PipelineError, Result};
pub use models::{
    AttackerState, Compound, DefenderState, LapRecord, OvertakeEstimate, OvertakeQuery,
    ProbabilityBand, RelativePair,
};
pub use pipeline::{OvertakePipeline, PipelineOutput, PipelineStage, PipelineWarning};
pub use predictor::EstimationContext;
