use ndarray::Array2;
use std::path::Path;
use tracing::info;

use crate::artifacts::{ArtifactStore, INFERENCE_INPUTS, MODEL_FILE};
use crate::error::{PipelineError, Result};
use crate::models::{OvertakeEstimate, OvertakeQuery, ProbabilityBand};
use crate::pipeline::{feature_names, FittedScaler, RelativeFeatureEncoder, NUM_FEATURES};
use crate::training::{OvertakeClassifier, TrainedModel};

/// Read-only inference state: fitted scaler and selected model
///
/// Built once (at process start-up) and shared by every query. Relative
/// features are recomputed with the same encoder used for training, then
/// scaled with the persisted scaler, never a refitted one.
pub struct EstimationContext {
    scaler: FittedScaler,
    model: TrainedModel,
}

impl EstimationContext {
    /// Load artifacts from a model directory
    ///
    /// Returns [`PipelineError::ArtifactsNotReady`] when any required file
    /// is absent, so callers can show a "run training first" state.
    pub fn load<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let store = ArtifactStore::new(model_dir.as_ref());
        store.require(&INFERENCE_INPUTS)?;

        let stored_names = store.load_feature_names()?;
        let scaler = store.load_scaler()?;
        let model = TrainedModel::load(store.path(MODEL_FILE))?;

        if stored_names != feature_names() || scaler.feature_names != stored_names {
            return Err(PipelineError::Model(format!(
                "feature order mismatch: artifacts have [{}], expected [{}]",
                stored_names.join(", "),
                feature_names().join(", ")
            )));
        }

        info!("Loaded estimation context ({}) from {:?}", model.name(), store.dir());
        Self::new(scaler, model)
    }

    /// Build from in-memory parts
    pub fn new(scaler: FittedScaler, model: TrainedModel) -> Result<Self> {
        if scaler.n_features() != NUM_FEATURES {
            return Err(PipelineError::FeatureMismatch {
                expected: NUM_FEATURES,
                actual: scaler.n_features(),
            });
        }
        if !model.is_fitted() {
            return Err(PipelineError::Model(format!("{} is not fitted", model.name())));
        }
        Ok(Self { scaler, model })
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Scaled model input for a query
    pub fn feature_vector(&self, query: &OvertakeQuery) -> Result<Vec<f64>> {
        validate_query(query)?;
        let raw = RelativeFeatureEncoder::query_features(query).to_vec();
        self.scaler.transform_row(&raw)
    }

    /// Overtake probability in [0, 100] with its band
    pub fn estimate(&self, query: &OvertakeQuery) -> Result<OvertakeEstimate> {
        let scaled = self.feature_vector(query)?;
        let x = Array2::from_shape_vec((1, scaled.len()), scaled)?;

        let proba = self.model.predict_proba(&x)?;
        let probability = (proba[0] * 100.0).clamp(0.0, 100.0);
        let features = RelativeFeatureEncoder::query_features(query);

        Ok(OvertakeEstimate {
            probability,
            band: ProbabilityBand::from_percent(probability),
            delta_pace: features.delta_pace,
            delta_tire_age: features.delta_tire_age as i64,
            compound_advantage: features.compound_advantage as i32,
        })
    }
}

/// Validate an estimation query
pub fn validate_query(query: &OvertakeQuery) -> Result<()> {
    if query.attacker.standing < 2 {
        return Err(PipelineError::InvalidQuery(format!(
            "attacker standing must be at least 2 (someone must be ahead), got {}",
            query.attacker.standing
        )));
    }
    for (side, pace) in [("attacker", query.attacker.pace), ("defender", query.defender.pace)] {
        if !(pace.is_finite() && pace > 0.0) {
            return Err(PipelineError::InvalidQuery(format!(
                "{} pace must be a positive number of seconds, got {}",
                side, pace
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttackerState, Compound, DefenderState};
    use crate::pipeline::FEATURE_NAMES;
    use crate::training::LogisticClassifier;
    use ndarray::{Array1, Axis};

    fn query(attacker_pace: f64, defender_pace: f64) -> OvertakeQuery {
        OvertakeQuery {
            attacker: AttackerState {
                standing: 5,
                pace: attacker_pace,
                tire_age: 12,
                compound: Compound::Medium,
            },
            defender: DefenderState {
                pace: defender_pace,
                tire_age: 25,
                compound: Compound::Hard,
            },
        }
    }

    /// Model where a faster attacker (negative pace delta) overtakes
    fn fitted_context() -> EstimationContext {
        let rows: Vec<[f64; NUM_FEATURES]> = (0..20)
            .map(|i| {
                let delta = -1.0 + i as f64 * 0.1;
                [5.0, delta, 0.0, 0.0, 85.0 + delta, 10.0 + (i % 3) as f64]
            })
            .collect();
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let x = Array2::from_shape_vec((rows.len(), NUM_FEATURES), flat).unwrap();
        let y: Array1<u8> = x.axis_iter(Axis(0)).map(|r| u8::from(r[1] < 0.0)).collect();

        let scaler = FittedScaler::fit(&x, &feature_names()).unwrap();
        let mut model = TrainedModel::Logistic(LogisticClassifier::new("lr", 0.1));
        model.fit(&scaler.transform(&x).unwrap(), &y).unwrap();

        EstimationContext::new(scaler, model).unwrap()
    }

    #[test]
    fn test_estimate_direction() {
        let ctx = fitted_context();

        let fast = ctx.estimate(&query(84.2, 85.0)).unwrap();
        let slow = ctx.estimate(&query(85.8, 85.0)).unwrap();

        assert!((0.0..=100.0).contains(&fast.probability));
        assert!(fast.probability > slow.probability);
        assert!((fast.delta_pace + 0.8).abs() < 1e-9);
        assert_eq!(fast.delta_tire_age, -13);
        assert_eq!(fast.compound_advantage, 1);
        assert_eq!(fast.band, ProbabilityBand::from_percent(fast.probability));
    }

    #[test]
    fn test_feature_vector_is_deterministic() {
        let ctx = fitted_context();
        let a = ctx.feature_vector(&query(84.5, 85.2)).unwrap();
        let b = ctx.feature_vector(&query(84.5, 85.2)).unwrap();
        assert_eq!(a.len(), FEATURE_NAMES.len());
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_query() {
        let ctx = fitted_context();
        let mut q = query(84.5, 85.2);
        q.attacker.standing = 1;
        assert!(matches!(
            ctx.estimate(&q).unwrap_err(),
            PipelineError::InvalidQuery(_)
        ));

        assert!(validate_query(&query(-1.0, 85.0)).is_err());
        assert!(validate_query(&query(84.0, f64::NAN)).is_err());
        assert!(validate_query(&query(84.0, 85.0)).is_ok());
    }

    #[test]
    fn test_load_without_artifacts_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let err = EstimationContext::load(dir.path()).err().unwrap();
        assert!(err.is_not_ready());
        assert!(err.to_string().contains("run training first"));
    }

    #[test]
    fn test_unfitted_model_rejected() {
        let x = Array2::<f64>::zeros((2, NUM_FEATURES));
        let scaler = FittedScaler::fit(&x, &feature_names()).unwrap();
        let model = TrainedModel::Logistic(LogisticClassifier::new("lr", 1.0));
        assert!(EstimationContext::new(scaler, model).is_err());
    }
}
