//! Relative Feature Encoder
//!
//! Turns an attacker/defender pair into duel features and the overtake label.
//! The same formulas serve training pairs and live estimation queries, so the
//! feature vector a model sees at inference time is computed exactly as it
//! was during training.

use serde::{Deserialize, Serialize};

use crate::models::{Compound, LapRecord, OvertakeQuery, RelativePair};
use crate::pipeline::pairing::CandidatePair;

/// Number of model input features
pub const NUM_FEATURES: usize = 6;

/// Model feature columns, in matrix order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "attacker_standing",
    "delta_pace",
    "delta_tire_age",
    "compound_advantage",
    "attacker_pace",
    "attacker_tire_age",
];

/// Feature column names as owned strings
pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Model input features for one duel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativeFeatures {
    pub attacker_standing: f64,
    pub delta_pace: f64,
    pub delta_tire_age: f64,
    pub compound_advantage: f64,
    pub attacker_pace: f64,
    pub attacker_tire_age: f64,
}

impl RelativeFeatures {
    /// Convert to a flat vector in [`FEATURE_NAMES`] order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.attacker_standing,
            self.delta_pace,
            self.delta_tire_age,
            self.compound_advantage,
            self.attacker_pace,
            self.attacker_tire_age,
        ]
    }
}

/// Attacker pace minus defender pace (negative = attacker faster)
pub fn delta_pace(attacker_pace: f64, defender_pace: f64) -> f64 {
    attacker_pace - defender_pace
}

/// Attacker tire age minus defender tire age (negative = attacker fresher)
pub fn delta_tire_age(attacker_age: u32, defender_age: u32) -> i64 {
    attacker_age as i64 - defender_age as i64
}

/// Attacker compound rank minus defender compound rank
pub fn compound_advantage(attacker: Compound, defender: Compound) -> i32 {
    attacker.rank() - defender.rank()
}

/// Monotone gap proxy: |delta pace| * factor
///
/// This is an approximation derived from lap times, not a measured spacing
/// between the two cars.
pub fn estimated_gap(delta_pace: f64, gap_factor: f64) -> f64 {
    delta_pace.abs() * gap_factor
}

/// Relative feature encoder
#[derive(Debug, Clone)]
pub struct RelativeFeatureEncoder {
    gap_factor: f64,
}

impl RelativeFeatureEncoder {
    pub fn new(gap_factor: f64) -> Self {
        Self { gap_factor }
    }

    /// Encode a candidate pair with the attacker's next-interval record
    ///
    /// Returns `None` (discard) when the next record is absent or is not the
    /// same competitor in the same session at exactly interval + 1. Such a
    /// pair is never labeled.
    pub fn encode(&self, pair: CandidatePair<'_>, next: Option<&LapRecord>) -> Option<RelativePair> {
        let attacker = pair.attacker;
        let defender = pair.defender;
        let next = next?;

        let expected_interval = attacker.interval.checked_add(1)?;
        if next.session != attacker.session
            || next.competitor != attacker.competitor
            || next.interval != expected_interval
        {
            return None;
        }

        let delta = delta_pace(attacker.pace, defender.pace);

        Some(RelativePair {
            session: attacker.session.clone(),
            interval: attacker.interval,
            attacker: attacker.competitor.clone(),
            defender: defender.competitor.clone(),
            attacker_standing: attacker.standing,
            attacker_pace: attacker.pace,
            attacker_tire_age: attacker.tire_age,
            attacker_compound: attacker.compound,
            defender_pace: defender.pace,
            defender_tire_age: defender.tire_age,
            defender_compound: defender.compound,
            delta_pace: delta,
            delta_tire_age: delta_tire_age(attacker.tire_age, defender.tire_age),
            compound_advantage: compound_advantage(attacker.compound, defender.compound),
            estimated_gap: estimated_gap(delta, self.gap_factor),
            overtook: u8::from(next.standing < attacker.standing),
        })
    }

    /// Model features of a labeled pair
    pub fn features(pair: &RelativePair) -> RelativeFeatures {
        RelativeFeatures {
            attacker_standing: pair.attacker_standing as f64,
            delta_pace: pair.delta_pace,
            delta_tire_age: pair.delta_tire_age as f64,
            compound_advantage: pair.compound_advantage as f64,
            attacker_pace: pair.attacker_pace,
            attacker_tire_age: pair.attacker_tire_age as f64,
        }
    }

    /// Model features of a live estimation query
    pub fn query_features(query: &OvertakeQuery) -> RelativeFeatures {
        let attacker = &query.attacker;
        let defender = &query.defender;

        RelativeFeatures {
            attacker_standing: attacker.standing as f64,
            delta_pace: delta_pace(attacker.pace, defender.pace),
            delta_tire_age: delta_tire_age(attacker.tire_age, defender.tire_age) as f64,
            compound_advantage: compound_advantage(attacker.compound, defender.compound) as f64,
            attacker_pace: attacker.pace,
            attacker_tire_age: attacker.tire_age as f64,
        }
    }
}

impl Default for RelativeFeatureEncoder {
    fn default() -> Self {
        Self::new(0.5)
    }
}
