use serde::{Deserialize, Serialize};
use std::fmt;

/// Tire compound, ordered by expected grip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    Unknown,
}

impl Compound {
    /// Parse compound text as reported by the timing feed (case-insensitive)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "SOFT" => Compound::Soft,
            "MEDIUM" => Compound::Medium,
            "HARD" => Compound::Hard,
            "INTERMEDIATE" => Compound::Intermediate,
            "WET" => Compound::Wet,
            _ => Compound::Unknown,
        }
    }

    /// Ordinal grip rank used by the compound advantage feature
    pub fn rank(self) -> i32 {
        match self {
            Compound::Soft => 3,
            Compound::Medium => 2,
            Compound::Hard => 1,
            _ => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
            Compound::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One competitor's state during one scored interval (lap)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub session: String,
    pub competitor: String,
    pub interval: u32,
    /// 1 = leading
    pub standing: u32,
    /// Lap time in seconds
    pub pace: f64,
    /// Intervals completed on the current set of tires
    pub tire_age: u32,
    pub compound: Compound,
}

/// Attacker/defender comparison at one interval, with its overtake label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelativePair {
    pub session: String,
    pub interval: u32,
    pub attacker: String,
    pub defender: String,
    pub attacker_standing: u32,
    pub attacker_pace: f64,
    pub attacker_tire_age: u32,
    pub attacker_compound: Compound,
    pub defender_pace: f64,
    pub defender_tire_age: u32,
    pub defender_compound: Compound,
    /// Attacker minus defender; negative = attacker faster
    pub delta_pace: f64,
    /// Attacker minus defender; negative = attacker on fresher tires
    pub delta_tire_age: i64,
    /// Attacker rank minus defender rank; positive favors the attacker
    pub compound_advantage: i32,
    /// Proxy derived from the pace delta, not a measured spacing
    pub estimated_gap: f64,
    /// 1 if the attacker improved its standing on the next interval
    pub overtook: u8,
}

/// Attacker side of an estimation query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackerState {
    pub standing: u32,
    pub pace: f64,
    pub tire_age: u32,
    pub compound: Compound,
}

/// Defender side of an estimation query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenderState {
    pub pace: f64,
    pub tire_age: u32,
    pub compound: Compound,
}

/// Overtake estimation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvertakeQuery {
    pub attacker: AttackerState,
    pub defender: DefenderState,
}

/// Coarse reading of an overtake probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityBand {
    High,
    Uncertain,
    Low,
}

impl ProbabilityBand {
    /// Band for a probability expressed in percent
    pub fn from_percent(probability: f64) -> Self {
        if probability > 60.0 {
            ProbabilityBand::High
        } else if probability > 40.0 {
            ProbabilityBand::Uncertain
        } else {
            ProbabilityBand::Low
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProbabilityBand::High => "HIGH PROBABILITY",
            ProbabilityBand::Uncertain => "UNCERTAIN",
            ProbabilityBand::Low => "LOW PROBABILITY",
        }
    }
}

/// Overtake estimation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OvertakeEstimate {
    /// Estimated overtake probability in [0, 100]
    pub probability: f64,
    pub band: ProbabilityBand,
    pub delta_pace: f64,
    pub delta_tire_age: i64,
    pub compound_advantage: i32,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
