//! Asset fault model
//!
//! Fault injection is a pure function of the current mode and one uniform
//! random draw, so a seeded RNG reproduces every transition.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operating mode of one simulated asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultMode {
    #[default]
    Nominal,
    Degrading,
    Faulted,
}

impl FaultMode {
    /// Drift accumulates in every mode except nominal.
    pub fn accumulates_drift(self) -> bool {
        !matches!(self, FaultMode::Nominal)
    }
}

impl std::fmt::Display for FaultMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultMode::Nominal => write!(f, "nominal"),
            FaultMode::Degrading => write!(f, "degrading"),
            FaultMode::Faulted => write!(f, "faulted"),
        }
    }
}

impl FromStr for FaultMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nominal" => Ok(FaultMode::Nominal),
            "degrading" => Ok(FaultMode::Degrading),
            "faulted" => Ok(FaultMode::Faulted),
            other => Err(format!(
                "unknown fault mode '{other}' (expected nominal, degrading or faulted)"
            )),
        }
    }
}

/// Next mode given a uniform draw in `[0, 1)`.
///
/// - nominal → degrading with `failure_p`
/// - degrading → faulted with `failure_p`
/// - faulted → nominal with `recovery_p`
pub fn next_mode(current: FaultMode, draw: f64, failure_p: f64, recovery_p: f64) -> FaultMode {
    match current {
        FaultMode::Nominal if draw < failure_p => FaultMode::Degrading,
        FaultMode::Degrading if draw < failure_p => FaultMode::Faulted,
        FaultMode::Faulted if draw < recovery_p => FaultMode::Nominal,
        other => other,
    }
}
