use crate::grid::{PatchOverflow, SampleMiss};
use crate::patch::Species;
use crate::topology::Direction;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Why a run stopped before producing a trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// Any other internal inconsistency.
    GeneralFailure { reason: String },
    /// `max_time` too short for a single record.
    SmallMaxtime { max_time: f64, record_interval: f64 },
    /// A migration weight exponent exceeded the finite range.
    ///
    /// `exponent` is clamped to a finite value so the failure survives JSON.
    Overflow {
        patch: usize,
        species: Species,
        direction: Direction,
        exponent: f64,
    },
}

impl RunFailure {
    /// Numeric status code: 1 general failure, 2 max time too small, 3 overflow.
    pub fn code(&self) -> u8 {
        match self {
            RunFailure::GeneralFailure { .. } => 1,
            RunFailure::SmallMaxtime { .. } => 2,
            RunFailure::Overflow { .. } => 3,
        }
    }

    pub fn general(reason: impl Into<String>) -> Self {
        RunFailure::GeneralFailure {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::GeneralFailure { reason } => write!(f, "simulation failed: {reason}"),
            RunFailure::SmallMaxtime {
                max_time,
                record_interval,
            } => write!(
                f,
                "max_time {max_time} is too small for record interval {record_interval}"
            ),
            RunFailure::Overflow {
                patch,
                species,
                direction,
                exponent,
            } => write!(
                f,
                "migration weight overflow at patch {patch}: species {species} direction {direction:?}, exponent {exponent}; lower the selection strength"
            ),
        }
    }
}

impl Error for RunFailure {}

impl From<PatchOverflow> for RunFailure {
    fn from(overflow: PatchOverflow) -> Self {
        RunFailure::Overflow {
            patch: overflow.patch,
            species: overflow.cause.species,
            direction: overflow.cause.direction,
            exponent: finite_exponent(overflow.cause.exponent),
        }
    }
}

/// Infinite exponents saturate at the `f64` range; NaN reads as positive overflow.
fn finite_exponent(exponent: f64) -> f64 {
    if exponent.is_nan() {
        f64::MAX
    } else {
        exponent.clamp(f64::MIN, f64::MAX)
    }
}

impl From<SampleMiss> for RunFailure {
    fn from(miss: SampleMiss) -> Self {
        RunFailure::general(miss.to_string())
    }
}

/// Terminal status of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed { failure: RunFailure },
}

impl RunOutcome {
    /// 0 on success, otherwise [`RunFailure::code`].
    pub fn code(&self) -> u8 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Failed { failure } => failure.code(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            RunOutcome::Completed => None,
            RunOutcome::Failed { failure } => Some(failure),
        }
    }
}

impl From<RunFailure> for RunOutcome {
    fn from(failure: RunFailure) -> Self {
        RunOutcome::Failed { failure }
    }
}
