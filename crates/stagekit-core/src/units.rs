//! Step/distance conversion
//!
//! Controllers report their step factor in one of two conventions:
//! Grbl dumps steps per millimeter (`$100=250.000`), TinyG describes each
//! motor so that the travel per step can be derived. Both are folded into
//! a single [`StepConversion`] chosen once at initialization.

use crate::data::Axis;
use crate::error::{Result, StageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which convention the per-axis factors are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StepConvention {
    /// Factor is motor steps per millimeter
    StepsPerMm,
    /// Factor is micrometers travelled per step
    StepSizeUm,
}

impl fmt::Display for StepConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepsPerMm => write!(f, "steps/mm"),
            Self::StepSizeUm => write!(f, "um/step"),
        }
    }
}

/// Per-axis step factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepConversion {
    convention: StepConvention,
    factors: [f64; 3],
}

impl StepConversion {
    /// Build from steps-per-millimeter factors (X, Y, Z)
    pub fn steps_per_mm(x: f64, y: f64, z: f64) -> Result<Self> {
        Self::new(StepConvention::StepsPerMm, [x, y, z])
    }

    /// Build from micrometer-per-step factors (X, Y, Z)
    pub fn step_size_um(x: f64, y: f64, z: f64) -> Result<Self> {
        Self::new(StepConvention::StepSizeUm, [x, y, z])
    }

    fn new(convention: StepConvention, factors: [f64; 3]) -> Result<Self> {
        for axis in Axis::ALL {
            let value = factors[axis.index()];
            if !value.is_finite() || value <= 0.0 {
                return Err(StageError::InvalidStepFactor {
                    axis: axis.to_string(),
                    value,
                });
            }
        }
        Ok(Self {
            convention,
            factors,
        })
    }

    /// Convention the factors were reported in
    pub fn convention(&self) -> StepConvention {
        self.convention
    }

    /// Raw factor for an axis, in the reported convention
    pub fn factor(&self, axis: Axis) -> f64 {
        self.factors[axis.index()]
    }

    /// Distance travelled by one step, in micrometers
    pub fn step_size_um_for(&self, axis: Axis) -> f64 {
        let factor = self.factor(axis);
        match self.convention {
            StepConvention::StepsPerMm => 1000.0 / factor,
            StepConvention::StepSizeUm => factor,
        }
    }

    /// Convert a step count to micrometers
    pub fn steps_to_um(&self, axis: Axis, steps: i64) -> f64 {
        steps as f64 * self.step_size_um_for(axis)
    }

    /// Convert micrometers to the nearest whole step count
    pub fn um_to_steps(&self, axis: Axis, um: f64) -> i64 {
        (um / self.step_size_um_for(axis)).round() as i64
    }

    /// Convert a millimeter position to the nearest whole step count
    pub fn mm_to_steps(&self, axis: Axis, mm: f64) -> i64 {
        self.um_to_steps(axis, mm * 1000.0)
    }
}
