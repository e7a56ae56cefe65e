//! # stagekit Core
//!
//! Core types and utilities shared by the stagekit crates.
//! Provides positions, coordinate modes, axis limits, the driver lifecycle
//! state, step conversion, and the unified error type.

pub mod data;
pub mod error;
pub mod units;

pub use data::{
    is_idle_state, Axis, AxisLimits, CoordinateMode, DeviceState, LineTerminator, PartialPosition,
    Position, StatusSnapshot, StepLimits, IDLE_STATE,
};

pub use error::{Result, StageError};

pub use units::{StepConvention, StepConversion};
