//! Device properties
//!
//! The host addresses device settings by name. Names map onto
//! [`StageProperty`] variants; [`StageDevice`](crate::stage::StageDevice)
//! dispatches reads and writes on the variant.

use stagekit_core::{Result, StageError};
use std::fmt;
use std::str::FromStr;

/// Value the `Command` property takes when its command failed
pub const COMMAND_ERROR_VALUE: &str = "Error!";

/// Named device property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageProperty {
    /// Serial port the controller is attached to
    Port,
    /// Firmware version (read-only)
    Version,
    /// Last machine state label (read-only)
    Status,
    /// X step size in micrometers (read-only)
    StepSizeXUm,
    /// Y step size in micrometers (read-only)
    StepSizeYUm,
    /// Velocity used by the busy estimate, in mm/s
    MaxVelocity,
    /// Acceleration, in mm/s^2
    Acceleration,
    /// Move acknowledgment timeout, in milliseconds
    MoveTimeoutMs,
    /// Sync pulse step
    SyncStep,
    /// Raw command; reads back the controller's reply
    Command,
}

impl StageProperty {
    /// Every property, in display order
    pub const ALL: [StageProperty; 10] = [
        StageProperty::Port,
        StageProperty::Version,
        StageProperty::Status,
        StageProperty::StepSizeXUm,
        StageProperty::StepSizeYUm,
        StageProperty::MaxVelocity,
        StageProperty::Acceleration,
        StageProperty::MoveTimeoutMs,
        StageProperty::SyncStep,
        StageProperty::Command,
    ];

    /// Host-facing name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Port => "Port",
            Self::Version => "Version",
            Self::Status => "Status",
            Self::StepSizeXUm => "StepSizeXUm",
            Self::StepSizeYUm => "StepSizeYUm",
            Self::MaxVelocity => "MaxVelocity",
            Self::Acceleration => "Acceleration",
            Self::MoveTimeoutMs => "MoveTimeoutMs",
            Self::SyncStep => "SyncStep",
            Self::Command => "Command",
        }
    }

    /// Whether the host may write the property
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::Version | Self::Status | Self::StepSizeXUm | Self::StepSizeYUm
        )
    }
}

impl fmt::Display for StageProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for StageProperty {
    type Err = StageError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|property| property.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| StageError::UnknownProperty {
                name: name.to_string(),
            })
    }
}

/// Parse a numeric property value
pub fn parse_number(property: StageProperty, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| StageError::InvalidPropertyValue {
            name: property.name().to_string(),
            value: value.to_string(),
        })
}

/// Parse a strictly positive numeric property value
pub fn parse_positive(property: StageProperty, value: &str) -> Result<f64> {
    let number = parse_number(property, value)?;
    if number <= 0.0 {
        return Err(StageError::InvalidPropertyValue {
            name: property.name().to_string(),
            value: value.to_string(),
        });
    }
    Ok(number)
}
