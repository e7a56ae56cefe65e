//! Firmware dialects
//!
//! Supported controllers:
//! - Grbl: compact `<State,MPos:..,WPos:..>` status, `$H` homing, steps/mm parameters
//! - TinyG: verbose `$sr` text report, `G28.2` homing, per-motor step geometry

pub mod codec;
pub mod probe;
pub mod settings;
pub mod status_parser;

pub use codec::{CommandLine, MoveCommand, Payload, ReplyShape, TimeoutClass};
pub use probe::FirmwareIdentity;
pub use settings::{FirmwareParameter, ParameterTable};
pub use status_parser::{ParsedStatus, StatusParser};

use serde::{Deserialize, Serialize};
use stagekit_core::{LineTerminator, StepConvention};
use stagekit_settings::FirmwareSelection;
use std::fmt;

/// Supported controller types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerType {
    /// Grbl
    Grbl,
    /// TinyG (text mode)
    TinyG,
}

/// Status report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusDialect {
    /// Multi-line `Label: value unit` report
    Verbose,
    /// Single bracketed `<State,MPos:..,WPos:..>` report
    Compact,
}

impl ControllerType {
    /// Get controller name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Grbl => "Grbl",
            Self::TinyG => "TinyG",
        }
    }

    /// Controller forced by the configuration, if any
    pub fn from_selection(selection: FirmwareSelection) -> Option<Self> {
        match selection {
            FirmwareSelection::Auto => None,
            FirmwareSelection::Grbl => Some(Self::Grbl),
            FirmwareSelection::TinyG => Some(Self::TinyG),
        }
    }

    /// Status report format this controller answers with
    pub fn status_dialect(&self) -> StatusDialect {
        match self {
            Self::Grbl => StatusDialect::Compact,
            Self::TinyG => StatusDialect::Verbose,
        }
    }

    /// Line terminator used when the configuration does not force one
    pub fn default_terminator(&self) -> LineTerminator {
        match self {
            Self::Grbl => LineTerminator::Lf,
            Self::TinyG => LineTerminator::CrLf,
        }
    }

    /// Convention the parameter dump reports step factors in
    pub fn step_convention(&self) -> StepConvention {
        match self {
            Self::Grbl => StepConvention::StepsPerMm,
            Self::TinyG => StepConvention::StepSizeUm,
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
