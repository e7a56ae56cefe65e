//! Data models for positions, coordinate modes, and controller status
//!
//! This module provides:
//! - Three-axis positions in millimeters (machine and work frames)
//! - Partial position updates that leave missing axes untouched
//! - G-code coordinate mode tracking
//! - Axis limits used for range reporting
//! - The driver lifecycle state machine
//! - Status snapshots decoded from controller replies

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis (focus drive)
    Z,
}

impl Axis {
    /// All axes in wire order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// G-code word letter for this axis
    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    /// Zero-based index, also the controller's motor/axis number minus one
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Position in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a new position with X, Y, Z coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Read one coordinate
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Overwrite one coordinate
    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }

    /// Apply a partial update; axes absent from `update` keep their value
    pub fn apply(&mut self, update: &PartialPosition) {
        if let Some(x) = update.x {
            self.x = x;
        }
        if let Some(y) = update.y {
            self.y = y;
        }
        if let Some(z) = update.z {
            self.z = z;
        }
    }

    /// Calculate distance to another position (XYZ)
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Partial position with only the axes a reply actually carried
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartialPosition {
    /// X-axis position (if present)
    pub x: Option<f64>,
    /// Y-axis position (if present)
    pub y: Option<f64>,
    /// Z-axis position (if present)
    pub z: Option<f64>,
}

impl PartialPosition {
    /// Set one coordinate
    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = Some(value),
            Axis::Y => self.y = Some(value),
            Axis::Z => self.z = Some(value),
        }
    }

    /// True when no axis was decoded
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none()
    }
}

impl From<Position> for PartialPosition {
    fn from(pos: Position) -> Self {
        Self {
            x: Some(pos.x),
            y: Some(pos.y),
            z: Some(pos.z),
        }
    }
}

/// G-code distance mode last put into effect on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateMode {
    /// G90, coordinates are absolute
    Absolute,
    /// G91, coordinates are offsets from the current position
    Relative,
    /// A homing cycle ran last; the next move must re-assert its mode
    Homing,
}

impl CoordinateMode {
    /// Command that puts the controller into this mode
    pub fn switch_command(&self) -> Option<&'static str> {
        match self {
            CoordinateMode::Absolute => Some("G90"),
            CoordinateMode::Relative => Some("G91"),
            CoordinateMode::Homing => None,
        }
    }
}

impl fmt::Display for CoordinateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateMode::Absolute => write!(f, "absolute"),
            CoordinateMode::Relative => write!(f, "relative"),
            CoordinateMode::Homing => write!(f, "homing"),
        }
    }
}

/// Line terminator appended to outgoing commands and expected on replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTerminator {
    /// Carriage return + line feed (TinyG text mode)
    CrLf,
    /// Line feed only (Grbl)
    Lf,
}

impl LineTerminator {
    /// Terminator bytes as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::CrLf => "\r\n",
            LineTerminator::Lf => "\n",
        }
    }
}

impl fmt::Display for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineTerminator::CrLf => write!(f, "crlf"),
            LineTerminator::Lf => write!(f, "lf"),
        }
    }
}

/// Travel range of one axis, in micrometers
///
/// Only reported to the host; the controller enforces its own limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    /// Lower bound in micrometers
    pub min_um: f64,
    /// Upper bound in micrometers
    pub max_um: f64,
}

impl AxisLimits {
    /// Create limits from micrometer bounds
    pub fn new(min_um: f64, max_um: f64) -> Self {
        Self { min_um, max_um }
    }

    /// Check whether a position lies inside the range
    pub fn contains_um(&self, um: f64) -> bool {
        um >= self.min_um && um <= self.max_um
    }
}

impl Default for AxisLimits {
    fn default() -> Self {
        Self {
            min_um: 0.0,
            max_um: 20000.0,
        }
    }
}

/// Travel range of one axis, in steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLimits {
    /// Lower bound in steps
    pub min: i64,
    /// Upper bound in steps
    pub max: i64,
}

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Created or shut down; no port selected
    Uninitialized,
    /// A port has been selected but the controller was not probed yet
    PortConfigured,
    /// Firmware identity and parameters fetched; motion allowed
    Ready,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Uninitialized => write!(f, "Uninitialized"),
            DeviceState::PortConfigured => write!(f, "PortConfigured"),
            DeviceState::Ready => write!(f, "Ready"),
        }
    }
}

/// Machine state label meaning "not moving"
pub const IDLE_STATE: &str = "Idle";

/// Check if a controller state label means the machine is idle
///
/// Grbl reports `Idle`; TinyG's verbose report uses `Ready`, `Stop` or
/// `End` for its quiescent states. Matching ignores ASCII case.
pub fn is_idle_state(state: &str) -> bool {
    let trimmed = state.trim();
    trimmed.eq_ignore_ascii_case(IDLE_STATE)
        || trimmed.eq_ignore_ascii_case("Ready")
        || trimmed.eq_ignore_ascii_case("Stop")
        || trimmed.eq_ignore_ascii_case("End")
}

/// Decoded controller status
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Machine position (controller frame)
    pub machine_position: Position,
    /// Work position (offset frame)
    pub work_position: Position,
    /// Raw machine state label (Idle, Run, Hold, ...)
    pub state: String,
}

impl StatusSnapshot {
    /// Check whether the snapshot reports an idle machine
    pub fn is_idle(&self) -> bool {
        is_idle_state(&self.state)
    }
}
