//! Command codec
//!
//! Renders every outgoing command together with the timeout class and the
//! reply shape the engine uses to collect its answer.

use crate::firmware::{ControllerType, StatusDialect};
use stagekit_core::CoordinateMode;
use std::fmt;

/// Ctrl-X soft reset
pub const RESET_BYTE: u8 = 0x18;

/// Realtime feed hold
pub const FEED_HOLD_BYTE: u8 = b'!';

/// Fractional digits written for move coordinates, in millimeters
pub const COORDINATE_PRECISION: usize = 6;

/// Answer timeout class of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutClass {
    /// Raw passthrough
    Normal,
    /// Status query
    Status,
    /// `$` query or configuration line
    Config,
    /// Long-running command (homing)
    Extended,
    /// Linear move or mode switch
    Move,
    /// Soft reset: settle delay, then a long read
    Reset,
    /// Realtime byte, no reply read
    Realtime,
}

impl fmt::Display for TimeoutClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Status => "status",
            Self::Config => "config",
            Self::Extended => "extended",
            Self::Move => "move",
            Self::Reset => "reset",
            Self::Realtime => "realtime",
        };
        write!(f, "{}", name)
    }
}

/// How the reply to a command is collected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// One terminated line
    Line,
    /// Lines until the controller goes quiet or acknowledges
    UntilQuiet,
    /// Nothing is read
    NoReply,
}

/// Bytes put on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text line, terminated by the transport
    Line(String),
    /// Single unterminated byte
    Byte(u8),
}

/// A command ready for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// What is written
    pub payload: Payload,
    /// Answer timeout class
    pub class: TimeoutClass,
    /// How the reply is read
    pub reply: ReplyShape,
}

impl CommandLine {
    /// Text command answered with a single line
    pub fn line(text: impl Into<String>, class: TimeoutClass) -> Self {
        Self {
            payload: Payload::Line(text.into()),
            class,
            reply: ReplyShape::Line,
        }
    }

    /// Text command answered with several lines
    pub fn multi_line(text: impl Into<String>, class: TimeoutClass) -> Self {
        Self {
            payload: Payload::Line(text.into()),
            class,
            reply: ReplyShape::UntilQuiet,
        }
    }

    /// Single control byte
    pub fn byte(byte: u8, class: TimeoutClass, reply: ReplyShape) -> Self {
        Self {
            payload: Payload::Byte(byte),
            class,
            reply,
        }
    }

    /// Text form for logging and comparison
    pub fn text(&self) -> String {
        match &self.payload {
            Payload::Line(text) => text.clone(),
            Payload::Byte(byte) => format!("0x{:02X}", byte),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// A linear move and the coordinate mode it must run in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCommand {
    /// Mode the controller has to be in before `command` is sent
    pub mode: CoordinateMode,
    /// The `G0` line
    pub command: CommandLine,
}

/// Format a millimeter coordinate for a G-code word
pub fn format_coordinate(mm: f64) -> String {
    let value = if mm == 0.0 { 0.0 } else { mm };
    format!("{:.*}", COORDINATE_PRECISION, value)
}

fn mode_for(absolute: bool) -> CoordinateMode {
    if absolute {
        CoordinateMode::Absolute
    } else {
        CoordinateMode::Relative
    }
}

/// Linear XY move, in millimeters
pub fn build_move(x_mm: f64, y_mm: f64, absolute: bool) -> MoveCommand {
    MoveCommand {
        mode: mode_for(absolute),
        command: CommandLine::line(
            format!(
                "G0 X{} Y{}",
                format_coordinate(x_mm),
                format_coordinate(y_mm)
            ),
            TimeoutClass::Move,
        ),
    }
}

/// Linear Z move, in millimeters
pub fn build_move_z(z_mm: f64, absolute: bool) -> MoveCommand {
    MoveCommand {
        mode: mode_for(absolute),
        command: CommandLine::line(
            format!("G0 Z{}", format_coordinate(z_mm)),
            TimeoutClass::Move,
        ),
    }
}

/// `G90`/`G91`; `None` for [`CoordinateMode::Homing`]
pub fn build_mode_switch(mode: CoordinateMode) -> Option<CommandLine> {
    mode.switch_command()
        .map(|text| CommandLine::line(text, TimeoutClass::Move))
}

/// Homing cycle
pub fn build_home(controller: ControllerType) -> CommandLine {
    let text = match controller {
        ControllerType::Grbl => "$H",
        ControllerType::TinyG => "G28.2 X0 Y0",
    };
    CommandLine::line(text, TimeoutClass::Extended)
}

/// Status request in the controller's dialect
pub fn build_status_query(controller: ControllerType) -> CommandLine {
    build_dialect_query(controller.status_dialect())
}

/// Status request for a given report format
pub fn build_dialect_query(dialect: StatusDialect) -> CommandLine {
    match dialect {
        StatusDialect::Compact => CommandLine::line("?", TimeoutClass::Status),
        StatusDialect::Verbose => CommandLine::multi_line("$sr", TimeoutClass::Status),
    }
}

/// Full parameter dump
pub fn build_parameter_query() -> CommandLine {
    CommandLine::multi_line("$$", TimeoutClass::Config)
}

/// Store one parameter
pub fn build_parameter_set(key: &str, value: &str) -> CommandLine {
    CommandLine::line(
        format!("${}={}", key.trim_start_matches('$'), value),
        TimeoutClass::Config,
    )
}

/// Configure the sync pulse step on an axis
pub fn build_sync_set(axis: u8, value: f64) -> CommandLine {
    CommandLine::line(format!("M108P{}Q{}", value, axis), TimeoutClass::Config)
}

/// Firmware identity query
pub fn build_version_query(controller: ControllerType) -> CommandLine {
    let text = match controller {
        ControllerType::Grbl => "$I",
        ControllerType::TinyG => "$fv",
    };
    CommandLine::multi_line(text, TimeoutClass::Config)
}

/// Soft reset
pub fn build_reset() -> CommandLine {
    CommandLine::byte(RESET_BYTE, TimeoutClass::Reset, ReplyShape::Line)
}

/// Feed hold; stops motion without waiting for a reply
pub fn build_feed_hold() -> CommandLine {
    CommandLine::byte(FEED_HOLD_BYTE, TimeoutClass::Realtime, ReplyShape::NoReply)
}

/// Raw passthrough
pub fn build_raw(text: &str) -> CommandLine {
    CommandLine::line(text.trim(), TimeoutClass::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_formatting() {
        let mv = build_move(1.5, -0.004, true);
        assert_eq!(mv.mode, CoordinateMode::Absolute);
        assert_eq!(mv.command.text(), "G0 X1.500000 Y-0.004000");
        assert_eq!(mv.command.class, TimeoutClass::Move);
    }

    #[test]
    fn test_negative_zero_is_not_written() {
        assert_eq!(format_coordinate(-0.0), "0.000000");
    }

    #[test]
    fn test_dialect_specific_commands() {
        assert_eq!(build_home(ControllerType::Grbl).text(), "$H");
        assert_eq!(build_home(ControllerType::TinyG).text(), "G28.2 X0 Y0");
        assert_eq!(
            build_home(ControllerType::TinyG).class,
            TimeoutClass::Extended
        );
        assert_eq!(
            build_status_query(ControllerType::TinyG).reply,
            ReplyShape::UntilQuiet
        );
        assert_eq!(build_version_query(ControllerType::TinyG).text(), "$fv");
    }

    #[test]
    fn test_configuration_lines() {
        assert_eq!(build_parameter_set("100", "250.0").text(), "$100=250.0");
        assert_eq!(build_parameter_set("$1sa", "1.8").text(), "$1sa=1.8");
        assert_eq!(build_sync_set(0, 2.5).text(), "M108P2.5Q0");
        assert_eq!(build_sync_set(1, 1.0).text(), "M108P1Q1");
    }

    #[test]
    fn test_control_bytes() {
        let reset = build_reset();
        assert_eq!(reset.payload, Payload::Byte(0x18));
        assert_eq!(reset.class, TimeoutClass::Reset);

        let hold = build_feed_hold();
        assert_eq!(hold.reply, ReplyShape::NoReply);
        assert_eq!(hold.text(), "0x21");
    }
}
