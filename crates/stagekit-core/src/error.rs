//! Error handling for stagekit
//!
//! Every fallible operation of the driver returns [`StageError`]:
//! - Transport errors (port missing, write failure, read timeout)
//! - Protocol errors (malformed status replies, rejected commands)
//! - Configuration errors (step factors, properties)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Stage driver error type
///
/// Transport-level failures are reported as-is and never retried by the
/// driver; callers decide whether to retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// No port has been configured, or the device is not initialized yet
    #[error("No port configured")]
    NoPortConfigured,

    /// The transport could not be opened
    #[error("Failed to open port {port}: {reason}")]
    TransportOpenFailed {
        /// The port that failed to open.
        port: String,
        /// The reason reported by the transport.
        reason: String,
    },

    /// Writing the command to the transport failed
    #[error("Transport write failed: {reason}")]
    TransportWriteFailed {
        /// The reason reported by the transport.
        reason: String,
    },

    /// No complete reply arrived before the answer timeout
    #[error("Transport read timed out after {timeout_ms}ms")]
    TransportReadTimeout {
        /// The answer timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A status reply could not be decoded
    #[error("Failed to parse status reply: {reason}")]
    StatusParseError {
        /// What was wrong with the reply.
        reason: String,
    },

    /// The G90/G91 mode switch preceding a move failed
    #[error("Mode switch to {mode} failed: {reason}")]
    ModeSwitchFailed {
        /// The coordinate mode that was requested.
        mode: String,
        /// Why the switch failed.
        reason: String,
    },

    /// A required controller parameter has not been fetched
    #[error("Configuration missing: {parameter}")]
    ConfigurationMissing {
        /// The missing parameter.
        parameter: String,
    },

    /// A step factor is zero, negative or not finite
    #[error("Invalid step factor for axis {axis}: {value}")]
    InvalidStepFactor {
        /// The affected axis.
        axis: String,
        /// The offending value.
        value: f64,
    },

    /// The operation is not supported by this driver or firmware
    #[error("Unsupported command: {command}")]
    UnsupportedCommand {
        /// The unsupported command or operation.
        command: String,
    },

    /// The controller answered with an error line
    #[error("Command '{command}' rejected: {reply}")]
    CommandRejected {
        /// The command that was sent.
        command: String,
        /// The controller's reply.
        reply: String,
    },

    /// No property with this name exists
    #[error("Unknown property: {name}")]
    UnknownProperty {
        /// The property name.
        name: String,
    },

    /// The property cannot be written
    #[error("Property {name} is read-only")]
    ReadOnlyProperty {
        /// The property name.
        name: String,
    },

    /// The value cannot be stored in the property
    #[error("Invalid value '{value}' for property {name}")]
    InvalidPropertyValue {
        /// The property name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// Generic stage error
    #[error("Stage error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

impl StageError {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        StageError::Other {
            message: msg.into(),
        }
    }

    /// Map a lower-level write failure
    pub fn write_failed(reason: impl std::fmt::Display) -> Self {
        StageError::TransportWriteFailed {
            reason: reason.to_string(),
        }
    }

    /// Map a status decoding failure
    pub fn parse(reason: impl Into<String>) -> Self {
        StageError::StatusParseError {
            reason: reason.into(),
        }
    }

    /// Check if this is a read timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, StageError::TransportReadTimeout { .. })
    }

    /// Check if this error originated in the transport layer
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            StageError::NoPortConfigured
                | StageError::TransportOpenFailed { .. }
                | StageError::TransportWriteFailed { .. }
                | StageError::TransportReadTimeout { .. }
        )
    }

    /// Configuration errors cannot be fixed by retrying the operation
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StageError::ConfigurationMissing { .. } | StageError::InvalidStepFactor { .. }
        )
    }
}

/// Result type using StageError
pub type Result<T> = std::result::Result<T, StageError>;
