//! Communication layer
//!
//! Defines the narrow [`Transport`] interface the command engine drives,
//! the serial and simulated implementations of it, the serialized
//! [`CommandEngine`](engine::CommandEngine) and the background
//! [`StatusPoller`](poller::StatusPoller).

pub mod engine;
pub mod poller;
pub mod serial;
pub mod simulator;

use stagekit_core::{LineTerminator, Result};
use stagekit_settings::ConnectionSettings;
use std::sync::Arc;
use std::time::Duration;

/// Connection parameters for opening a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Port name (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Hardware handshaking
    pub handshaking: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            handshaking: false,
        }
    }
}

impl ConnectionParams {
    /// Parameters for a port with the controller defaults (115200 8N1, no handshaking)
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Build parameters from the connection section of the configuration
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            port: settings.port.clone(),
            baud_rate: settings.baud_rate,
            data_bits: settings.data_bits,
            stop_bits: settings.stop_bits,
            handshaking: settings.handshaking,
        }
    }
}

/// Byte-oriented, line-framed connection to a controller
///
/// Every call is blocking. Read failures are reported as
/// [`StageError::TransportReadTimeout`](stagekit_core::StageError::TransportReadTimeout),
/// write failures as
/// [`StageError::TransportWriteFailed`](stagekit_core::StageError::TransportWriteFailed).
pub trait Transport: Send {
    /// Endpoint name, for logging
    fn name(&self) -> String;

    /// Apply serial framing parameters
    fn configure(&mut self, params: &ConnectionParams) -> Result<()>;

    /// Discard any input received but not yet read
    fn purge(&mut self) -> Result<()>;

    /// Write `data` followed by `terminator`
    fn write_line(&mut self, data: &str, terminator: LineTerminator) -> Result<()>;

    /// Write bytes as-is (realtime control characters)
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Set how long [`Transport::read_line`] waits for a complete line
    fn set_answer_timeout(&mut self, timeout: Duration);

    /// Read one line, without its terminator
    fn read_line(&mut self, terminator: LineTerminator) -> Result<String>;
}

/// Factory used by the device to open the configured port
pub type TransportOpener =
    Arc<dyn Fn(&ConnectionParams) -> Result<Box<dyn Transport>> + Send + Sync>;

/// Opener for real serial ports
pub fn serial_opener() -> TransportOpener {
    Arc::new(|params: &ConnectionParams| {
        let transport = serial::SerialTransport::open(params)?;
        Ok(Box::new(transport) as Box<dyn Transport>)
    })
}

/// Split complete lines out of a receive buffer
///
/// Returns the first line terminated by `terminator` (terminator removed,
/// trailing `\r` trimmed) and leaves the remainder in `buffer`.
pub(crate) fn take_line(buffer: &mut Vec<u8>, terminator: LineTerminator) -> Option<String> {
    let needle = terminator.as_str().as_bytes();
    let pos = buffer
        .windows(needle.len())
        .position(|window| window == needle)?;

    let line: Vec<u8> = buffer.drain(..pos + needle.len()).take(pos).collect();
    let text = String::from_utf8_lossy(&line);
    Some(text.trim_end_matches('\r').to_string())
}
