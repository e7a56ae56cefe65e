//! Serial port communication implementation
//!
//! Provides low-level serial port operations for direct hardware connection
//! to stage controllers via USB or RS-232.
//!
//! Supports:
//! - Port enumeration and discovery
//! - Baud rate, stop bit and handshaking configuration
//! - Line-framed blocking reads with an answer timeout

use crate::communication::{take_line, ConnectionParams, Transport};
use serialport::{ClearBuffer, SerialPort};
use stagekit_core::{LineTerminator, Result, StageError};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Poll interval of the underlying port while waiting for a line
const READ_POLL: Duration = Duration::from_millis(10);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// List available serial ports on the system
///
/// Filters ports to include only controller-style names:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => Ok(ports
            .iter()
            .filter(|port| is_valid_cnc_port(&port.port_name))
            .map(|port| {
                let info = SerialPortInfo::new(&port.port_name, get_port_description(port));
                match &port.port_type {
                    serialport::SerialPortType::UsbPort(usb_info) => {
                        let info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                        match usb_info.manufacturer {
                            Some(ref mfg) => info.with_manufacturer(mfg),
                            None => info,
                        }
                    }
                    _ => info,
                }
            })
            .collect()),
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(StageError::other(format!("Failed to enumerate ports: {}", e)))
        }
    }
}

/// Check if a port name matches controller patterns
pub fn is_valid_cnc_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_data_bits(bits: u8) -> Result<serialport::DataBits> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        _ => Err(StageError::other(format!("Invalid data bits: {}", bits))),
    }
}

fn to_stop_bits(bits: u8) -> Result<serialport::StopBits> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        _ => Err(StageError::other(format!("Invalid stop bits: {}", bits))),
    }
}

fn to_flow_control(handshaking: bool) -> serialport::FlowControl {
    if handshaking {
        serialport::FlowControl::Hardware
    } else {
        serialport::FlowControl::None
    }
}

/// Serial transport backed by the `serialport` crate
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    answer_timeout: Duration,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open a serial port with the given parameters
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let open_failed = |reason: String| StageError::TransportOpenFailed {
            port: params.port.clone(),
            reason,
        };

        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(READ_POLL)
            .data_bits(to_data_bits(params.data_bits).map_err(|e| open_failed(e.to_string()))?)
            .stop_bits(to_stop_bits(params.stop_bits).map_err(|e| open_failed(e.to_string()))?)
            .parity(serialport::Parity::None)
            .flow_control(to_flow_control(params.handshaking));

        match builder.open() {
            Ok(port) => {
                tracing::info!("Opened serial port {} at {} baud", params.port, params.baud_rate);
                Ok(Self {
                    port,
                    name: params.port.clone(),
                    answer_timeout: Duration::from_millis(300),
                    pending: Vec::new(),
                })
            }
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Err(open_failed(e.to_string()))
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .map_err(StageError::write_failed)
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn configure(&mut self, params: &ConnectionParams) -> Result<()> {
        let data_bits = to_data_bits(params.data_bits)?;
        let stop_bits = to_stop_bits(params.stop_bits)?;
        let name = self.name.clone();
        let failed = |e: serialport::Error| {
            StageError::other(format!("Failed to configure {}: {}", name, e))
        };

        self.port.set_baud_rate(params.baud_rate).map_err(&failed)?;
        self.port.set_data_bits(data_bits).map_err(&failed)?;
        self.port.set_stop_bits(stop_bits).map_err(&failed)?;
        self.port
            .set_flow_control(to_flow_control(params.handshaking))
            .map_err(&failed)?;
        tracing::debug!(
            "Configured {}: {} baud, {} stop bit(s), handshaking {}",
            self.name,
            params.baud_rate,
            params.stop_bits,
            if params.handshaking { "on" } else { "off" }
        );
        Ok(())
    }

    fn purge(&mut self) -> Result<()> {
        self.pending.clear();
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| purge_failed(&self.name, e))
    }

    fn write_line(&mut self, data: &str, terminator: LineTerminator) -> Result<()> {
        let mut bytes = Vec::with_capacity(data.len() + 2);
        bytes.extend_from_slice(data.as_bytes());
        bytes.extend_from_slice(terminator.as_str().as_bytes());
        self.write_all(&bytes)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)
    }

    fn set_answer_timeout(&mut self, timeout: Duration) {
        self.answer_timeout = timeout;
    }

    fn read_line(&mut self, terminator: LineTerminator) -> Result<String> {
        let deadline = Instant::now() + self.answer_timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = take_line(&mut self.pending, terminator) {
                return Ok(line);
            }

            if Instant::now() >= deadline {
                return Err(StageError::TransportReadTimeout {
                    timeout_ms: self.answer_timeout.as_millis() as u64,
                });
            }

            match self.port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Read from {} failed: {}", self.name, e);
                    return Err(StageError::TransportReadTimeout {
                        timeout_ms: self.answer_timeout.as_millis() as u64,
                    });
                }
            }
        }
    }
}

fn purge_failed(name: &str, error: serialport::Error) -> StageError {
    StageError::write_failed(format!("Failed to purge {}: {}", name, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_failure_is_transport_error() {
        let error = serialport::Error::new(
            serialport::ErrorKind::Io(io::ErrorKind::BrokenPipe),
            "device unplugged",
        );
        let mapped = purge_failed("/dev/ttyUSB0", error);
        assert!(mapped.is_transport_error());
        assert!(matches!(mapped, StageError::TransportWriteFailed { .. }));
    }

    #[test]
    fn test_cnc_port_patterns() {
        assert!(is_valid_cnc_port("COM3"));
        assert!(is_valid_cnc_port("/dev/ttyUSB0"));
        assert!(is_valid_cnc_port("/dev/ttyACM1"));
        assert!(is_valid_cnc_port("/dev/cu.usbmodem14201"));
        assert!(!is_valid_cnc_port("COM"));
        assert!(!is_valid_cnc_port("COMX"));
        assert!(!is_valid_cnc_port("/dev/ttyS0"));
    }

    #[test]
    fn test_framing_conversion() {
        assert!(matches!(to_data_bits(8), Ok(serialport::DataBits::Eight)));
        assert!(to_data_bits(9).is_err());
        assert!(matches!(to_stop_bits(2), Ok(serialport::StopBits::Two)));
        assert!(to_stop_bits(3).is_err());
        assert_eq!(to_flow_control(false), serialport::FlowControl::None);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let params = ConnectionParams::for_port("/dev/stagekit-does-not-exist");
        let err = SerialTransport::open(&params).err();
        assert!(matches!(err, Some(StageError::TransportOpenFailed { .. })));
    }
}
