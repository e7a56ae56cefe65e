//! Configuration for the stage driver
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats stored in the platform config directory.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, serial framing, line terminator)
//! - Firmware selection (dialect probe or forced dialect)
//! - Answer timeouts per command class
//! - Machine settings (axis limits, velocity, sync step)
//! - Status polling and busy detection

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use stagekit_core::{AxisLimits, LineTerminator};
use std::path::{Path, PathBuf};

/// Port value meaning "no port selected yet"
pub const UNDEFINED_PORT: &str = "Undefined";

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name (e.g. "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Hardware handshaking
    pub handshaking: bool,
    /// Line terminator; `None` uses the firmware dialect's default
    pub terminator: Option<LineTerminator>,
    /// Delay after opening the port before the first command, in milliseconds
    ///
    /// Arduino-based boards reset when the port opens and sit in their
    /// bootloader for a while.
    pub open_settle_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: UNDEFINED_PORT.to_string(),
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: 1,
            handshaking: false,
            terminator: None,
            open_settle_ms: 2000,
        }
    }
}

impl ConnectionSettings {
    /// True when the port names a real endpoint
    pub fn has_port(&self) -> bool {
        let lower = self.port.trim().to_lowercase();
        !lower.is_empty() && lower != "undefined" && lower != "unknown"
    }
}

/// Firmware selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareSelection {
    /// Probe the controller at initialization
    #[default]
    Auto,
    /// Grbl: compact `?` status, `$$` steps/mm dump
    Grbl,
    /// TinyG text mode: verbose `$sr` status, motor parameter dump
    TinyG,
}

impl std::fmt::Display for FirmwareSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Grbl => write!(f, "grbl"),
            Self::TinyG => write!(f, "tinyg"),
        }
    }
}

/// Firmware settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareSettings {
    /// Dialect selection
    pub firmware: FirmwareSelection,
    /// Step size used when the parameter dump yields no step factor, in
    /// micrometers per step (X, Y, Z)
    pub fallback_step_size_um: Option<[f64; 3]>,
}

/// Answer timeouts per command class, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Raw passthrough commands
    pub normal_ms: u64,
    /// Status queries
    pub status_ms: u64,
    /// `$` configuration commands
    pub config_ms: u64,
    /// Long-running commands such as homing
    pub extended_ms: u64,
    /// Move acknowledgments
    pub move_ms: u64,
    /// Delay between sending the reset byte and reading its reply
    pub reset_settle_ms: u64,
    /// Read timeout after a reset
    pub reset_read_ms: u64,
    /// Quiet period that ends a multi-line reply
    pub inter_line_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            normal_ms: 300,
            status_ms: 10_000,
            config_ms: 5_000,
            extended_ms: 60_000,
            move_ms: 300,
            reset_settle_ms: 600,
            reset_read_ms: 10_000,
            inter_line_ms: 100,
        }
    }
}

/// Machine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// X travel range
    pub x_limits: AxisLimits,
    /// Y travel range
    pub y_limits: AxisLimits,
    /// Z travel range
    pub z_limits: AxisLimits,
    /// Velocity assumed by the busy estimate, in mm/s
    pub velocity_mm_per_s: f64,
    /// Acceleration tunable, in mm/s^2
    pub acceleration: f64,
    /// Sync pulse step
    pub sync_step: f64,
    /// Motor/axis number the sync pulse is configured on
    pub sync_axis: u8,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            x_limits: AxisLimits::new(0.0, 20000.0),
            y_limits: AxisLimits::new(0.0, 20000.0),
            z_limits: AxisLimits::new(0.0, 10000.0),
            velocity_mm_per_s: 10.0,
            acceleration: 100.0,
            sync_step: 1.0,
            sync_axis: 0,
        }
    }
}

/// How `is_busy` decides whether the stage is still moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyDetection {
    /// Use controller status when available, the estimate otherwise
    #[default]
    Auto,
    /// Only trust controller status (falls back to the estimate on failure)
    Status,
    /// Never query; use the distance/velocity estimate
    Estimate,
}

/// Background status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Start the poller when the device becomes ready
    pub enabled: bool,
    /// Interval between status queries, in milliseconds
    pub interval_ms: u64,
    /// Busy detection strategy
    pub busy_detection: BusyDetection,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 250,
            busy_detection: BusyDetection::Auto,
        }
    }
}

/// Complete driver configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Firmware settings
    pub firmware: FirmwareSettings,
    /// Timeouts
    pub timeouts: TimeoutSettings,
    /// Machine settings
    pub machine: MachineSettings,
    /// Polling settings
    pub polling: PollingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (`<config dir>/stagekit/config.toml`)
    pub fn default_path() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("stagekit").join("config.toml"))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid(
                "connection.baud_rate",
                "must be > 0",
            ));
        }

        if !(5..=8).contains(&self.connection.data_bits) {
            return Err(SettingsError::invalid(
                "connection.data_bits",
                "must be between 5 and 8",
            ));
        }

        if !(1..=2).contains(&self.connection.stop_bits) {
            return Err(SettingsError::invalid(
                "connection.stop_bits",
                "must be 1 or 2",
            ));
        }

        let t = &self.timeouts;
        for (key, value) in [
            ("timeouts.normal_ms", t.normal_ms),
            ("timeouts.status_ms", t.status_ms),
            ("timeouts.config_ms", t.config_ms),
            ("timeouts.extended_ms", t.extended_ms),
            ("timeouts.move_ms", t.move_ms),
            ("timeouts.reset_read_ms", t.reset_read_ms),
            ("timeouts.inter_line_ms", t.inter_line_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        if !(self.machine.velocity_mm_per_s > 0.0) {
            return Err(SettingsError::invalid(
                "machine.velocity_mm_per_s",
                "must be > 0",
            ));
        }

        for (key, limits) in [
            ("machine.x_limits", &self.machine.x_limits),
            ("machine.y_limits", &self.machine.y_limits),
            ("machine.z_limits", &self.machine.z_limits),
        ] {
            if limits.min_um > limits.max_um {
                return Err(SettingsError::invalid(key, "min_um is above max_um"));
            }
        }

        if let Some(factors) = self.firmware.fallback_step_size_um {
            if factors.iter().any(|f| !(*f > 0.0)) {
                return Err(SettingsError::invalid(
                    "firmware.fallback_step_size_um",
                    "step sizes must be > 0",
                ));
            }
        }

        if self.polling.enabled && self.polling.interval_ms == 0 {
            return Err(SettingsError::invalid(
                "polling.interval_ms",
                "must be > 0 when polling is enabled",
            ));
        }

        Ok(())
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Format::Json),
            Some("toml") => Ok(Format::Toml),
            other => Err(SettingsError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}
