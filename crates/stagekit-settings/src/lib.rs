//! stagekit Settings Crate
//!
//! Handles driver configuration: connection, firmware selection, timeouts,
//! machine limits and status polling.

pub mod config;
pub mod error;

pub use config::{
    BusyDetection, Config, ConnectionSettings, FirmwareSelection, FirmwareSettings,
    MachineSettings, PollingSettings, TimeoutSettings, UNDEFINED_PORT,
};
pub use error::{SettingsError, SettingsResult};
