//! # stagekit
//!
//! Host-side driver for motorized XY (and optional Z) stages run by Grbl or
//! TinyG motion controllers over a serial line.
//!
//! ## Architecture
//!
//! stagekit is organized as a workspace with multiple crates:
//!
//! 1. **stagekit-core** - Positions, coordinate modes, limits, step conversion, errors
//! 2. **stagekit-settings** - Configuration loading, saving and validation
//! 3. **stagekit-communication** - Transport, codec, status parsing, engine, poller, device
//! 4. **stagekit** - Command-line tool that integrates all crates

pub use stagekit_communication::{firmware, stage};

pub use stagekit_core::{
    Axis, AxisLimits, CoordinateMode, DeviceState, Position, Result, StageError,
    StatusSnapshot, StepConversion, StepLimits,
};

pub use stagekit_settings::{BusyDetection, Config, FirmwareSelection, SettingsError};

pub use stagekit_communication::{
    list_ports, CommandEngine, ControllerType, DetectionStatus, FirmwareIdentity,
    FirmwareParameter, SerialPortInfo, SimulatedController, SimulatorHandle, StageDevice,
    StageListener, StageProperty, TransportOpener,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Pretty console output on stderr
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(tracing::Level::INFO)
}

/// Initialize logging with a minimum level added to the `RUST_LOG` filter
pub fn init_logging_with(level: tracing::Level) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
