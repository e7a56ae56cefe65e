//! Firmware capability probe
//!
//! Decides which dialect the controller speaks, once, at initialization.
//! A compact status request (`?`) is tried first; a controller that does
//! not answer with a bracketed report gets the verbose `$sr` request.

use crate::communication::engine::CommandEngine;
use crate::firmware::codec::{build_dialect_query, build_version_query};
use crate::firmware::{ControllerType, StatusDialect};
use serde::{Deserialize, Serialize};
use stagekit_core::{Result, StageError};
use stagekit_settings::FirmwareSelection;

/// Version reported when the controller does not answer the identity query
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Result of the probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareIdentity {
    /// Detected or forced controller type
    pub controller: ControllerType,
    /// Version string reported by the controller
    pub version: String,
}

/// Detect the controller type
///
/// A forced selection skips the wire entirely.
pub fn detect_controller(
    engine: &CommandEngine,
    selection: FirmwareSelection,
) -> Result<ControllerType> {
    if let Some(controller) = ControllerType::from_selection(selection) {
        tracing::info!("Controller type forced to {}", controller);
        return Ok(controller);
    }

    for dialect in [StatusDialect::Compact, StatusDialect::Verbose] {
        let query = build_dialect_query(dialect);
        match engine.execute(&query) {
            Ok(outcome) if outcome.dialect == Some(dialect) => {
                let controller = match dialect {
                    StatusDialect::Compact => ControllerType::Grbl,
                    StatusDialect::Verbose => ControllerType::TinyG,
                };
                tracing::info!("Detected {} controller ({} answered)", controller, query);
                return Ok(controller);
            }
            Ok(outcome) => {
                tracing::debug!("Probe {} answered {:?}", query, outcome.reply);
            }
            Err(e) if e.is_timeout() || matches!(e, StageError::StatusParseError { .. }) => {
                tracing::debug!("Probe {} failed: {}", query, e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(StageError::ConfigurationMissing {
        parameter: "firmware dialect (no answer to ? or $sr)".to_string(),
    })
}

/// Extract the version from an identity reply
///
/// TinyG answers `$fv` with `[fv]  firmware version   0.970`; Grbl answers
/// `$I` with `[0.9j.20160726:]` or `[VER:1.1h.20190825:]`.
pub fn parse_version(controller: ControllerType, reply: &str) -> Option<String> {
    let lines = reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "ok" && !line.ends_with("ok>"));

    match controller {
        ControllerType::TinyG => lines
            .filter_map(|line| line.strip_prefix("[fv]"))
            .find_map(|rest| {
                rest.split_whitespace()
                    .find(|word| word.parse::<f64>().is_ok())
                    .map(str::to_string)
            }),
        ControllerType::Grbl => lines
            .filter_map(|line| line.strip_prefix('[').and_then(|l| l.strip_suffix(']')))
            .find(|inner| !inner.starts_with("OPT:"))
            .map(|inner| {
                inner
                    .trim_start_matches("VER:")
                    .trim_end_matches(':')
                    .to_string()
            }),
    }
}

/// Query the firmware version
///
/// Failure to identify is not fatal; the version is reported as
/// [`UNKNOWN_VERSION`].
pub fn query_version(engine: &CommandEngine, controller: ControllerType) -> String {
    let query = build_version_query(controller);
    match engine.execute(&query) {
        Ok(outcome) => parse_version(controller, &outcome.reply).unwrap_or_else(|| {
            tracing::warn!("Unrecognized version reply: {:?}", outcome.reply);
            UNKNOWN_VERSION.to_string()
        }),
        Err(e) => {
            tracing::warn!("Version query failed: {}", e);
            UNKNOWN_VERSION.to_string()
        }
    }
}

/// Detect the controller and read its version
pub fn probe(engine: &CommandEngine, selection: FirmwareSelection) -> Result<FirmwareIdentity> {
    let controller = detect_controller(engine, selection)?;
    let version = query_version(engine, controller);
    tracing::info!("Firmware: {} {}", controller, version);
    Ok(FirmwareIdentity {
        controller,
        version,
    })
}
