//! Status Report Parsing
//!
//! Decodes the two status reply formats into a [`ParsedStatus`]:
//!
//! - Verbose (TinyG `$sr` text report), one `Label: value unit` field per
//!   line with the value starting at a fixed column:
//!   ```text
//!   X position:          12.500 mm
//!   Machine state:       Ready
//!   ```
//! - Compact (Grbl `?`), a single bracketed report:
//!   `<Idle,MPos:1.000,2.000,0.000,WPos:0.000,0.000,0.000>`
//!
//! Only coordinates that decode cleanly are reported; the caller keeps its
//! cached value for the rest.

use crate::firmware::StatusDialect;
use serde::{Deserialize, Serialize};
use stagekit_core::{Axis, PartialPosition, Result, StageError};

/// Column at which the verbose report starts its value field
pub const VALUE_COLUMN: usize = 21;

/// Width of the verbose value field
const VALUE_WIDTH: usize = 10;

/// Number of tokens in a compact report
pub const COMPACT_TOKEN_COUNT: usize = 9;

const COMPACT_DELIMITERS: [char; 6] = ['<', '>', ':', ',', '\r', '\n'];

/// Decoded status reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatus {
    /// Format the reply was written in
    pub dialect: StatusDialect,
    /// Machine position fields that decoded
    pub machine: PartialPosition,
    /// Work position fields that decoded
    pub work: PartialPosition,
    /// Machine state label, if present
    pub state: Option<String>,
}

impl ParsedStatus {
    fn empty(dialect: StatusDialect) -> Self {
        Self {
            dialect,
            machine: PartialPosition::default(),
            work: PartialPosition::default(),
            state: None,
        }
    }
}

/// Verbose report field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerboseField {
    Position(Axis),
    MachineState,
}

const VERBOSE_LABELS: [(&str, VerboseField); 4] = [
    ("X position", VerboseField::Position(Axis::X)),
    ("Y position", VerboseField::Position(Axis::Y)),
    ("Z position", VerboseField::Position(Axis::Z)),
    ("Machine state:", VerboseField::MachineState),
];

/// Status report parser
pub struct StatusParser;

impl StatusParser {
    /// Pick the report format from the first non-whitespace character
    pub fn sniff(reply: &str) -> StatusDialect {
        match reply.trim_start().chars().next() {
            Some('<') => StatusDialect::Compact,
            _ => StatusDialect::Verbose,
        }
    }

    /// Parse a reply in whichever format it is written in
    pub fn parse(reply: &str) -> Result<ParsedStatus> {
        match Self::sniff(reply) {
            StatusDialect::Compact => Self::parse_compact(reply),
            StatusDialect::Verbose => Self::parse_verbose(reply),
        }
    }

    /// Parse a verbose multi-line report
    ///
    /// Lines with unknown labels are skipped. A position whose value is not
    /// numeric stays absent from the result.
    ///
    /// A reply without a single known label is rejected with
    /// [`StageError::StatusParseError`]: it is not a status report at all,
    /// and firmware detection relies on this to tell a verbose report from
    /// an error or prompt line.
    pub fn parse_verbose(reply: &str) -> Result<ParsedStatus> {
        let mut status = ParsedStatus::empty(StatusDialect::Verbose);
        let mut matched = false;

        for line in reply.split(['\r', '\n']) {
            let Some(field) = Self::verbose_field(line) else {
                continue;
            };
            matched = true;

            let value = Self::value_field(line);
            match field {
                VerboseField::Position(axis) => {
                    match value
                        .split_whitespace()
                        .next()
                        .and_then(|token| token.parse::<f64>().ok())
                    {
                        Some(mm) => status.machine.set(axis, mm),
                        None => {
                            tracing::debug!("Ignoring non-numeric {} position: {:?}", axis, line)
                        }
                    }
                }
                VerboseField::MachineState => {
                    let state = value.trim();
                    if !state.is_empty() {
                        status.state = Some(state.to_string());
                    }
                }
            }
        }

        if !matched {
            return Err(StageError::parse("no status fields in verbose reply"));
        }
        Ok(status)
    }

    /// Parse a compact bracketed report
    pub fn parse_compact(reply: &str) -> Result<ParsedStatus> {
        let tokens: Vec<&str> = reply
            .split(COMPACT_DELIMITERS)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect();

        if tokens.len() != COMPACT_TOKEN_COUNT {
            return Err(StageError::parse(format!(
                "expected {} tokens in compact report, found {}",
                COMPACT_TOKEN_COUNT,
                tokens.len()
            )));
        }
        if tokens[1] != "MPos" || tokens[5] != "WPos" {
            return Err(StageError::parse(format!(
                "unexpected compact report layout: {}",
                reply.trim()
            )));
        }

        let mut status = ParsedStatus::empty(StatusDialect::Compact);
        status.state = Some(tokens[0].to_string());
        for axis in Axis::ALL {
            if let Ok(mm) = tokens[2 + axis.index()].parse::<f64>() {
                status.machine.set(axis, mm);
            }
            if let Ok(mm) = tokens[6 + axis.index()].parse::<f64>() {
                status.work.set(axis, mm);
            }
        }
        Ok(status)
    }

    fn verbose_field(line: &str) -> Option<VerboseField> {
        VERBOSE_LABELS
            .iter()
            .find(|(label, _)| line.starts_with(label))
            .map(|(_, field)| *field)
    }

    fn value_field(line: &str) -> &str {
        let start = VALUE_COLUMN.min(line.len());
        let end = (VALUE_COLUMN + VALUE_WIDTH).min(line.len());
        line.get(start..end).unwrap_or("")
    }
}
