//! Firmware parameter table
//!
//! Parses the `$$` dump of either controller into an indexed table and
//! derives the per-axis step conversion from it.
//!
//! Grbl lines: `$100=250.000 (x, step/mm)`.
//! TinyG lines: `[1sa] m1 step angle               1.800 deg`.

use crate::firmware::ControllerType;
use serde::{Deserialize, Serialize};
use stagekit_core::{Axis, Result, StageError, StepConversion};
use std::collections::BTreeMap;

/// One controller parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareParameter {
    /// Key without the `$` prefix (`100`, `1sa`)
    pub key: String,
    /// Value as reported
    pub value: String,
    /// Description printed next to the value, if any
    pub description: Option<String>,
}

impl FirmwareParameter {
    /// Value as a number
    pub fn numeric(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

/// Parameters keyed by their index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    entries: BTreeMap<String, FirmwareParameter>,
}

impl ParameterTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `$$` dump; unrecognized lines are skipped
    pub fn parse(dump: &str) -> Self {
        let mut table = Self::new();
        for line in dump.lines() {
            let line = line.trim();
            let parsed = if line.starts_with('$') {
                Self::parse_grbl_line(line)
            } else if line.starts_with('[') {
                Self::parse_tinyg_line(line)
            } else {
                None
            };
            if let Some(parameter) = parsed {
                table.entries.insert(parameter.key.clone(), parameter);
            }
        }
        table
    }

    fn parse_grbl_line(line: &str) -> Option<FirmwareParameter> {
        let (key, rest) = line.trim_start_matches('$').split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }

        let rest = rest.trim();
        let (value, description) = match rest.split_once(' ') {
            Some((value, description)) => {
                let description = description
                    .trim()
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .trim();
                (
                    value,
                    (!description.is_empty()).then(|| description.to_string()),
                )
            }
            None => (rest, None),
        };

        Some(FirmwareParameter {
            key: key.to_string(),
            value: value.to_string(),
            description,
        })
    }

    fn parse_tinyg_line(line: &str) -> Option<FirmwareParameter> {
        let (key, rest) = line.strip_prefix('[')?.split_once(']')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }

        let words: Vec<&str> = rest.split_whitespace().collect();
        let value_index = words.iter().position(|word| word.parse::<f64>().is_ok())?;
        let description = words[..value_index].join(" ");

        Some(FirmwareParameter {
            key: key.to_string(),
            value: words[value_index].to_string(),
            description: (!description.is_empty()).then_some(description),
        })
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&FirmwareParameter> {
        self.entries.get(key.trim_start_matches('$'))
    }

    /// Look up a numeric parameter
    pub fn numeric(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FirmwareParameter::numeric)
    }

    /// Store a value, keeping an existing description
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = key.trim_start_matches('$').to_string();
        let value = value.into();
        self.entries
            .entry(key.clone())
            .and_modify(|parameter| parameter.value = value.clone())
            .or_insert(FirmwareParameter {
                key,
                value,
                description: None,
            });
    }

    /// All parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = &FirmwareParameter> {
        self.entries.values()
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no parameter was parsed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn required(&self, key: &str) -> Result<f64> {
        self.numeric(key)
            .ok_or_else(|| StageError::ConfigurationMissing {
                parameter: format!("${}", key),
            })
    }

    /// Derive the step conversion in the controller's convention
    ///
    /// Grbl reports steps/mm in `$100`..`$102`. TinyG describes each motor
    /// by step angle (`[Nsa]`, degrees), travel per revolution (`[Ntr]`, mm)
    /// and microsteps (`[Nmi]`); motor N drives axis N.
    pub fn step_conversion(&self, controller: ControllerType) -> Result<StepConversion> {
        match controller {
            ControllerType::Grbl => StepConversion::steps_per_mm(
                self.required("100")?,
                self.required("101")?,
                self.required("102")?,
            ),
            ControllerType::TinyG => {
                let mut sizes = [0.0; 3];
                for axis in Axis::ALL {
                    let motor = axis.index() + 1;
                    let step_angle = self.required(&format!("{}sa", motor))?;
                    let travel = self.required(&format!("{}tr", motor))?;
                    let microsteps = self.required(&format!("{}mi", motor))?;
                    let mm_per_step = travel * step_angle / (360.0 * microsteps);
                    sizes[axis.index()] = mm_per_step * 1000.0;
                }
                StepConversion::step_size_um(sizes[0], sizes[1], sizes[2])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagekit_core::StepConvention;

    const GRBL_DUMP: &str = "$0=10 (step pulse, usec)\n\
                             $100=250.000 (x, step/mm)\n\
                             $101=250.000 (y, step/mm)\n\
                             $102=400.000 (z, step/mm)\n\
                             ok\n";

    const TINYG_DUMP: &str = "[1ma] m1 map to axis                0 [0=X,1=Y,2=Z...]\r\n\
                              [1sa] m1 step angle                 1.800 deg\r\n\
                              [1tr] m1 travel per revolution     36.000 mm\r\n\
                              [1mi] m1 microsteps                 8 [1,2,4,8]\r\n\
                              [2sa] m2 step angle                 1.800 deg\r\n\
                              [2tr] m2 travel per revolution     36.000 mm\r\n\
                              [2mi] m2 microsteps                 8 [1,2,4,8]\r\n\
                              [3sa] m3 step angle                 1.800 deg\r\n\
                              [3tr] m3 travel per revolution      1.250 mm\r\n\
                              [3mi] m3 microsteps                 4 [1,2,4,8]\r\n\
                              tinyg [mm] ok>\r\n";

    #[test]
    fn test_parse_grbl_dump() {
        let table = ParameterTable::parse(GRBL_DUMP);
        assert_eq!(table.len(), 4);
        let x = table.get("$100").unwrap();
        assert_eq!(x.value, "250.000");
        assert_eq!(x.description.as_deref(), Some("x, step/mm"));
    }

    #[test]
    fn test_parse_tinyg_dump() {
        let table = ParameterTable::parse(TINYG_DUMP);
        assert_eq!(table.numeric("1sa"), Some(1.8));
        assert_eq!(table.numeric("1ma"), Some(0.0));
        assert_eq!(
            table.get("1tr").unwrap().description.as_deref(),
            Some("m1 travel per revolution")
        );
    }

    #[test]
    fn test_grbl_step_conversion() {
        let conv = ParameterTable::parse(GRBL_DUMP)
            .step_conversion(ControllerType::Grbl)
            .unwrap();
        assert_eq!(conv.convention(), StepConvention::StepsPerMm);
        assert!((conv.step_size_um_for(Axis::X) - 4.0).abs() < 1e-12);
        assert!((conv.step_size_um_for(Axis::Z) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_tinyg_step_conversion() {
        let conv = ParameterTable::parse(TINYG_DUMP)
            .step_conversion(ControllerType::TinyG)
            .unwrap();
        assert_eq!(conv.convention(), StepConvention::StepSizeUm);
        // 36 mm * 1.8 deg / (360 * 8) = 0.0225 mm
        assert!((conv.step_size_um_for(Axis::X) - 22.5).abs() < 1e-9);
        assert!((conv.step_size_um_for(Axis::Z) - 1.5625).abs() < 1e-9);
    }

    #[test]
    fn test_missing_factor_is_configuration_error() {
        let err = ParameterTable::parse("$100=250\n$101=250\n")
            .step_conversion(ControllerType::Grbl)
            .unwrap_err();
        assert_eq!(
            err,
            StageError::ConfigurationMissing {
                parameter: "$102".to_string()
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_zero_factor_rejected() {
        let err = ParameterTable::parse("$100=0\n$101=250\n$102=250\n")
            .step_conversion(ControllerType::Grbl)
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidStepFactor { .. }));
    }

    #[test]
    fn test_set_updates_cache() {
        let mut table = ParameterTable::parse(GRBL_DUMP);
        table.set("$100", "80.000");
        assert_eq!(table.numeric("100"), Some(80.0));
        assert_eq!(
            table.get("100").unwrap().description.as_deref(),
            Some("x, step/mm")
        );
        table.set("130", "200");
        assert_eq!(table.len(), 5);
    }
}
