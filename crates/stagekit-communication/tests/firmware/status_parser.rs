use proptest::prelude::*;
use stagekit_communication::firmware::status_parser::{StatusParser, COMPACT_TOKEN_COUNT};
use stagekit_communication::StatusDialect;
use stagekit_core::StageError;

const TINYG_REPORT: &str = "X position:          12.500 mm\r\n\
                            Y position:          -3.250 mm\r\n\
                            Z position:          0.000 mm\r\n\
                            Feed rate:           0.000 mm/min\r\n\
                            Machine state:       Ready\r\n\
                            tinyg [mm] ok>";

#[test]
fn test_verbose_report() {
    let status = StatusParser::parse(TINYG_REPORT).unwrap();
    assert_eq!(status.dialect, StatusDialect::Verbose);
    assert_eq!(status.machine.x, Some(12.5));
    assert_eq!(status.machine.y, Some(-3.25));
    assert_eq!(status.machine.z, Some(0.0));
    assert_eq!(status.state.as_deref(), Some("Ready"));
}

#[test]
fn test_compact_report() {
    let status =
        StatusParser::parse("<Run,MPos:5.000,6.500,-1.000,WPos:4.000,6.500,-1.000>").unwrap();
    assert_eq!(status.dialect, StatusDialect::Compact);
    assert_eq!(status.state.as_deref(), Some("Run"));
    assert_eq!(status.machine.y, Some(6.5));
    assert_eq!(status.work.x, Some(4.0));
}

#[test]
fn test_compact_missing_wpos_rejected() {
    let err = StatusParser::parse("<Idle,MPos:0.000,0.000,0.000>").unwrap_err();
    assert!(matches!(err, StageError::StatusParseError { .. }));
}

#[test]
fn test_verbose_partial_report_keeps_other_axes_absent() {
    let status = StatusParser::parse("Y position:          7.000 mm").unwrap();
    assert_eq!(status.machine.x, None);
    assert_eq!(status.machine.y, Some(7.0));
}

proptest! {
    #[test]
    fn parse_never_panics(reply in "\\PC{0,200}") {
        let _ = StatusParser::parse(&reply);
    }

    #[test]
    fn compact_requires_exact_token_count(values in prop::collection::vec(-1000.0f64..1000.0, 0..12)) {
        let body = values
            .iter()
            .map(|v| format!("{:.3}", v))
            .collect::<Vec<_>>()
            .join(",");
        let reply = format!("<Idle,MPos:{}>", body);
        let tokens = 2 + values.len();
        let result = StatusParser::parse_compact(&reply);
        if tokens != COMPACT_TOKEN_COUNT {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn verbose_positions_decode(x in -999.0f64..999.0) {
        let line = format!("{:<21}{:.3} mm", "X position:", x);
        let status = StatusParser::parse_verbose(&line).unwrap();
        let decoded = status.machine.x.unwrap();
        prop_assert!((decoded - x).abs() < 0.001);
    }
}
