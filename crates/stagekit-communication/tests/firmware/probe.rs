use stagekit_communication::firmware::probe::{detect_controller, probe, UNKNOWN_VERSION};
use stagekit_communication::{
    CommandEngine, ControllerType, FirmwareIdentity, ParameterTable, SimulatedController,
    TimeoutPolicy,
};
use stagekit_communication::firmware::codec::build_parameter_query;
use stagekit_core::{Axis, StageError};
use stagekit_settings::FirmwareSelection;
use std::time::Duration;

fn fast_engine(sim: SimulatedController) -> CommandEngine {
    let policy = TimeoutPolicy {
        normal: Duration::from_millis(20),
        status: Duration::from_millis(20),
        config: Duration::from_millis(20),
        extended: Duration::from_millis(20),
        move_ack: Duration::from_millis(20),
        reset_settle: Duration::from_millis(1),
        reset_read: Duration::from_millis(20),
        inter_line: Duration::from_millis(5),
    };
    let engine = CommandEngine::new(policy);
    engine.attach(Box::new(sim));
    engine
}

#[test]
fn test_probe_grbl() {
    let sim = SimulatedController::grbl();
    let handle = sim.handle();
    let engine = fast_engine(sim);

    let identity = probe(&engine, FirmwareSelection::Auto).unwrap();
    assert_eq!(identity.controller, ControllerType::Grbl);
    assert_eq!(identity.version, "0.9j.20160726");
    assert_eq!(handle.written(), vec!["?", "$I"]);
}

#[test]
fn test_probe_falls_back_to_verbose() {
    let sim = SimulatedController::tinyg();
    let handle = sim.handle();
    let engine = fast_engine(sim);

    let identity = probe(&engine, FirmwareSelection::Auto).unwrap();
    assert_eq!(identity.controller, ControllerType::TinyG);
    assert_eq!(identity.version, "0.970");
    assert_eq!(handle.written(), vec!["?", "$sr", "$fv"]);
}

#[test]
fn test_forced_selection_skips_detection() {
    let sim = SimulatedController::grbl();
    let handle = sim.handle();
    let engine = fast_engine(sim);

    let controller = detect_controller(&engine, FirmwareSelection::Grbl).unwrap();
    assert_eq!(controller, ControllerType::Grbl);
    assert!(handle.written().is_empty());
}

#[test]
fn test_silent_controller_is_not_detected() {
    let sim = SimulatedController::grbl();
    sim.handle().set_silent(true);
    let engine = fast_engine(sim);

    let err = detect_controller(&engine, FirmwareSelection::Auto).unwrap_err();
    assert!(matches!(err, StageError::ConfigurationMissing { .. }));
}

#[test]
fn test_version_failure_is_not_fatal() {
    let sim = SimulatedController::grbl();
    sim.handle().reject("$I");
    let engine = fast_engine(sim);

    let identity = probe(&engine, FirmwareSelection::Auto).unwrap();
    assert_eq!(identity.version, UNKNOWN_VERSION);
}

#[test]
fn test_identity_serializes() {
    let identity = FirmwareIdentity {
        controller: ControllerType::TinyG,
        version: "0.970".to_string(),
    };
    let json = serde_json::to_string(&identity).unwrap();
    let back: FirmwareIdentity = serde_json::from_str(&json).unwrap();
    assert_eq!(back, identity);
}

#[test]
fn test_tinyg_dump_yields_step_sizes() {
    let engine = fast_engine(SimulatedController::tinyg());
    let outcome = engine.execute(&build_parameter_query()).unwrap();
    let table = ParameterTable::parse(&outcome.reply);
    let conversion = table.step_conversion(ControllerType::TinyG).unwrap();

    assert!((conversion.step_size_um_for(Axis::X) - 25.0).abs() < 1e-9);
    assert!((conversion.step_size_um_for(Axis::Z) - 1.5625).abs() < 1e-9);
}
