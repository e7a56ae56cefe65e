use crate::{fast_config, ready, ready_grbl};
use stagekit_communication::{DetectionStatus, SimulatedController, StageDevice};
use stagekit_core::{Axis, CoordinateMode, DeviceState, StageError};
use stagekit_settings::FirmwareSelection;

#[test]
fn test_absolute_move_round_trip() {
    let (device, handle) = ready_grbl();
    device.move_absolute_steps(1250, -500).unwrap();

    assert_eq!(handle.count_written("G0 X5.000000 Y-2.000000"), 1);
    assert_eq!(device.get_position_steps().unwrap(), (1250, -500));
    let (x_um, y_um) = device.get_position_um().unwrap();
    assert!((x_um - 5000.0).abs() < 1e-6);
    assert!((y_um + 2000.0).abs() < 1e-6);
}

#[test]
fn test_relative_moves_switch_mode_once() {
    let (device, handle) = ready_grbl();
    device.move_relative_steps(250, 0).unwrap();
    device.move_relative_steps(250, 250).unwrap();

    assert_eq!(handle.count_written("G91"), 1);
    assert_eq!(handle.mode(), CoordinateMode::Relative);
    assert_eq!(device.get_position_steps().unwrap(), (500, 250));

    device.move_absolute_steps(0, 0).unwrap();
    assert_eq!(handle.count_written("G90"), 2);
}

#[test]
fn test_no_io_before_port_is_configured() {
    let sim = SimulatedController::grbl();
    let handle = sim.handle();
    let mut device = StageDevice::with_opener(fast_config(""), handle.opener());

    assert_eq!(device.state(), DeviceState::Uninitialized);
    assert_eq!(device.initialize().unwrap_err(), StageError::NoPortConfigured);
    assert_eq!(device.move_absolute_steps(10, 10).unwrap_err(), StageError::NoPortConfigured);
    assert_eq!(device.get_position_steps().unwrap_err(), StageError::NoPortConfigured);
    assert_eq!(device.home().unwrap_err(), StageError::NoPortConfigured);
    assert!(!device.is_busy());
    assert!(handle.written().is_empty());
}

#[test]
fn test_silent_controller_times_out() {
    let (device, handle) = ready_grbl();
    handle.set_silent(true);

    let err = device.get_position_steps().unwrap_err();
    assert!(matches!(err, StageError::TransportReadTimeout { .. }));
    assert!(err.is_transport_error());
}

#[test]
fn test_initialize_against_silent_port_fails_and_releases() {
    let sim = SimulatedController::grbl();
    let handle = sim.handle();
    handle.set_silent(true);
    let mut device = StageDevice::with_opener(fast_config("/dev/ttyUSB0"), handle.opener());

    assert!(device.initialize().is_err());
    assert_eq!(device.state(), DeviceState::PortConfigured);
    assert!(!device.engine().is_attached());
}

#[test]
fn test_rejected_mode_switch_blocks_move() {
    let (device, handle) = ready_grbl();
    handle.reject("G91");
    handle.clear_written();

    let err = device.move_relative_steps(100, 100).unwrap_err();
    assert!(matches!(err, StageError::ModeSwitchFailed { .. }));
    assert!(handle.written().iter().all(|line| !line.starts_with("G0")));
    assert_eq!(handle.position().x, 0.0);
}

#[test]
fn test_rejected_move_is_reported() {
    let (device, handle) = ready_grbl();
    handle.reject("G0 X1.000000 Y1.000000");

    let err = device.move_absolute_steps(250, 250).unwrap_err();
    assert!(matches!(err, StageError::CommandRejected { .. }));
}

#[test]
fn test_z_stage() {
    let (device, handle) = ready_grbl();
    device.set_z_position_um(1000.0).unwrap();
    assert_eq!(handle.count_written("G0 Z1.000000"), 1);
    assert_eq!(device.get_z_position_steps().unwrap(), 250);

    device.move_z_relative_steps(-125).unwrap();
    assert!((device.get_z_position_um().unwrap() - 500.0).abs() < 1e-6);
}

#[test]
fn test_set_position_um_rounds_to_steps() {
    let (device, handle) = ready_grbl();
    device.set_position_um(1001.0, 999.0).unwrap();
    assert_eq!(handle.count_written("G0 X1.000000 Y1.000000"), 1);
}

#[test]
fn test_home_and_stop() {
    let (device, handle) = ready_grbl();
    device.move_absolute_steps(500, 500).unwrap();
    device.home().unwrap();
    assert_eq!(handle.position().x, 0.0);
    assert_eq!(
        device.engine().tracker().read().mode(),
        CoordinateMode::Homing
    );

    device.stop().unwrap();
    assert_eq!(handle.count_written("0x21"), 1);
}

#[test]
fn test_reset_reasserts_mode_on_next_move() {
    let (device, handle) = ready_grbl();
    device.reset().unwrap();
    assert_eq!(handle.count_written("0x18"), 1);

    device.move_absolute_steps(0, 0).unwrap();
    assert_eq!(handle.count_written("G90"), 2);
}

#[test]
fn test_tinyg_device() {
    let (device, handle) = ready(SimulatedController::tinyg(), fast_config("/dev/ttyACM0"));
    device.move_absolute_steps(400, 40).unwrap();
    assert_eq!(handle.count_written("G0 X10.000000 Y1.000000"), 1);
    assert_eq!(device.get_position_steps().unwrap(), (400, 40));
    assert_eq!(device.query_status().unwrap().state, "Stop");

    device.home().unwrap();
    assert_eq!(handle.count_written("G28.2 X0 Y0"), 1);
}

#[test]
fn test_forced_firmware_skips_probe() {
    let mut config = fast_config("/dev/ttyUSB0");
    config.firmware.firmware = FirmwareSelection::Grbl;
    let (device, handle) = ready(SimulatedController::grbl(), config);

    assert_eq!(handle.written()[0], "$I");
    assert_eq!(device.get_property("Version").unwrap(), "0.9j.20160726");
}

#[test]
fn test_parameters() {
    let (mut device, handle) = ready_grbl();
    let parameters = device.get_parameters().unwrap();
    assert!(parameters.iter().any(|p| p.key == "110" && p.value == "500.000"));

    device.set_parameter("$101", "125").unwrap();
    assert_eq!(handle.count_written("$101=125"), 1);
    assert_eq!(device.get_property("StepSizeYUm").unwrap(), "8");

    device.refresh_parameters().unwrap();
    assert_eq!(handle.count_written("$$"), 2);
}

#[test]
fn test_properties() {
    let (mut device, handle) = ready_grbl();
    assert_eq!(device.get_property("Port").unwrap(), "/dev/ttyUSB0");
    assert_eq!(device.get_property("status").unwrap(), "Idle");

    device.set_property("MaxVelocity", "25").unwrap();
    assert_eq!(device.engine().tracker().read().velocity(), 25.0);

    device.set_property("Command", "G90").unwrap();
    assert_eq!(device.get_property("Command").unwrap(), "ok");

    handle.reject("G4 P0");
    device.set_property("Command", "G4 P0").unwrap();
    assert_eq!(device.get_property("Command").unwrap(), "error:9");

    assert!(matches!(
        device.set_property("StepSizeXUm", "1"),
        Err(StageError::ReadOnlyProperty { .. })
    ));
}

#[test]
fn test_limits() {
    let (device, _) = ready_grbl();
    let limits = device.get_axis_limits(Axis::Z);
    assert_eq!(limits.max_um, 10000.0);
    let steps = device.get_step_limits(Axis::Z).unwrap();
    assert_eq!((steps.min, steps.max), (0, 2500));
}

#[test]
fn test_shutdown_requires_port_again() {
    let (mut device, _) = ready_grbl();
    device.shutdown();
    assert_eq!(device.state(), DeviceState::Uninitialized);
    assert_eq!(device.initialize().unwrap_err(), StageError::NoPortConfigured);

    device.set_port("/dev/ttyUSB0").unwrap();
    device.initialize().unwrap();
    assert_eq!(device.state(), DeviceState::Ready);
}

#[test]
fn test_detect_device() {
    let sim = SimulatedController::tinyg();
    let handle = sim.handle();
    let device = StageDevice::with_opener(fast_config("COM3"), handle.opener());
    assert_eq!(device.detect_device(), DetectionStatus::CanCommunicate);
    assert_eq!(device.state(), DeviceState::PortConfigured);
}
