use crate::{fast_config, ready};
use stagekit_communication::SimulatedController;
use stagekit_settings::BusyDetection;
use std::thread;
use std::time::Duration;

#[test]
fn test_estimate_busy_and_stop() {
    let mut config = fast_config("/dev/ttyUSB0");
    config.polling.busy_detection = BusyDetection::Estimate;
    config.machine.velocity_mm_per_s = 1.0;
    let (device, handle) = ready(SimulatedController::grbl(), config);

    assert!(!device.is_busy());
    device.move_absolute_steps(250, 0).unwrap();
    handle.clear_written();
    assert!(device.is_busy());
    assert!(handle.written().is_empty());

    device.stop().unwrap();
    assert!(!device.is_busy());
}

#[test]
fn test_status_busy_follows_machine_state() {
    let mut config = fast_config("/dev/ttyUSB0");
    config.polling.busy_detection = BusyDetection::Status;
    let (device, handle) = ready(SimulatedController::grbl(), config);
    handle.set_motion_time(Duration::from_millis(150));

    device.move_relative_steps(25, 25).unwrap();
    assert!(device.is_busy());
    thread::sleep(Duration::from_millis(200));
    assert!(!device.is_busy());
}

#[test]
fn test_busy_falls_back_to_estimate_when_status_fails() {
    let mut config = fast_config("/dev/ttyUSB0");
    config.machine.velocity_mm_per_s = 0.5;
    let (device, handle) = ready(SimulatedController::grbl(), config);

    device.move_absolute_steps(500, 500).unwrap();
    handle.set_status_override(Some("<garbage>".to_string()));
    assert!(device.is_busy());
}

#[test]
fn test_background_polling_feeds_busy_cache() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let mut config = fast_config("/dev/ttyUSB0");
    config.polling.enabled = true;
    config.polling.interval_ms = 10;
    let (mut device, handle) = ready(SimulatedController::grbl(), config);
    assert!(device.is_polling());

    handle.set_motion_time(Duration::from_millis(100));
    device.move_absolute_steps(250, 250).unwrap();
    thread::sleep(Duration::from_millis(40));
    assert!(device.is_busy());

    thread::sleep(Duration::from_millis(150));
    assert!(!device.is_busy());

    let polls = handle.count_written("?");
    assert!(polls >= 3);

    device.shutdown();
    assert!(!device.is_polling());
}
