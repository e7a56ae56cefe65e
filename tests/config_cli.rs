//! Configuration files driving the stage through the public facade

use stagekit::{BusyDetection, Config, DetectionStatus, SimulatedController, StageDevice};
use tempfile::TempDir;

#[test]
fn test_saved_config_drives_simulated_stage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stage.toml");

    let mut config = Config::default();
    config.connection.port = "/dev/ttyUSB3".to_string();
    config.connection.open_settle_ms = 0;
    config.timeouts.inter_line_ms = 5;
    config.polling.busy_detection = BusyDetection::Status;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);

    let simulator = SimulatedController::grbl();
    let handle = simulator.handle();
    let mut device = StageDevice::with_opener(loaded, handle.opener());
    assert_eq!(device.detect_device(), DetectionStatus::CanCommunicate);

    device.initialize().unwrap();
    device.move_absolute_steps(2500, 250).unwrap();
    assert!(!device.is_busy());
    assert_eq!(device.get_position_steps().unwrap(), (2500, 250));
}

#[test]
fn test_build_metadata() {
    assert!(!stagekit::VERSION.is_empty());
    assert!(stagekit::BUILD_DATE.ends_with("UTC"));
}
