//! End-to-end tests of the stage device against the simulated controller.

mod busy;
mod device;
mod listeners;

use stagekit_communication::{SimulatedController, SimulatorHandle, StageDevice};
use stagekit_settings::Config;

pub fn fast_config(port: &str) -> Config {
    let mut config = Config::default();
    config.connection.port = port.to_string();
    config.connection.open_settle_ms = 0;
    config.timeouts.normal_ms = 40;
    config.timeouts.status_ms = 40;
    config.timeouts.config_ms = 40;
    config.timeouts.extended_ms = 40;
    config.timeouts.move_ms = 40;
    config.timeouts.reset_settle_ms = 1;
    config.timeouts.reset_read_ms = 20;
    config.timeouts.inter_line_ms = 5;
    config
}

pub fn ready(sim: SimulatedController, config: Config) -> (StageDevice, SimulatorHandle) {
    let handle = sim.handle();
    let mut device = StageDevice::with_opener(config, handle.opener());
    device.initialize().expect("simulator should initialize");
    (device, handle)
}

pub fn ready_grbl() -> (StageDevice, SimulatorHandle) {
    ready(SimulatedController::grbl(), fast_config("/dev/ttyUSB0"))
}
