//! Stage device
//!
//! The surface a device host drives: lifecycle (`initialize`/`shutdown`),
//! XY and Z motion in steps or micrometers, busy detection, parameter
//! access and the named property table.
//!
//! Lifecycle:
//! ```text
//! Uninitialized --Port set--> PortConfigured --initialize--> Ready
//!       ^                                                      |
//!       +------------------------ shutdown --------------------+
//! ```
//! Anything that talks to the controller requires `Ready` and otherwise
//! fails with [`StageError::NoPortConfigured`] without touching the wire.

use crate::communication::engine::{CommandEngine, TimeoutPolicy};
use crate::communication::poller::{StatusCallback, StatusPoller};
use crate::communication::{serial_opener, ConnectionParams, TransportOpener};
use crate::firmware::codec::{
    build_home, build_parameter_query, build_parameter_set, build_raw, build_reset,
    build_status_query, build_sync_set, CommandLine,
};
use crate::firmware::probe::{self, detect_controller, FirmwareIdentity};
use crate::firmware::{ControllerType, FirmwareParameter, ParameterTable};
use crate::stage::listener::{ListenerRegistry, StageListener, StageListenerHandle};
use crate::stage::properties::{parse_number, parse_positive, StageProperty, COMMAND_ERROR_VALUE};
use crate::stage::tracker::MovePlan;
use stagekit_core::{
    Axis, AxisLimits, CoordinateMode, DeviceState, LineTerminator, Result, StageError,
    StatusSnapshot, StepConversion, StepLimits,
};
use stagekit_settings::{BusyDetection, Config};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of [`StageDevice::detect_device`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    /// A controller answered a status request
    CanCommunicate,
    /// The port opened (or not) but nothing answered
    CanNotCommunicate,
    /// No usable port name is configured
    Misconfigured,
}

/// Grbl/TinyG XY + Z stage
pub struct StageDevice {
    config: Config,
    opener: TransportOpener,
    engine: Arc<CommandEngine>,
    listeners: Arc<ListenerRegistry>,
    state: DeviceState,
    identity: Option<FirmwareIdentity>,
    parameters: ParameterTable,
    poller: Option<StatusPoller>,
    acceleration: f64,
    sync_step: f64,
    command_result: String,
}

impl StageDevice {
    /// Create a device that opens real serial ports
    pub fn new(config: Config) -> Self {
        Self::with_opener(config, serial_opener())
    }

    /// Create a device with a custom transport factory
    pub fn with_opener(config: Config, opener: TransportOpener) -> Self {
        let engine = Arc::new(CommandEngine::new(TimeoutPolicy::from_settings(
            &config.timeouts,
        )));
        engine
            .tracker()
            .write()
            .set_velocity(config.machine.velocity_mm_per_s);

        let state = if config.connection.has_port() {
            DeviceState::PortConfigured
        } else {
            DeviceState::Uninitialized
        };

        Self {
            acceleration: config.machine.acceleration,
            sync_step: config.machine.sync_step,
            config,
            opener,
            engine,
            listeners: Arc::new(ListenerRegistry::new()),
            state,
            identity: None,
            parameters: ParameterTable::new(),
            poller: None,
            command_result: String::new(),
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared command engine
    pub fn engine(&self) -> Arc<CommandEngine> {
        self.engine.clone()
    }

    /// Firmware identity, once initialized
    pub fn identity(&self) -> Option<&FirmwareIdentity> {
        self.identity.as_ref()
    }

    fn require_ready(&self) -> Result<ControllerType> {
        match (&self.identity, self.state) {
            (Some(identity), DeviceState::Ready) => Ok(identity.controller),
            _ => Err(StageError::NoPortConfigured),
        }
    }

    // ---- lifecycle -------------------------------------------------------

    /// Select the serial port
    ///
    /// A blank, "undefined" or "unknown" name leaves the device unconfigured.
    pub fn set_port(&mut self, port: &str) -> Result<()> {
        if self.state == DeviceState::Ready {
            return Err(StageError::InvalidPropertyValue {
                name: StageProperty::Port.name().to_string(),
                value: port.to_string(),
            });
        }
        self.config.connection.port = port.trim().to_string();
        self.state = if self.config.connection.has_port() {
            DeviceState::PortConfigured
        } else {
            DeviceState::Uninitialized
        };
        tracing::info!("Port set to {:?} ({})", self.config.connection.port, self.state);
        Ok(())
    }

    /// Open the port, identify the firmware and load its parameters
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Ready => return Ok(()),
            DeviceState::Uninitialized => return Err(StageError::NoPortConfigured),
            DeviceState::PortConfigured => {}
        }

        let params = ConnectionParams::from_settings(&self.config.connection);
        tracing::info!("Initializing stage on {}", params.port);

        let mut transport = (self.opener)(&params)?;
        transport.configure(&params)?;

        self.engine
            .set_timeouts(TimeoutPolicy::from_settings(&self.config.timeouts));
        {
            let tracker = self.engine.tracker();
            let mut tracker = tracker.write();
            tracker.reset();
            tracker.set_velocity(self.config.machine.velocity_mm_per_s);
        }
        self.engine.attach(transport);

        let settle = Duration::from_millis(self.config.connection.open_settle_ms);
        if !settle.is_zero() {
            tracing::debug!("Waiting {:?} for the controller to boot", settle);
            std::thread::sleep(settle);
        }

        match self.bring_up() {
            Ok(identity) => {
                tracing::info!(
                    "Stage ready: {} {} on {}",
                    identity.controller,
                    identity.version,
                    params.port
                );
                self.identity = Some(identity);
                self.state = DeviceState::Ready;
                if self.config.polling.enabled {
                    if let Err(e) = self.start_polling() {
                        tracing::warn!("Status polling disabled: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!("Initialization failed: {}", e);
                self.engine.detach();
                Err(e)
            }
        }
    }

    fn bring_up(&mut self) -> Result<FirmwareIdentity> {
        let forced = self.config.connection.terminator;
        self.engine
            .set_terminator(forced.unwrap_or(LineTerminator::CrLf));

        let identity = probe::probe(&self.engine, self.config.firmware.firmware)?;
        self.engine
            .set_terminator(forced.unwrap_or(identity.controller.default_terminator()));

        self.load_parameters(identity.controller)?;
        self.engine.ensure_mode(CoordinateMode::Absolute)?;

        let snapshot = self
            .engine
            .query_status(&build_status_query(identity.controller))?;
        self.listeners.notify_status(&snapshot.state);
        Ok(identity)
    }

    fn load_parameters(&mut self, controller: ControllerType) -> Result<()> {
        let outcome = self.engine.execute(&build_parameter_query())?;
        self.parameters = ParameterTable::parse(&outcome.reply);
        tracing::debug!("Loaded {} controller parameters", self.parameters.len());

        let conversion = match self.parameters.step_conversion(controller) {
            Ok(conversion) => conversion,
            Err(StageError::ConfigurationMissing { parameter }) => {
                let Some([x, y, z]) = self.config.firmware.fallback_step_size_um else {
                    return Err(StageError::ConfigurationMissing { parameter });
                };
                tracing::warn!(
                    "Parameter {} not reported, using configured step size",
                    parameter
                );
                StepConversion::step_size_um(x, y, z)?
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            "Step size {:.4} x {:.4} x {:.4} um ({})",
            conversion.step_size_um_for(Axis::X),
            conversion.step_size_um_for(Axis::Y),
            conversion.step_size_um_for(Axis::Z),
            conversion.convention()
        );
        self.engine.tracker().write().set_conversion(Some(conversion));
        Ok(())
    }

    /// Stop polling, release the port and return to `Uninitialized`
    pub fn shutdown(&mut self) {
        self.stop_polling();
        if self.engine.detach().is_some() {
            tracing::info!("Stage shut down");
        }
        self.engine.tracker().write().reset();
        self.identity = None;
        self.state = DeviceState::Uninitialized;
    }

    /// Probe the configured port without initializing
    pub fn detect_device(&self) -> DetectionStatus {
        if !self.config.connection.has_port() {
            return DetectionStatus::Misconfigured;
        }
        if self.state == DeviceState::Ready {
            return DetectionStatus::CanCommunicate;
        }

        let params = ConnectionParams::from_settings(&self.config.connection);
        let transport = match (self.opener)(&params) {
            Ok(mut transport) => match transport.configure(&params) {
                Ok(()) => transport,
                Err(e) => {
                    tracing::debug!("Detection could not configure {}: {}", params.port, e);
                    return DetectionStatus::CanNotCommunicate;
                }
            },
            Err(e) => {
                tracing::debug!("Detection could not open {}: {}", params.port, e);
                return DetectionStatus::CanNotCommunicate;
            }
        };

        let engine = CommandEngine::new(TimeoutPolicy::from_settings(&self.config.timeouts));
        engine.set_terminator(self.config.connection.terminator.unwrap_or(LineTerminator::CrLf));
        engine.attach(transport);
        std::thread::sleep(Duration::from_millis(self.config.connection.open_settle_ms));

        match detect_controller(&engine, self.config.firmware.firmware)
            .and_then(|controller| engine.query_status(&build_status_query(controller)))
        {
            Ok(_) => DetectionStatus::CanCommunicate,
            Err(e) => {
                tracing::debug!("Detection on {} failed: {}", params.port, e);
                DetectionStatus::CanNotCommunicate
            }
        }
    }

    // ---- status polling --------------------------------------------------

    /// Start the background status poller (needs a tokio runtime)
    pub fn start_polling(&mut self) -> Result<()> {
        let controller = self.require_ready()?;
        self.stop_polling();

        let listeners = self.listeners.clone();
        let callback: StatusCallback =
            Arc::new(move |snapshot: &StatusSnapshot| listeners.notify_status(&snapshot.state));

        self.poller = Some(StatusPoller::start(
            self.engine.clone(),
            build_status_query(controller),
            Duration::from_millis(self.config.polling.interval_ms),
            Some(callback),
        )?);
        Ok(())
    }

    /// Stop the background status poller
    pub fn stop_polling(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
    }

    /// True while the poller task runs
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(StatusPoller::is_running)
    }

    // ---- listeners -------------------------------------------------------

    /// Register a listener
    pub fn register_listener(&self, listener: Arc<dyn StageListener>) -> StageListenerHandle {
        self.listeners.register(listener)
    }

    /// Remove a listener
    pub fn unregister_listener(&self, handle: &StageListenerHandle) -> bool {
        self.listeners.unregister(handle)
    }

    // ---- status ----------------------------------------------------------

    /// Query the controller and refresh the cached position and state
    pub fn query_status(&self) -> Result<StatusSnapshot> {
        let controller = self.require_ready()?;
        let snapshot = self.engine.query_status(&build_status_query(controller))?;
        self.listeners.notify_status(&snapshot.state);
        Ok(snapshot)
    }

    /// Whether the stage is still moving
    ///
    /// Never fails: without a usable status the distance/velocity estimate
    /// decides.
    pub fn is_busy(&self) -> bool {
        if self.require_ready().is_err() {
            return false;
        }
        let tracker = self.engine.tracker();

        match self.config.polling.busy_detection {
            BusyDetection::Estimate => tracker.read().estimate_busy(),
            BusyDetection::Auto if self.is_polling() => tracker.read().cached_busy(),
            BusyDetection::Auto | BusyDetection::Status => match self.query_status() {
                Ok(snapshot) => !snapshot.is_idle(),
                Err(e) => {
                    tracing::debug!("Busy check falls back to estimate: {}", e);
                    tracker.read().estimate_busy()
                }
            },
        }
    }

    fn conversion(&self) -> Result<StepConversion> {
        self.engine.tracker().read().conversion()
    }

    // ---- XY stage --------------------------------------------------------

    fn run_move(&self, plan: MovePlan) -> Result<MovePlan> {
        self.engine.run_move(&plan)?;
        Ok(plan)
    }

    /// Move to absolute step coordinates
    pub fn move_absolute_steps(&self, x: i64, y: i64) -> Result<()> {
        self.require_ready()?;
        let plan = self.engine.tracker().read().plan_xy_move(x, y, false)?;
        let plan = self.run_move(plan)?;
        self.listeners
            .notify_position(plan.target.x * 1000.0, plan.target.y * 1000.0);
        Ok(())
    }

    /// Move by a step offset
    pub fn move_relative_steps(&self, dx: i64, dy: i64) -> Result<()> {
        self.require_ready()?;
        let plan = self.engine.tracker().read().plan_xy_move(dx, dy, true)?;
        let plan = self.run_move(plan)?;
        self.listeners
            .notify_position(plan.target.x * 1000.0, plan.target.y * 1000.0);
        Ok(())
    }

    /// Move to absolute micrometer coordinates, rounded to whole steps
    pub fn set_position_um(&self, x_um: f64, y_um: f64) -> Result<()> {
        self.require_ready()?;
        let conversion = self.conversion()?;
        self.move_absolute_steps(
            conversion.um_to_steps(Axis::X, x_um),
            conversion.um_to_steps(Axis::Y, y_um),
        )
    }

    /// Current XY position in micrometers, refreshed from the controller
    pub fn get_position_um(&self) -> Result<(f64, f64)> {
        let snapshot = self.query_status()?;
        let position = snapshot.machine_position;
        Ok((position.x * 1000.0, position.y * 1000.0))
    }

    /// Current XY position in steps, refreshed from the controller
    pub fn get_position_steps(&self) -> Result<(i64, i64)> {
        let (x_um, y_um) = self.get_position_um()?;
        let conversion = self.conversion()?;
        Ok((
            conversion.um_to_steps(Axis::X, x_um),
            conversion.um_to_steps(Axis::Y, y_um),
        ))
    }

    /// Run the homing cycle
    pub fn home(&self) -> Result<()> {
        let controller = self.require_ready()?;
        tracing::info!("Homing");
        self.engine.home(&build_home(controller))?;
        Ok(())
    }

    /// Feed hold: stop motion immediately
    pub fn stop(&self) -> Result<()> {
        self.require_ready()?;
        tracing::info!("Stopping motion");
        self.engine.stop()
    }

    /// Soft-reset the controller
    pub fn reset(&self) -> Result<()> {
        self.require_ready()?;
        self.engine.execute(&build_reset())?;
        self.engine.tracker().write().mark_homed();
        Ok(())
    }

    /// Travel range of an axis, in micrometers
    pub fn get_axis_limits(&self, axis: Axis) -> AxisLimits {
        let machine = &self.config.machine;
        match axis {
            Axis::X => machine.x_limits,
            Axis::Y => machine.y_limits,
            Axis::Z => machine.z_limits,
        }
    }

    /// Travel range of an axis, in steps
    pub fn get_step_limits(&self, axis: Axis) -> Result<StepLimits> {
        let conversion = self
            .conversion()
            .map_err(|_| StageError::UnsupportedCommand {
                command: format!("step limits for {} (no step factor)", axis),
            })?;
        let limits = self.get_axis_limits(axis);
        Ok(StepLimits {
            min: conversion.um_to_steps(axis, limits.min_um),
            max: conversion.um_to_steps(axis, limits.max_um),
        })
    }

    // ---- Z stage ---------------------------------------------------------

    /// Move Z to an absolute step coordinate
    pub fn set_z_position_steps(&self, z: i64) -> Result<()> {
        self.require_ready()?;
        let plan = self.engine.tracker().read().plan_z_move(z, false)?;
        let plan = self.run_move(plan)?;
        self.listeners.notify_z_position(plan.target.z * 1000.0);
        Ok(())
    }

    /// Move Z by a step offset
    pub fn move_z_relative_steps(&self, dz: i64) -> Result<()> {
        self.require_ready()?;
        let plan = self.engine.tracker().read().plan_z_move(dz, true)?;
        let plan = self.run_move(plan)?;
        self.listeners.notify_z_position(plan.target.z * 1000.0);
        Ok(())
    }

    /// Move Z to an absolute micrometer coordinate, rounded to whole steps
    pub fn set_z_position_um(&self, z_um: f64) -> Result<()> {
        self.require_ready()?;
        let steps = self.conversion()?.um_to_steps(Axis::Z, z_um);
        self.set_z_position_steps(steps)
    }

    /// Current Z position in micrometers, refreshed from the controller
    pub fn get_z_position_um(&self) -> Result<f64> {
        Ok(self.query_status()?.machine_position.z * 1000.0)
    }

    /// Current Z position in steps, refreshed from the controller
    pub fn get_z_position_steps(&self) -> Result<i64> {
        let z_um = self.get_z_position_um()?;
        Ok(self.conversion()?.um_to_steps(Axis::Z, z_um))
    }

    // ---- parameters ------------------------------------------------------

    /// Controller parameters read at initialization
    pub fn get_parameters(&self) -> Result<Vec<FirmwareParameter>> {
        self.require_ready()?;
        Ok(self.parameters.iter().cloned().collect())
    }

    /// Re-read the parameter dump
    pub fn refresh_parameters(&mut self) -> Result<()> {
        let controller = self.require_ready()?;
        self.load_parameters(controller)
    }

    /// Store a controller parameter (`$key=value`)
    ///
    /// The cached table, and the step conversion if it depends on the key,
    /// follow on success.
    pub fn set_parameter(&mut self, key: &str, value: &str) -> Result<()> {
        let controller = self.require_ready()?;
        self.execute_checked(&build_parameter_set(key, value))?;
        self.parameters.set(key, value);

        if let Ok(conversion) = self.parameters.step_conversion(controller) {
            self.engine.tracker().write().set_conversion(Some(conversion));
        }
        Ok(())
    }

    /// Configure the sync pulse step on an axis (`M108`)
    pub fn set_sync(&mut self, axis: u8, value: f64) -> Result<()> {
        self.require_ready()?;
        self.execute_checked(&build_sync_set(axis, value))?;
        self.sync_step = value;
        Ok(())
    }

    /// Send a raw command and return the controller's reply
    pub fn execute_command(&self, command: &str) -> Result<String> {
        self.require_ready()?;
        let outcome = self.engine.execute(&build_raw(command))?;
        Ok(outcome.reply)
    }

    fn execute_checked(&self, command: &CommandLine) -> Result<()> {
        let outcome = self.engine.execute(command)?;
        if outcome.is_error_reply() {
            return Err(StageError::CommandRejected {
                command: command.text(),
                reply: outcome.reply,
            });
        }
        Ok(())
    }

    // ---- properties ------------------------------------------------------

    /// Read a property by name
    pub fn get_property(&self, name: &str) -> Result<String> {
        let property: StageProperty = name.parse()?;
        let value = match property {
            StageProperty::Port => self.config.connection.port.clone(),
            StageProperty::Version => self
                .identity
                .as_ref()
                .map(|identity| identity.version.clone())
                .unwrap_or_default(),
            StageProperty::Status => self.engine.tracker().read().state().to_string(),
            StageProperty::StepSizeXUm => self.conversion()?.step_size_um_for(Axis::X).to_string(),
            StageProperty::StepSizeYUm => self.conversion()?.step_size_um_for(Axis::Y).to_string(),
            StageProperty::MaxVelocity => self.config.machine.velocity_mm_per_s.to_string(),
            StageProperty::Acceleration => self.acceleration.to_string(),
            StageProperty::MoveTimeoutMs => self.config.timeouts.move_ms.to_string(),
            StageProperty::SyncStep => self.sync_step.to_string(),
            StageProperty::Command => self.command_result.clone(),
        };
        Ok(value)
    }

    /// Write a property by name
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        let property: StageProperty = name.parse()?;

        match property {
            StageProperty::Port => self.set_port(value),
            StageProperty::MaxVelocity => {
                let velocity = parse_positive(property, value)?;
                self.config.machine.velocity_mm_per_s = velocity;
                self.engine.tracker().write().set_velocity(velocity);
                Ok(())
            }
            StageProperty::Acceleration => {
                self.acceleration = parse_positive(property, value)?;
                self.config.machine.acceleration = self.acceleration;
                Ok(())
            }
            StageProperty::MoveTimeoutMs => {
                let millis = parse_positive(property, value)?.round() as u64;
                self.config.timeouts.move_ms = millis;
                self.engine.set_move_timeout(Duration::from_millis(millis));
                Ok(())
            }
            StageProperty::SyncStep => {
                let step = parse_number(property, value)?;
                self.set_sync(self.config.machine.sync_axis, step)
            }
            StageProperty::Command => {
                if value == self.command_result {
                    return Ok(());
                }
                match self.execute_command(value) {
                    Ok(reply) => {
                        self.command_result = reply;
                        Ok(())
                    }
                    Err(e) => {
                        tracing::warn!("Command {:?} failed: {}", value, e);
                        self.command_result = COMMAND_ERROR_VALUE.to_string();
                        Err(e)
                    }
                }
            }
            StageProperty::Version
            | StageProperty::Status
            | StageProperty::StepSizeXUm
            | StageProperty::StepSizeYUm => Err(StageError::ReadOnlyProperty {
                name: property.name().to_string(),
            }),
        }
    }
}

impl Drop for StageDevice {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::simulator::{SimulatedController, SimulatorHandle};

    fn test_config(port: &str) -> Config {
        let mut config = Config::default();
        config.connection.port = port.to_string();
        config.connection.open_settle_ms = 0;
        config.timeouts.normal_ms = 50;
        config.timeouts.status_ms = 50;
        config.timeouts.config_ms = 50;
        config.timeouts.move_ms = 50;
        config.timeouts.inter_line_ms = 5;
        config.timeouts.reset_settle_ms = 1;
        config.timeouts.reset_read_ms = 20;
        config
    }

    fn ready_device(sim: SimulatedController) -> (StageDevice, SimulatorHandle) {
        let handle = sim.handle();
        let mut device = StageDevice::with_opener(test_config("/dev/ttyUSB0"), handle.opener());
        device.initialize().unwrap();
        (device, handle)
    }

    #[test]
    fn test_lifecycle() {
        let handle = SimulatedController::grbl().handle();
        let mut device = StageDevice::with_opener(test_config("Undefined"), handle.opener());
        assert_eq!(device.state(), DeviceState::Uninitialized);
        assert_eq!(device.initialize().unwrap_err(), StageError::NoPortConfigured);

        device.set_property("Port", "/dev/ttyACM0").unwrap();
        assert_eq!(device.state(), DeviceState::PortConfigured);
        device.initialize().unwrap();
        assert_eq!(device.state(), DeviceState::Ready);
        assert_eq!(device.identity().unwrap().controller, ControllerType::Grbl);
        assert_eq!(device.get_property("Version").unwrap(), "0.9j.20160726");

        device.shutdown();
        assert_eq!(device.state(), DeviceState::Uninitialized);
        assert_eq!(device.move_absolute_steps(1, 1).unwrap_err(), StageError::NoPortConfigured);
    }

    #[test]
    fn test_initialize_sends_g90_and_loads_parameters() {
        let (device, handle) = ready_device(SimulatedController::grbl());
        assert_eq!(handle.count_written("G90"), 1);
        assert_eq!(handle.count_written("$$"), 1);
        assert_eq!(device.get_property("StepSizeXUm").unwrap(), "4");
        assert_eq!(device.get_parameters().unwrap().len(), 6);
    }

    #[test]
    fn test_tinyg_initialization() {
        let (device, handle) = ready_device(SimulatedController::tinyg());
        assert_eq!(device.identity().unwrap().controller, ControllerType::TinyG);
        assert_eq!(device.identity().unwrap().version, "0.970");
        assert_eq!(device.engine().terminator(), LineTerminator::CrLf);
        assert!(handle.count_written("$sr") >= 1);
        let step = device.get_property("StepSizeXUm").unwrap().parse::<f64>().unwrap();
        assert!((step - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_mode_switch_failure_aborts_move() {
        let (device, handle) = ready_device(SimulatedController::grbl());
        handle.reject("G91");
        handle.clear_written();

        let err = device.move_relative_steps(10, 10).unwrap_err();
        assert!(matches!(err, StageError::ModeSwitchFailed { .. }));
        assert_eq!(handle.written(), vec!["G91"]);
        assert_eq!(
            device.engine().tracker().read().mode(),
            CoordinateMode::Absolute
        );
    }

    #[test]
    fn test_home_reasserts_mode() {
        let (device, handle) = ready_device(SimulatedController::grbl());
        device.move_absolute_steps(250, 250).unwrap();
        device.home().unwrap();
        device.move_absolute_steps(500, 500).unwrap();
        assert_eq!(handle.count_written("$H"), 1);
        assert_eq!(handle.count_written("G90"), 2);
    }

    #[test]
    fn test_step_limits() {
        let (device, _) = ready_device(SimulatedController::grbl());
        let limits = device.get_step_limits(Axis::X).unwrap();
        assert_eq!(limits, StepLimits { min: 0, max: 5000 });

        let handle = SimulatedController::grbl().handle();
        let idle = StageDevice::with_opener(test_config("/dev/ttyUSB0"), handle.opener());
        assert!(matches!(
            idle.get_step_limits(Axis::Y),
            Err(StageError::UnsupportedCommand { .. })
        ));
    }

    #[test]
    fn test_command_property() {
        let (mut device, handle) = ready_device(SimulatedController::grbl());
        device.set_property("Command", "$I").unwrap();
        assert_eq!(device.get_property("Command").unwrap(), "[0.9j.20160726:]");

        handle.clear_written();
        device.set_property("Command", "[0.9j.20160726:]").unwrap();
        assert!(handle.written().is_empty());

        handle.set_silent(true);
        assert!(device.set_property("Command", "G4 P1").is_err());
        assert_eq!(device.get_property("Command").unwrap(), COMMAND_ERROR_VALUE);
    }

    #[test]
    fn test_property_errors() {
        let (mut device, _) = ready_device(SimulatedController::grbl());
        assert!(matches!(
            device.set_property("Version", "2"),
            Err(StageError::ReadOnlyProperty { .. })
        ));
        assert!(matches!(
            device.set_property("MaxVelocity", "-1"),
            Err(StageError::InvalidPropertyValue { .. })
        ));
        assert!(matches!(
            device.get_property("Bogus"),
            Err(StageError::UnknownProperty { .. })
        ));
        assert!(device.set_property("Port", "/dev/ttyUSB1").is_err());
    }

    #[test]
    fn test_sync_step_property() {
        let (mut device, handle) = ready_device(SimulatedController::grbl());
        device.set_property("SyncStep", "2.5").unwrap();
        assert_eq!(handle.count_written("M108P2.5Q0"), 1);
        assert_eq!(device.get_property("SyncStep").unwrap(), "2.5");
    }

    #[test]
    fn test_move_timeout_property() {
        let (mut device, _) = ready_device(SimulatedController::grbl());
        device.set_property("MoveTimeoutMs", "1500").unwrap();
        assert_eq!(device.get_property("MoveTimeoutMs").unwrap(), "1500");
        assert_eq!(
            device.engine().timeouts().move_ack,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_set_parameter_updates_conversion() {
        let (mut device, _) = ready_device(SimulatedController::grbl());
        device.set_parameter("100", "500").unwrap();
        assert_eq!(device.get_property("StepSizeXUm").unwrap(), "2");
        assert!(matches!(
            device.set_parameter("999", "1"),
            Err(StageError::CommandRejected { .. })
        ));
    }

    #[test]
    fn test_detect_device() {
        let handle = SimulatedController::grbl().handle();
        let device = StageDevice::with_opener(test_config("unknown"), handle.opener());
        assert_eq!(device.detect_device(), DetectionStatus::Misconfigured);

        let device = StageDevice::with_opener(test_config("COM4"), handle.opener());
        assert_eq!(device.detect_device(), DetectionStatus::CanCommunicate);

        handle.set_silent(true);
        assert_eq!(device.detect_device(), DetectionStatus::CanNotCommunicate);
    }
}
