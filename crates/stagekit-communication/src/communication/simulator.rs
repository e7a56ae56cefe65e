//! Simulated controller
//!
//! An in-process [`Transport`] that answers like a Grbl or TinyG board:
//! status reports, parameter dumps, version queries, homing, `G90`/`G91`
//! mode tracking and `G0` moves. Every line written is recorded so callers
//! can inspect the exact wire traffic through a [`SimulatorHandle`].

use crate::communication::{ConnectionParams, Transport, TransportOpener};
use crate::firmware::codec::{FEED_HOLD_BYTE, RESET_BYTE};
use crate::firmware::ControllerType;
use parking_lot::Mutex;
use stagekit_core::{Axis, CoordinateMode, LineTerminator, Position, Result, StageError};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TINYG_PROMPT: &str = "tinyg [mm] ok>";

#[derive(Debug)]
struct SimulatorState {
    controller: ControllerType,
    position: Position,
    mode: CoordinateMode,
    parameters: Vec<(String, String, String)>,
    written: Vec<String>,
    silent: bool,
    status_override: Option<String>,
    rejected: HashSet<String>,
    motion_time: Duration,
    moving_until: Option<Instant>,
}

impl SimulatorState {
    fn new(controller: ControllerType) -> Self {
        let parameters = match controller {
            ControllerType::Grbl => vec![
                ("0", "10", "step pulse, usec"),
                ("100", "250.000", "x, step/mm"),
                ("101", "250.000", "y, step/mm"),
                ("102", "250.000", "z, step/mm"),
                ("110", "500.000", "x max rate, mm/min"),
                ("111", "500.000", "y max rate, mm/min"),
            ],
            ControllerType::TinyG => vec![
                ("1ma", "0", "m1 map to axis"),
                ("1sa", "1.800", "m1 step angle"),
                ("1tr", "40.000", "m1 travel per revolution"),
                ("1mi", "8", "m1 microsteps"),
                ("2ma", "1", "m2 map to axis"),
                ("2sa", "1.800", "m2 step angle"),
                ("2tr", "40.000", "m2 travel per revolution"),
                ("2mi", "8", "m2 microsteps"),
                ("3ma", "2", "m3 map to axis"),
                ("3sa", "1.800", "m3 step angle"),
                ("3tr", "1.250", "m3 travel per revolution"),
                ("3mi", "4", "m3 microsteps"),
            ],
        }
        .into_iter()
        .map(|(k, v, d)| (k.to_string(), v.to_string(), d.to_string()))
        .collect();

        Self {
            controller,
            position: Position::default(),
            mode: CoordinateMode::Absolute,
            parameters,
            written: Vec::new(),
            silent: false,
            status_override: None,
            rejected: HashSet::new(),
            motion_time: Duration::ZERO,
            moving_until: None,
        }
    }

    fn ack(&self) -> String {
        match self.controller {
            ControllerType::Grbl => "ok".to_string(),
            ControllerType::TinyG => TINYG_PROMPT.to_string(),
        }
    }

    fn error(&self, code: u8) -> String {
        match self.controller {
            ControllerType::Grbl => format!("error:{}", code),
            ControllerType::TinyG => format!("error: code {}", code),
        }
    }

    fn machine_state(&self) -> &'static str {
        let moving = self
            .moving_until
            .is_some_and(|until| Instant::now() < until);
        match (self.controller, moving) {
            (_, true) => "Run",
            (ControllerType::Grbl, false) => "Idle",
            (ControllerType::TinyG, false) => "Stop",
        }
    }

    fn compact_status(&self) -> Vec<String> {
        let p = self.position;
        vec![format!(
            "<{},MPos:{:.3},{:.3},{:.3},WPos:{:.3},{:.3},{:.3}>",
            self.machine_state(),
            p.x,
            p.y,
            p.z,
            p.x,
            p.y,
            p.z
        )]
    }

    fn verbose_status(&self) -> Vec<String> {
        let p = self.position;
        let distance = match self.mode {
            CoordinateMode::Relative => "G91 - incremental distance",
            _ => "G90 - absolute distance",
        };
        vec![
            format!("{:<21}{:.3} mm", "X position:", p.x),
            format!("{:<21}{:.3} mm", "Y position:", p.y),
            format!("{:<21}{:.3} mm", "Z position:", p.z),
            format!("{:<21}{:.3} mm/min", "Velocity:", 0.0),
            format!("{:<21}{}", "Units:", "G21 - millimeter mode"),
            format!("{:<21}{}", "Coordinate system:", "G54"),
            format!("{:<21}{}", "Distance mode:", distance),
            format!("{:<21}{}", "Machine state:", self.machine_state()),
            TINYG_PROMPT.to_string(),
        ]
    }

    fn status(&self) -> Vec<String> {
        if let Some(reply) = &self.status_override {
            return reply.lines().map(str::to_string).collect();
        }
        match self.controller {
            ControllerType::Grbl => self.compact_status(),
            ControllerType::TinyG => self.verbose_status(),
        }
    }

    fn dump(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .parameters
            .iter()
            .map(|(key, value, description)| match self.controller {
                ControllerType::Grbl => format!("${}={} ({})", key, value, description),
                ControllerType::TinyG => format!("[{}] {:<30}{}", key, description, value),
            })
            .collect();
        lines.push(self.ack());
        lines
    }

    fn store_parameter(&mut self, key: &str, value: &str) -> bool {
        match self.parameters.iter_mut().find(|(k, _, _)| k == key) {
            Some(entry) => {
                entry.1 = value.to_string();
                true
            }
            None => false,
        }
    }

    fn run_move(&mut self, words: &str) -> Vec<String> {
        let mut target = self.position;
        for word in words.split_whitespace() {
            let mut chars = word.chars();
            let axis = match chars.next() {
                Some('X') => Axis::X,
                Some('Y') => Axis::Y,
                Some('Z') => Axis::Z,
                _ => return vec![self.error(20)],
            };
            let Ok(value) = chars.as_str().parse::<f64>() else {
                return vec![self.error(2)];
            };
            match self.mode {
                CoordinateMode::Relative => target.set(axis, target.get(axis) + value),
                _ => target.set(axis, value),
            }
        }
        self.position = target;
        if !self.motion_time.is_zero() {
            self.moving_until = Some(Instant::now() + self.motion_time);
        }
        vec![self.ack()]
    }

    fn home(&mut self) -> Vec<String> {
        self.position.x = 0.0;
        self.position.y = 0.0;
        self.moving_until = None;
        vec![self.ack()]
    }

    fn respond(&mut self, line: &str) -> Vec<String> {
        if self.rejected.contains(line) {
            return vec![self.error(9)];
        }

        let grbl = self.controller == ControllerType::Grbl;
        match line {
            "" => vec![self.ack()],
            "?" => self.status(),
            "$sr" if !grbl => self.status(),
            "$$" => self.dump(),
            "$I" if grbl => vec!["[0.9j.20160726:]".to_string(), self.ack()],
            "$fv" if !grbl => vec![
                "[fv]  firmware version            0.970".to_string(),
                self.ack(),
            ],
            "$H" if grbl => self.home(),
            "G28.2 X0 Y0" if !grbl => self.home(),
            "G90" => {
                self.mode = CoordinateMode::Absolute;
                vec![self.ack()]
            }
            "G91" => {
                self.mode = CoordinateMode::Relative;
                vec![self.ack()]
            }
            _ if line.starts_with("G0 ") => self.run_move(&line[3..]),
            _ if line.starts_with("M108") => vec![self.ack()],
            _ if line.starts_with('$') && line.contains('=') => {
                let (key, value) = line[1..].split_once('=').unwrap_or_default();
                if self.store_parameter(key, value) {
                    vec![self.ack()]
                } else {
                    vec![self.error(3)]
                }
            }
            _ => vec![self.error(20)],
        }
    }

    fn realtime(&mut self, byte: u8) -> Vec<String> {
        match byte {
            RESET_BYTE => {
                self.moving_until = None;
                match self.controller {
                    ControllerType::Grbl => vec!["Grbl 0.9j ['$' for help]".to_string()],
                    ControllerType::TinyG => vec![
                        "[TinyG] Ready".to_string(),
                        TINYG_PROMPT.to_string(),
                    ],
                }
            }
            FEED_HOLD_BYTE => {
                self.moving_until = None;
                Vec::new()
            }
            b'?' => self.status(),
            _ => Vec::new(),
        }
    }
}

/// Inspection and fault-injection handle onto a [`SimulatedController`]
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimulatorState>>,
}

impl SimulatorHandle {
    /// Lines written so far, in order; raw bytes appear as `0xNN`
    pub fn written(&self) -> Vec<String> {
        self.state.lock().written.clone()
    }

    /// How many times exactly `line` was written
    pub fn count_written(&self, line: &str) -> usize {
        self.state
            .lock()
            .written
            .iter()
            .filter(|written| written.as_str() == line)
            .count()
    }

    /// Forget recorded traffic
    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    /// Simulated machine position, in millimeters
    pub fn position(&self) -> Position {
        self.state.lock().position
    }

    /// Place the machine, in millimeters
    pub fn set_position(&self, x: f64, y: f64, z: f64) {
        self.state.lock().position = Position::new(x, y, z);
    }

    /// Mode the simulated controller is in
    pub fn mode(&self) -> CoordinateMode {
        self.state.lock().mode
    }

    /// Stop answering; reads time out
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Answer status requests with a fixed reply
    pub fn set_status_override(&self, reply: Option<String>) {
        self.state.lock().status_override = reply;
    }

    /// Answer this exact line with an error
    pub fn reject(&self, line: impl Into<String>) {
        self.state.lock().rejected.insert(line.into());
    }

    /// Report `Run` for this long after every move
    pub fn set_motion_time(&self, duration: Duration) {
        self.state.lock().motion_time = duration;
    }

    /// Opener whose transports all talk to this simulator
    pub fn opener(&self) -> TransportOpener {
        let state = self.state.clone();
        Arc::new(move |params: &ConnectionParams| {
            tracing::debug!("Opening simulator for {}", params.port);
            Ok(Box::new(SimulatedController {
                state: state.clone(),
                answer_timeout: Duration::from_millis(300),
                outbox: VecDeque::new(),
            }) as Box<dyn Transport>)
        })
    }
}

/// Simulated Grbl/TinyG controller
#[derive(Debug)]
pub struct SimulatedController {
    state: Arc<Mutex<SimulatorState>>,
    answer_timeout: Duration,
    outbox: VecDeque<String>,
}

impl SimulatedController {
    /// Create a simulator with the given personality
    pub fn new(controller: ControllerType) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulatorState::new(controller))),
            answer_timeout: Duration::from_millis(300),
            outbox: VecDeque::new(),
        }
    }

    /// Grbl personality (compact status, 250 steps/mm)
    pub fn grbl() -> Self {
        Self::new(ControllerType::Grbl)
    }

    /// TinyG personality (verbose status, 25 um steps on X and Y)
    pub fn tinyg() -> Self {
        Self::new(ControllerType::TinyG)
    }

    /// Handle sharing this simulator's state
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            state: self.state.clone(),
        }
    }

    fn timed_out(&self) -> StageError {
        std::thread::sleep(self.answer_timeout);
        StageError::TransportReadTimeout {
            timeout_ms: self.answer_timeout.as_millis() as u64,
        }
    }
}

impl Transport for SimulatedController {
    fn name(&self) -> String {
        format!("simulated {}", self.state.lock().controller)
    }

    fn configure(&mut self, params: &ConnectionParams) -> Result<()> {
        tracing::debug!(
            "Simulator configured for {} baud, {} stop bit(s)",
            params.baud_rate,
            params.stop_bits
        );
        Ok(())
    }

    fn purge(&mut self) -> Result<()> {
        self.outbox.clear();
        Ok(())
    }

    fn write_line(&mut self, data: &str, _terminator: LineTerminator) -> Result<()> {
        let mut state = self.state.lock();
        let line = data.trim();
        state.written.push(line.to_string());
        let replies = state.respond(line);
        self.outbox.extend(replies);
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        for &byte in bytes {
            state.written.push(format!("0x{:02X}", byte));
            let replies = state.realtime(byte);
            self.outbox.extend(replies);
        }
        Ok(())
    }

    fn set_answer_timeout(&mut self, timeout: Duration) {
        self.answer_timeout = timeout;
    }

    fn read_line(&mut self, _terminator: LineTerminator) -> Result<String> {
        if self.state.lock().silent {
            return Err(self.timed_out());
        }
        match self.outbox.pop_front() {
            Some(line) => Ok(line),
            None => Err(self.timed_out()),
        }
    }
}
