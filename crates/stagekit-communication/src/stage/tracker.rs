//! Motion state tracker
//!
//! Holds the last-known position and machine state, the coordinate mode
//! last put into effect, the step conversion chosen at initialization and
//! the distance/velocity estimate used when no live status is available.

use crate::firmware::codec::{build_move, build_move_z, MoveCommand};
use crate::firmware::ParsedStatus;
use stagekit_core::{
    is_idle_state, Axis, CoordinateMode, Position, Result, StageError, StatusSnapshot,
    StepConversion,
};
use std::time::{Duration, Instant};

/// A move ready to be handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct MovePlan {
    /// Wire command and its required mode
    pub command: MoveCommand,
    /// Where the stage ends up, in millimeters
    pub target: Position,
    /// Euclidean travel, in micrometers
    pub distance_um: f64,
}

/// Busy window predicted from travel distance and velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    started: Instant,
    duration: Duration,
}

impl MotionEstimate {
    /// Estimate a move of `distance_um` at `velocity_mm_per_s`
    ///
    /// mm/s equals um/ms, so the quotient is the duration in milliseconds.
    pub fn new(distance_um: f64, velocity_mm_per_s: f64) -> Self {
        let millis = if velocity_mm_per_s > 0.0 && distance_um.is_finite() {
            (distance_um.abs() / velocity_mm_per_s).ceil()
        } else {
            0.0
        };
        Self {
            started: Instant::now(),
            duration: Duration::from_millis(millis as u64),
        }
    }

    /// Predicted duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True once the predicted duration has passed
    pub fn is_elapsed(&self) -> bool {
        self.started.elapsed() >= self.duration
    }
}

/// Cached motion state shared by the engine, poller and device
#[derive(Debug, Clone)]
pub struct MotionTracker {
    machine_position: Position,
    work_position: Position,
    commanded: Position,
    state: String,
    mode: CoordinateMode,
    conversion: Option<StepConversion>,
    velocity_mm_per_s: f64,
    estimate: Option<MotionEstimate>,
    last_move: Option<Instant>,
    last_status: Option<Instant>,
}

impl Default for MotionTracker {
    fn default() -> Self {
        Self {
            machine_position: Position::default(),
            work_position: Position::default(),
            commanded: Position::default(),
            state: String::new(),
            // Unknown until the first switch is sent
            mode: CoordinateMode::Homing,
            conversion: None,
            velocity_mm_per_s: 10.0,
            estimate: None,
            last_move: None,
            last_status: None,
        }
    }
}

impl MotionTracker {
    /// Create a tracker with the estimate velocity in mm/s
    pub fn new(velocity_mm_per_s: f64) -> Self {
        Self {
            velocity_mm_per_s,
            ..Self::default()
        }
    }

    /// Forget everything learned from the controller
    pub fn reset(&mut self) {
        *self = Self::new(self.velocity_mm_per_s);
    }

    /// Last decoded machine position
    pub fn machine_position(&self) -> Position {
        self.machine_position
    }

    /// Last decoded machine state label
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Current cache as a snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            machine_position: self.machine_position,
            work_position: self.work_position,
            state: self.state.clone(),
        }
    }

    /// Fold a decoded status into the cache
    ///
    /// Coordinates missing from the reply keep their cached value. The
    /// commanded target only follows the reported position once the machine
    /// is idle; a report taken mid-move shows where the stage is, not where
    /// it is going.
    pub fn apply_status(&mut self, status: &ParsedStatus) -> StatusSnapshot {
        self.machine_position.apply(&status.machine);
        self.work_position.apply(&status.work);
        if let Some(state) = &status.state {
            self.state = state.clone();
        }
        if is_idle_state(&self.state) {
            self.commanded = self.machine_position;
        }
        self.last_status = Some(Instant::now());
        self.snapshot()
    }

    /// Coordinate mode last put into effect
    pub fn mode(&self) -> CoordinateMode {
        self.mode
    }

    /// Record a successful mode switch
    pub fn set_mode(&mut self, mode: CoordinateMode) {
        self.mode = mode;
    }

    /// Record a completed homing cycle
    pub fn mark_homed(&mut self) {
        self.mode = CoordinateMode::Homing;
        self.estimate = None;
    }

    /// Step conversion chosen at initialization
    pub fn conversion(&self) -> Result<StepConversion> {
        self.conversion.ok_or_else(|| StageError::ConfigurationMissing {
            parameter: "step conversion".to_string(),
        })
    }

    /// Install the step conversion
    pub fn set_conversion(&mut self, conversion: Option<StepConversion>) {
        self.conversion = conversion;
    }

    /// Velocity assumed by the estimate, in mm/s
    pub fn velocity(&self) -> f64 {
        self.velocity_mm_per_s
    }

    /// Change the estimate velocity
    pub fn set_velocity(&mut self, velocity_mm_per_s: f64) {
        self.velocity_mm_per_s = velocity_mm_per_s;
    }

    /// Plan an XY move to step coordinates (or by a step offset)
    pub fn plan_xy_move(&self, x_steps: i64, y_steps: i64, relative: bool) -> Result<MovePlan> {
        let conversion = self.conversion()?;
        let x_mm = conversion.steps_to_um(Axis::X, x_steps) / 1000.0;
        let y_mm = conversion.steps_to_um(Axis::Y, y_steps) / 1000.0;

        let mut target = self.commanded;
        if relative {
            target.x += x_mm;
            target.y += y_mm;
        } else {
            target.x = x_mm;
            target.y = y_mm;
        }

        Ok(MovePlan {
            command: build_move(x_mm, y_mm, !relative),
            distance_um: self.commanded.distance_to(&target) * 1000.0,
            target,
        })
    }

    /// Plan a Z move to a step coordinate (or by a step offset)
    pub fn plan_z_move(&self, z_steps: i64, relative: bool) -> Result<MovePlan> {
        let conversion = self.conversion()?;
        let z_mm = conversion.steps_to_um(Axis::Z, z_steps) / 1000.0;

        let mut target = self.commanded;
        target.z = if relative { target.z + z_mm } else { z_mm };

        Ok(MovePlan {
            command: build_move_z(z_mm, !relative),
            distance_um: self.commanded.distance_to(&target) * 1000.0,
            target,
        })
    }

    /// Record a move the controller accepted
    pub fn record_move(&mut self, plan: &MovePlan) {
        let estimate = MotionEstimate::new(plan.distance_um, self.velocity_mm_per_s);
        tracing::debug!(
            "Move to {} ({:.1} um), busy for about {:?}",
            plan.target,
            plan.distance_um,
            estimate.duration()
        );
        self.commanded = plan.target;
        self.estimate = Some(estimate);
        self.last_move = Some(Instant::now());
    }

    /// Drop the busy estimate
    pub fn clear_estimate(&mut self) {
        self.estimate = None;
    }

    /// Busy according to the distance/velocity estimate
    pub fn estimate_busy(&self) -> bool {
        self.estimate.is_some_and(|estimate| !estimate.is_elapsed())
    }

    /// State label from a status received after the last move
    pub fn state_since_move(&self) -> Option<&str> {
        match (self.last_status, self.last_move) {
            (Some(status), Some(moved)) if status > moved => Some(&self.state),
            (Some(_), None) => Some(&self.state),
            _ => None,
        }
    }

    /// Busy according to cached status, falling back to the estimate
    pub fn cached_busy(&self) -> bool {
        match self.state_since_move() {
            Some(state) => !is_idle_state(state),
            None => self.estimate_busy(),
        }
    }
}
