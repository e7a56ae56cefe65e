//! Command engine
//!
//! Serializes every wire exchange under a single lock: purge stale input,
//! write the command, apply the class timeout, read the reply. Status
//! replies are decoded and folded into the shared [`MotionTracker`] before
//! the lock is released, so the poller and foreground callers always see a
//! consistent cache.
//!
//! Transport errors are returned as-is; nothing is retried here.

use crate::communication::Transport;
use crate::firmware::codec::{
    build_feed_hold, build_mode_switch, CommandLine, MoveCommand, Payload, ReplyShape,
    TimeoutClass,
};
use crate::firmware::{StatusDialect, StatusParser};
use crate::stage::tracker::{MotionTracker, MovePlan};
use parking_lot::{Mutex, RwLock};
use stagekit_core::{CoordinateMode, LineTerminator, Result, StageError, StatusSnapshot};
use stagekit_settings::TimeoutSettings;
use std::sync::Arc;
use std::time::Duration;

/// Answer timeouts per command class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Raw passthrough
    pub normal: Duration,
    /// Status queries
    pub status: Duration,
    /// `$` configuration
    pub config: Duration,
    /// Homing
    pub extended: Duration,
    /// Moves and mode switches
    pub move_ack: Duration,
    /// Sleep between the reset byte and its read
    pub reset_settle: Duration,
    /// Read timeout after a reset
    pub reset_read: Duration,
    /// Quiet period ending a multi-line reply
    pub inter_line: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_settings(&TimeoutSettings::default())
    }
}

impl TimeoutPolicy {
    /// Build the policy from configuration
    pub fn from_settings(settings: &TimeoutSettings) -> Self {
        Self {
            normal: Duration::from_millis(settings.normal_ms),
            status: Duration::from_millis(settings.status_ms),
            config: Duration::from_millis(settings.config_ms),
            extended: Duration::from_millis(settings.extended_ms),
            move_ack: Duration::from_millis(settings.move_ms),
            reset_settle: Duration::from_millis(settings.reset_settle_ms),
            reset_read: Duration::from_millis(settings.reset_read_ms),
            inter_line: Duration::from_millis(settings.inter_line_ms),
        }
    }

    /// Timeout for the first reply line of a command class
    pub fn answer_timeout(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Normal | TimeoutClass::Realtime => self.normal,
            TimeoutClass::Status => self.status,
            TimeoutClass::Config => self.config,
            TimeoutClass::Extended => self.extended,
            TimeoutClass::Move => self.move_ack,
            TimeoutClass::Reset => self.reset_read,
        }
    }
}

/// Result of one wire exchange
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// True unless the engine itself failed the exchange
    pub success: bool,
    /// Command as written
    pub command: String,
    /// Raw reply, lines joined with `\n`
    pub reply: String,
    /// Decoded status (status class only)
    pub status: Option<StatusSnapshot>,
    /// Format the status reply was written in (status class only)
    pub dialect: Option<StatusDialect>,
}

impl CommandOutcome {
    fn new(command: String, reply: String) -> Self {
        Self {
            success: true,
            command,
            reply,
            status: None,
            dialect: None,
        }
    }

    /// The controller answered with an error line
    pub fn is_error_reply(&self) -> bool {
        self.reply
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .is_some_and(|line| line.starts_with("error"))
    }

    /// The reply carries an acknowledgment
    pub fn is_acknowledged(&self) -> bool {
        self.reply.lines().any(is_acknowledgment)
    }
}

fn is_acknowledgment(line: &str) -> bool {
    let line = line.trim();
    line == "ok" || line.ends_with("ok>")
}

fn ends_reply(line: &str) -> bool {
    is_acknowledgment(line) || line.trim_start().starts_with("error")
}

/// Serialized command executor
pub struct CommandEngine {
    transport: Mutex<Option<Box<dyn Transport>>>,
    tracker: Arc<RwLock<MotionTracker>>,
    timeouts: RwLock<TimeoutPolicy>,
    terminator: RwLock<LineTerminator>,
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(TimeoutPolicy::default())
    }
}

impl CommandEngine {
    /// Create an engine without a transport
    pub fn new(timeouts: TimeoutPolicy) -> Self {
        Self {
            transport: Mutex::new(None),
            tracker: Arc::new(RwLock::new(MotionTracker::default())),
            timeouts: RwLock::new(timeouts),
            terminator: RwLock::new(LineTerminator::CrLf),
        }
    }

    /// Install the transport; any previous one is dropped
    pub fn attach(&self, transport: Box<dyn Transport>) {
        tracing::debug!("Attaching transport {}", transport.name());
        *self.transport.lock() = Some(transport);
    }

    /// Remove and return the transport
    pub fn detach(&self) -> Option<Box<dyn Transport>> {
        self.transport.lock().take()
    }

    /// True while a transport is installed
    pub fn is_attached(&self) -> bool {
        self.transport.lock().is_some()
    }

    /// Shared motion state
    pub fn tracker(&self) -> Arc<RwLock<MotionTracker>> {
        self.tracker.clone()
    }

    /// Current timeout policy
    pub fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts.read().clone()
    }

    /// Replace the timeout policy
    pub fn set_timeouts(&self, timeouts: TimeoutPolicy) {
        *self.timeouts.write() = timeouts;
    }

    /// Override the move acknowledgment timeout
    pub fn set_move_timeout(&self, timeout: Duration) {
        self.timeouts.write().move_ack = timeout;
    }

    /// Terminator appended to command lines
    pub fn terminator(&self) -> LineTerminator {
        *self.terminator.read()
    }

    /// Change the line terminator
    pub fn set_terminator(&self, terminator: LineTerminator) {
        *self.terminator.write() = terminator;
    }

    fn with_transport<T>(
        &self,
        f: impl FnOnce(&mut dyn Transport) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.transport.lock();
        let transport = slot.as_deref_mut().ok_or(StageError::NoPortConfigured)?;
        f(transport)
    }

    /// Execute one command and return its outcome
    ///
    /// Status-class replies are decoded; a reply that does not decode is a
    /// [`StageError::StatusParseError`] and leaves the cache untouched.
    pub fn execute(&self, command: &CommandLine) -> Result<CommandOutcome> {
        self.with_transport(|transport| self.exchange(transport, command))
    }

    /// Execute a status query and return the refreshed snapshot
    pub fn query_status(&self, command: &CommandLine) -> Result<StatusSnapshot> {
        let outcome = self.execute(command)?;
        outcome
            .status
            .ok_or_else(|| StageError::parse(format!("{} is not a status query", command)))
    }

    /// Put the controller into `mode` if it is not already there
    pub fn ensure_mode(&self, mode: CoordinateMode) -> Result<()> {
        self.with_transport(|transport| self.switch_mode(transport, mode))
    }

    /// Run a planned move: mode switch (on transition only), then the move
    ///
    /// A failed switch aborts the move and leaves the tracked mode unchanged.
    pub fn run_move(&self, plan: &MovePlan) -> Result<CommandOutcome> {
        self.with_transport(|transport| {
            self.switch_mode(transport, plan.command.mode)?;
            let outcome = self.exchange(transport, &plan.command.command)?;
            reject_error_reply(&plan.command, &outcome)?;
            self.tracker.write().record_move(plan);
            Ok(outcome)
        })
    }

    /// Run the homing cycle
    ///
    /// The next move re-asserts its coordinate mode afterwards.
    pub fn home(&self, command: &CommandLine) -> Result<CommandOutcome> {
        self.with_transport(|transport| {
            let outcome = self.exchange(transport, command)?;
            if outcome.is_error_reply() {
                return Err(StageError::CommandRejected {
                    command: command.text(),
                    reply: outcome.reply,
                });
            }
            self.tracker.write().mark_homed();
            Ok(outcome)
        })
    }

    /// Send the feed hold byte and drop the motion estimate
    pub fn stop(&self) -> Result<()> {
        self.with_transport(|transport| {
            self.exchange(transport, &build_feed_hold())?;
            self.tracker.write().clear_estimate();
            Ok(())
        })
    }

    fn switch_mode(&self, transport: &mut dyn Transport, mode: CoordinateMode) -> Result<()> {
        if self.tracker.read().mode() == mode {
            return Ok(());
        }
        let Some(command) = build_mode_switch(mode) else {
            return Ok(());
        };

        let failed = |reason: String| {
            tracing::warn!("Switch to {} mode failed: {}", mode, reason);
            StageError::ModeSwitchFailed {
                mode: mode.to_string(),
                reason,
            }
        };

        match self.exchange(transport, &command) {
            Ok(outcome) if outcome.is_error_reply() => Err(failed(outcome.reply)),
            Ok(_) => {
                self.tracker.write().set_mode(mode);
                tracing::debug!("Coordinate mode is now {}", mode);
                Ok(())
            }
            Err(e) => Err(failed(e.to_string())),
        }
    }

    fn exchange(
        &self,
        transport: &mut dyn Transport,
        command: &CommandLine,
    ) -> Result<CommandOutcome> {
        let policy = self.timeouts();
        let terminator = self.terminator();
        let text = command.text();
        tracing::debug!("-> {} [{}]", text, command.class);

        transport.purge()?;
        let written = match &command.payload {
            Payload::Line(line) => transport.write_line(line, terminator),
            Payload::Byte(byte) => transport.write_raw(&[*byte]),
        };
        if let Err(e) = written {
            tracing::warn!("Writing {} to {} failed: {}", text, transport.name(), e);
            return Err(e);
        }

        if command.class == TimeoutClass::Reset {
            std::thread::sleep(policy.reset_settle);
            transport.set_answer_timeout(policy.reset_read);
            let reply = transport.read_line(terminator).unwrap_or_else(|e| {
                tracing::debug!("No reply after reset: {}", e);
                String::new()
            });
            tracing::info!("Controller reset");
            return Ok(CommandOutcome::new(text, reply));
        }

        let reply = match command.reply {
            ReplyShape::NoReply => Ok(String::new()),
            ReplyShape::Line => {
                transport.set_answer_timeout(policy.answer_timeout(command.class));
                read_nonempty_line(transport, terminator)
            }
            ReplyShape::UntilQuiet => {
                read_until_quiet(transport, terminator, &policy, command.class)
            }
        }
        .inspect_err(|e| tracing::warn!("No reply to {}: {}", text, e))?;
        tracing::trace!("<- {:?}", reply);

        let mut outcome = CommandOutcome::new(text, reply);
        if command.class == TimeoutClass::Status {
            let parsed = StatusParser::parse(&outcome.reply)
                .inspect_err(|e| tracing::warn!("Bad status reply {:?}: {}", outcome.reply, e))?;
            let snapshot = self.tracker.write().apply_status(&parsed);
            outcome.dialect = Some(parsed.dialect);
            outcome.status = Some(snapshot);
        }
        Ok(outcome)
    }
}

fn reject_error_reply(command: &MoveCommand, outcome: &CommandOutcome) -> Result<()> {
    if outcome.is_error_reply() {
        tracing::warn!("{} rejected: {}", command.command, outcome.reply);
        return Err(StageError::CommandRejected {
            command: command.command.text(),
            reply: outcome.reply.clone(),
        });
    }
    Ok(())
}

fn read_nonempty_line(transport: &mut dyn Transport, terminator: LineTerminator) -> Result<String> {
    loop {
        let line = transport.read_line(terminator)?;
        if !line.trim().is_empty() {
            return Ok(line);
        }
    }
}

fn read_until_quiet(
    transport: &mut dyn Transport,
    terminator: LineTerminator,
    policy: &TimeoutPolicy,
    class: TimeoutClass,
) -> Result<String> {
    transport.set_answer_timeout(policy.answer_timeout(class));
    let first = read_nonempty_line(transport, terminator)?;
    let mut done = ends_reply(&first);
    let mut lines = vec![first];

    transport.set_answer_timeout(policy.inter_line);
    while !done {
        match transport.read_line(terminator) {
            Ok(line) => {
                done = ends_reply(&line);
                lines.push(line);
            }
            Err(e) if e.is_timeout() => break,
            Err(e) => return Err(e),
        }
    }
    Ok(lines.join("\n"))
}
