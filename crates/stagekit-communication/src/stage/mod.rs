//! Stage driver
//!
//! [`StageDevice`] is the host-facing surface. It owns the command engine,
//! the listener registry and the optional status poller; the
//! [`MotionTracker`] behind the engine holds position, mode and the busy
//! estimate.

pub mod device;
pub mod listener;
pub mod properties;
pub mod tracker;

pub use device::{DetectionStatus, StageDevice};
pub use listener::{ListenerRegistry, StageListener, StageListenerHandle};
pub use properties::{StageProperty, COMMAND_ERROR_VALUE};
pub use tracker::{MotionEstimate, MotionTracker, MovePlan};
