//! Host notifications
//!
//! The host registers [`StageListener`]s to hear about position and
//! machine-state changes. Registrations are keyed by a uuid handle.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Receiver of stage notifications
///
/// All methods default to no-ops.
pub trait StageListener: Send + Sync {
    /// XY stage was commanded to a new position, in micrometers
    fn on_position_changed(&self, _x_um: f64, _y_um: f64) {}

    /// Z stage was commanded to a new position, in micrometers
    fn on_z_position_changed(&self, _z_um: f64) {}

    /// A status update reported a machine state
    fn on_status_changed(&self, _state: &str) {}
}

/// Handle returned by [`ListenerRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageListenerHandle(pub String);

/// Registered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Arc<dyn StageListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener
    pub fn register(&self, listener: Arc<dyn StageListener>) -> StageListenerHandle {
        let id = Uuid::new_v4().to_string();
        self.listeners.write().insert(id.clone(), listener);
        StageListenerHandle(id)
    }

    /// Remove a listener; false if the handle was unknown
    pub fn unregister(&self, handle: &StageListenerHandle) -> bool {
        self.listeners.write().remove(&handle.0).is_some()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// True when nobody listens
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn StageListener>> {
        self.listeners.read().values().cloned().collect()
    }

    /// Notify an XY position change
    pub fn notify_position(&self, x_um: f64, y_um: f64) {
        for listener in self.snapshot() {
            listener.on_position_changed(x_um, y_um);
        }
    }

    /// Notify a Z position change
    pub fn notify_z_position(&self, z_um: f64) {
        for listener in self.snapshot() {
            listener.on_z_position_changed(z_um);
        }
    }

    /// Notify a machine state
    pub fn notify_status(&self, state: &str) {
        for listener in self.snapshot() {
            listener.on_status_changed(state);
        }
    }
}
