//! Background status poller
//!
//! A tokio task that issues the status query on a fixed interval. Each
//! exchange runs on the blocking pool and goes through the engine's wire
//! lock, so polls interleave with foreground commands in strict order.

use crate::communication::engine::CommandEngine;
use crate::firmware::CommandLine;
use stagekit_core::{Result, StageError, StatusSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Called with every decoded status
pub type StatusCallback = Arc<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Handle onto a running poll task
pub struct StatusPoller {
    shutdown: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl StatusPoller {
    /// Start polling on the current tokio runtime
    ///
    /// Fails with [`StageError::Other`] when called outside a runtime.
    pub fn start(
        engine: Arc<CommandEngine>,
        query: CommandLine,
        interval: Duration,
        on_status: Option<StatusCallback>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| StageError::other(format!("Status polling needs a tokio runtime: {}", e)))?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let task_running = running.clone();

        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::debug!("Status poller started ({:?})", interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let engine = engine.clone();
                        let query = query.clone();
                        let polled =
                            tokio::task::spawn_blocking(move || engine.query_status(&query)).await;

                        match polled {
                            Ok(Ok(snapshot)) => {
                                if let Some(callback) = &on_status {
                                    callback(&snapshot);
                                }
                            }
                            Ok(Err(StageError::NoPortConfigured)) => {
                                tracing::debug!("Transport detached, poller exiting");
                                break;
                            }
                            Ok(Err(e)) => tracing::debug!("Status poll failed: {}", e),
                            Err(e) => {
                                tracing::error!("Status poll task failed: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            task_running.store(false, Ordering::SeqCst);
            tracing::debug!("Status poller stopped");
        });

        Ok(Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
            running,
        })
    }

    /// True until the task has exited
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the task to exit
    ///
    /// An exchange already in flight finishes first; it is never cancelled
    /// mid-wire.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }
        self.task.take();
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
