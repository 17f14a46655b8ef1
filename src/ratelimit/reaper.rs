//! Background eviction of idle window state.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::WindowStore;

/// How often the reaper sweeps and how long an entry may sit idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperSettings {
    /// Time between sweeps
    pub interval: Duration,
    /// Extra idle time allowed after an entry's window has ended
    pub idle_threshold: Duration,
}

impl ReaperSettings {
    /// Sweep once per window and keep entries for one extra window.
    pub fn for_window(window: Duration) -> Self {
        Self {
            interval: window,
            idle_threshold: window,
        }
    }
}

/// Periodically sweeps a [`WindowStore`] so memory stays proportional to
/// recently active clients.
///
/// The reaper is best effort: if it stalls, admission decisions are still
/// correct and only memory use grows.
pub struct Reaper {
    store: Arc<WindowStore>,
    settings: ReaperSettings,
}

impl Reaper {
    pub fn new(store: Arc<WindowStore>, settings: ReaperSettings) -> Self {
        Self { store, settings }
    }

    /// Run a single sweep against the store.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.store.sweep(Instant::now(), self.settings.idle_threshold);
        debug!(
            evicted = evicted,
            remaining = self.store.len(),
            "Swept idle rate limit windows"
        );
        evicted
    }

    /// Start sweeping on a tokio task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            interval = ?self.settings.interval,
            idle_threshold = ?self.settings.idle_threshold,
            "Starting rate limit reaper"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        guarded(|| self.sweep_once());
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            info!("Rate limit reaper stopped");
        });

        ReaperHandle { shutdown_tx, task }
    }
}

/// Run one sweep, logging a panic instead of letting it end the task.
fn guarded(sweep: impl FnOnce() -> usize) -> Option<usize> {
    match panic::catch_unwind(AssertUnwindSafe(sweep)) {
        Ok(evicted) => Some(evicted),
        Err(_) => {
            warn!("Rate limit sweep failed, retrying on next tick");
            None
        }
    }
}

/// Handle to a running [`Reaper`].
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Rate limit reaper terminated abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
