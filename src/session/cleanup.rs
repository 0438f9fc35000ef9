//! Idle session expiry
//!
//! Sessions that have not been touched for `SESSION_IDLE_TIMEOUT_SECS` are
//! removed by a periodic sweep running every `SWEEP_INTERVAL_SECS`. An
//! abandoned flow therefore disappears at most one interval after it became
//! eligible.

use crate::session::store::SessionStore;
use chrono::{DateTime, Duration, Utc};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Idle time after which a session may be swept (15 minutes)
pub const SESSION_IDLE_TIMEOUT_SECS: i64 = 15 * 60;

/// Sweep interval (5 minutes)
pub const SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Removes idle sessions from a [`SessionStore`]
#[derive(Debug, Clone)]
pub struct Cleanup {
    store: Arc<SessionStore>,
}

impl Cleanup {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Returns true when a session last touched at `last_activity` is older
    /// than the idle timeout as of `now`.
    pub fn is_expired(last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_activity) > Duration::seconds(SESSION_IDLE_TIMEOUT_SECS)
    }

    /// Runs one sweep against the current time.
    pub fn run(&self) -> CleanupResult {
        self.run_at(Utc::now())
    }

    /// Runs one sweep as if the current time were `now`.
    ///
    /// Candidates come from a snapshot; each one is re-checked under the store
    /// lock at removal time. A session refreshed between the snapshot and the
    /// removal is kept. Activity that lands after the removal simply starts a
    /// fresh session.
    pub fn run_at(&self, now: DateTime<Utc>) -> CleanupResult {
        let mut candidates = Vec::new();
        let mut sessions_scanned = 0;

        self.store.for_each(|session| {
            sessions_scanned += 1;
            if Self::is_expired(session.last_activity, now) {
                candidates.push(session.user_id);
            }
        });

        let mut sessions_deleted = 0;
        for user_id in candidates {
            if self
                .store
                .remove_if(user_id, |s| Self::is_expired(s.last_activity, now))
            {
                debug!(user_id = %user_id, "Expired idle session");
                sessions_deleted += 1;
            }
        }

        if sessions_deleted > 0 {
            info!(
                sessions_scanned = sessions_scanned,
                sessions_deleted = sessions_deleted,
                "Session sweep complete"
            );
        } else {
            debug!(sessions_scanned = sessions_scanned, "Session sweep found nothing to expire");
        }

        CleanupResult {
            sessions_scanned,
            sessions_deleted,
        }
    }

    /// Spawns the repeating sweep.
    ///
    /// The first sweep runs one full interval after start. The task keeps
    /// going until [`CleanupTask::stop`] is called or the handle is dropped
    /// with the runtime.
    pub fn start_cleanup_task(&self) -> CleanupTask {
        let cleanup = self.clone();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period = std::time::Duration::from_secs(SWEEP_INTERVAL_SECS);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // A panicking sweep must not end the loop
                        let sweep = AssertUnwindSafe(|| cleanup.run());
                        if std::panic::catch_unwind(sweep).is_err() {
                            warn!("Session sweep iteration panicked, continuing");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Session expiry task received shutdown signal");
                        break;
                    }
                }
            }
        });

        CleanupTask {
            handle,
            shutdown_tx,
        }
    }
}

/// Result of a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupResult {
    /// Sessions present when the sweep started
    pub sessions_scanned: usize,
    /// Sessions removed by this sweep
    pub sessions_deleted: usize,
}

/// Handle to the background expiry task
#[derive(Debug)]
pub struct CleanupTask {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl CleanupTask {
    /// Signals the task to stop and waits for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Session expiry task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
