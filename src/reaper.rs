//! Periodic cleanup of stuck sessions.
//!
//! Two sweeps: a fine-grained one cancelling pending invites whose window
//! has passed, and a coarse one cancelling active sessions that kept no
//! heartbeat — both devices dying mid-run leaves a session the completion
//! protocol alone can never close.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::storage::session_store::{SessionError, SessionStore};

/// Reaper configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    /// Cadence of the pending-invite expiry sweep.
    pub expiry_sweep_interval: Duration,
    /// Cadence of the stale-active sweep.
    pub stale_sweep_interval: Duration,
    /// Age past which an active session is a reaping candidate.
    pub stale_after: ChronoDuration,
    /// A candidate survives if either participant persisted a snapshot
    /// within this window.
    pub activity_window: ChronoDuration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_interval: Duration::from_secs(60),
            stale_sweep_interval: Duration::from_secs(3600),
            stale_after: ChronoDuration::hours(6),
            activity_window: ChronoDuration::hours(1),
        }
    }
}

/// Periodic sweeper over the session store.
pub struct StaleSessionReaper {
    store: SessionStore,
    config: ReaperConfig,
    running: Arc<AtomicBool>,
}

impl StaleSessionReaper {
    /// Create a reaper over the session store.
    pub fn new(store: SessionStore, config: ReaperConfig) -> Self {
        Self {
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel pending invites whose expiry has passed. Runs even with zero
    /// client activity; returns the number cancelled.
    pub fn run_expiry_sweep(&self) -> Result<usize, SessionError> {
        let cancelled = self.store.expire_pending(Utc::now())?;
        if cancelled > 0 {
            tracing::info!(cancelled, "expired pending invites");
        }
        Ok(cancelled)
    }

    /// Cancel active sessions past the stale ceiling with no recent
    /// snapshot activity. Returns the number cancelled.
    pub fn run_stale_sweep(&self) -> Result<usize, SessionError> {
        let cancelled = self.store.cancel_stale_active(
            Utc::now(),
            self.config.stale_after,
            self.config.activity_window,
        )?;
        if cancelled > 0 {
            tracing::info!(cancelled, "reaped stale active sessions");
        }
        Ok(cancelled)
    }

    /// Spawn both sweeps on their intervals until `stop`.
    pub fn spawn(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.running.store(true, Ordering::SeqCst);
        let mut handles = Vec::with_capacity(2);

        let reaper = self.clone_for_task();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.config.expiry_sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            while reaper.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if let Err(e) = reaper.run_expiry_sweep() {
                    tracing::warn!("expiry sweep failed: {}", e);
                }
            }
        }));

        let reaper = self.clone_for_task();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.config.stale_sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            while reaper.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if let Err(e) = reaper.run_stale_sweep() {
                    tracing::warn!("stale sweep failed: {}", e);
                }
            }
        }));

        handles
    }

    /// Ask the spawned sweeps to stop at their next tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn clone_for_task(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config,
            running: Arc::clone(&self.running),
        }
    }
}
