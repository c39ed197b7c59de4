//! Dual-path snapshot synchronization engine.
//!
//! Every local sample goes out on two independent paths: a fire-and-forget
//! broadcast for sub-second partner display, and a throttled durable
//! upsert for crash/reconnect recovery. The partner view is a single
//! latest-value register fed by both paths; whichever path delivers the
//! higher sequence wins, so a stale durable read never regresses a fresher
//! live sample.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use super::broadcast::{BroadcastEvent, SnapshotBroadcast};
use super::SyncConfig;
use crate::session::context::RunContext;
use crate::session::types::SessionStatus;
use crate::storage::snapshot_store::{SnapshotError, SnapshotStore};
use crate::telemetry::types::RunSample;
use crate::validation::ValidationError;

/// Which path delivered a partner sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    /// Ephemeral broadcast; sub-second latency.
    Live,
    /// Persisted snapshot; may lag by up to the durable write interval.
    Durable,
}

/// The freshest known partner sample.
#[derive(Debug, Clone)]
pub struct PartnerSample {
    pub sample: RunSample,
    pub source: SampleSource,
    pub received_at: DateTime<Utc>,
}

/// Events surfaced to subscribers of the engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The partner view advanced.
    PartnerUpdate(PartnerSample),
    /// The partner announced a terminal transition on the live channel.
    SessionEnded(SessionStatus),
}

/// Synchronization engine for one participant's side of a session.
pub struct SyncEngine {
    context: RunContext,
    broadcast: SnapshotBroadcast,
    snapshots: SnapshotStore,
    config: SyncConfig,
    partner_view: Arc<RwLock<Option<PartnerSample>>>,
    last_durable_write: Option<tokio::time::Instant>,
    event_tx: broadcast::Sender<SyncEvent>,
    running: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Create an engine for the local side of `context`.
    pub fn new(context: RunContext, snapshots: SnapshotStore, config: SyncConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let broadcast = SnapshotBroadcast::new(context.local_id());

        Self {
            context,
            broadcast,
            snapshots,
            config,
            partner_view: Arc::new(RwLock::new(None)),
            last_durable_write: None,
            event_tx,
            // The durable path works from construction; `start` only adds
            // the live channel and the merge loop.
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Start both paths: bind the broadcast socket, spawn the merge loop,
    /// and prime the partner view from the durable store.
    pub async fn start(&mut self) -> Result<(), SyncError> {
        self.broadcast
            .start(self.context.session_id(), self.config.broadcast_port)
            .await?;
        self.running.store(true, Ordering::SeqCst);

        let mut live_rx = self.broadcast.subscribe();
        let mut durable_rx = self.snapshots.subscribe();
        let partner_view = Arc::clone(&self.partner_view);
        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let session_id = self.context.session_id();
        let partner_id = self.context.partner_id();

        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    live = live_rx.recv() => match live {
                        Ok(BroadcastEvent::Sample { participant_id, sample }) => {
                            if participant_id != partner_id {
                                continue;
                            }
                            let candidate = PartnerSample {
                                sample,
                                source: SampleSource::Live,
                                received_at: Utc::now(),
                            };
                            if merge_partner_sample(&partner_view, candidate.clone()) {
                                let _ = event_tx.send(SyncEvent::PartnerUpdate(candidate));
                            }
                        }
                        Ok(BroadcastEvent::Ended { participant_id, status }) => {
                            if participant_id == partner_id {
                                let _ = event_tx.send(SyncEvent::SessionEnded(status));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "live event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    durable = durable_rx.recv() => match durable {
                        Ok(change) => {
                            if change.session_id != session_id
                                || change.snapshot.participant_id != partner_id
                            {
                                continue;
                            }
                            let candidate = PartnerSample {
                                sample: change.snapshot.to_sample(),
                                source: SampleSource::Durable,
                                received_at: Utc::now(),
                            };
                            if merge_partner_sample(&partner_view, candidate.clone()) {
                                let _ = event_tx.send(SyncEvent::PartnerUpdate(candidate));
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "durable change stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        self.resync()?;

        Ok(())
    }

    /// Publish a local sample on both paths.
    ///
    /// The broadcast send is fire-and-forget; failures are logged and
    /// never surfaced. The durable upsert runs at most once per configured
    /// interval; a too-soon rejection from the gate is absorbed (the next
    /// natural interval retries), while plausibility rejections and store
    /// failures propagate to the caller.
    pub async fn publish(&mut self, sample: RunSample) -> Result<(), SyncError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SyncError::Stopped);
        }

        if let Err(e) = self.broadcast.publish(sample.clone()).await {
            tracing::warn!("broadcast publish failed: {}", e);
        }

        let due = match self.last_durable_write {
            Some(last) => last.elapsed() >= self.config.durable_interval,
            None => true,
        };

        if due {
            match self.snapshots.upsert(
                self.context.session_id(),
                self.context.local_id(),
                &sample,
            ) {
                Ok(_) => {
                    self.last_durable_write = Some(tokio::time::Instant::now());
                }
                Err(SnapshotError::Rejected(ValidationError::WriteTooSoon { .. })) => {
                    tracing::debug!("durable write throttled by store");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// The freshest known partner sample, from either path.
    pub fn partner_sample(&self) -> Option<PartnerSample> {
        self.partner_view.read().unwrap().clone()
    }

    /// Fall back to the partner's persisted snapshot, e.g. after missing
    /// broadcast messages while offline. The durable cadence is coarser
    /// than the live one, so the merged view may lag by up to the durable
    /// interval.
    pub fn resync(&self) -> Result<Option<PartnerSample>, SyncError> {
        let persisted = self
            .snapshots
            .get(self.context.session_id(), self.context.partner_id())?;

        if let Some(snapshot) = persisted {
            let candidate = PartnerSample {
                sample: snapshot.to_sample(),
                source: SampleSource::Durable,
                received_at: Utc::now(),
            };
            if merge_partner_sample(&self.partner_view, candidate.clone()) {
                let _ = self.event_tx.send(SyncEvent::PartnerUpdate(candidate));
            }
        }

        Ok(self.partner_sample())
    }

    /// React to an observed session transition. A terminal status notifies
    /// the partner on the live channel (best effort) and tears the engine
    /// down; anything else is ignored.
    pub async fn handle_transition(&mut self, status: SessionStatus) {
        if !status.is_terminal() {
            return;
        }

        if self.broadcast.is_running() {
            if let Err(e) = self.broadcast.publish_ended(status).await {
                tracing::debug!("ended notice not sent: {}", e);
            }
        }

        self.stop();
    }

    /// Stop both paths and refuse further publishes.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.broadcast.stop();
        tracing::info!(session_id = %self.context.session_id(), "sync engine stopped");
    }

    /// Subscribe to merged partner events from both paths.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// The run context this engine serves.
    pub fn context(&self) -> &RunContext {
        &self.context
    }
}

/// Accept `candidate` into the latest-value register only if it advances
/// the partner's sequence. Returns whether it was accepted.
fn merge_partner_sample(
    view: &RwLock<Option<PartnerSample>>,
    candidate: PartnerSample,
) -> bool {
    let mut guard = view.write().unwrap();
    let accept = match guard.as_ref() {
        Some(current) => candidate.sample.sequence > current.sample.sequence,
        None => true,
    };

    if accept {
        *guard = Some(candidate);
    }
    accept
}

/// Synchronization engine errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Synchronization engine is stopped")]
    Stopped,

    #[error(transparent)]
    Broadcast(#[from] super::broadcast::BroadcastError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
