//! Snapshot synchronization between the two session participants.
//!
//! An ephemeral UDP broadcast path for low-latency live display and a
//! throttled durable path for crash/reconnect recovery, merged into one
//! freshest-wins partner view.

use std::time::Duration;

pub mod broadcast;
pub mod engine;
pub mod protocol;

// Re-export commonly used types
pub use broadcast::{BroadcastEvent, SequenceGate, SnapshotBroadcast};
pub use engine::{PartnerSample, SampleSource, SyncEngine, SyncError, SyncEvent};
pub use protocol::SyncMessage;

/// Synchronization configuration.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Minimum spacing between durable snapshot upserts. Looser than the
    /// live cadence to bound write volume; also the staleness bound of the
    /// durable fallback view.
    pub durable_interval: Duration,
    /// Port for the snapshot broadcast socket.
    pub broadcast_port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            durable_interval: Duration::from_secs(30),
            broadcast_port: broadcast::BROADCAST_PORT,
        }
    }
}

impl SyncConfig {
    /// Create a new synchronization configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }
}
