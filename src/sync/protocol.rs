//! Wire protocol for the ephemeral broadcast path.
//!
//! Defines the messages exchanged between two session participants over
//! UDP. Delivery is best-effort and unordered; the only ordering signal is
//! the sequence number embedded in each sample.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::types::SessionStatus;
use crate::telemetry::types::RunSample;

/// Maximum message size in bytes (UDP safe).
pub const MAX_MESSAGE_SIZE: usize = 1400;

/// Messages carried on the ephemeral channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Latest live stat sample from one participant.
    SnapshotUpdate {
        session_id: Uuid,
        participant_id: Uuid,
        sample: RunSample,
    },

    /// Best-effort notice that the sender observed a terminal transition.
    /// The durable session row stays authoritative; losing this message
    /// only delays the partner until its next refresh.
    SessionEnded {
        session_id: Uuid,
        participant_id: Uuid,
        status: SessionStatus,
    },
}

impl SyncMessage {
    /// Serialize message to bytes using bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// The session this message belongs to.
    pub fn session_id(&self) -> Uuid {
        match self {
            SyncMessage::SnapshotUpdate { session_id, .. } => *session_id,
            SyncMessage::SessionEnded { session_id, .. } => *session_id,
        }
    }

    /// The participant that sent this message.
    pub fn participant_id(&self) -> Uuid {
        match self {
            SyncMessage::SnapshotUpdate { participant_id, .. } => *participant_id,
            SyncMessage::SessionEnded { participant_id, .. } => *participant_id,
        }
    }
}
