//! Virtual run session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a virtual run session.
///
/// `Pending -> {Active, Cancelled}`; `Active -> {Completed, Cancelled}`;
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Invite sent, waiting for the invitee.
    Pending,
    /// Both participants running.
    Active,
    /// Both participants submitted final stats.
    Completed,
    /// Declined, cancelled, expired, or reaped.
    Cancelled,
}

impl SessionStatus {
    /// Stable string form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the storage string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final stats one participant submits for completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalStats {
    /// Total distance in meters
    pub distance_m: f64,
    /// Total active duration in seconds
    pub duration_s: u32,
    /// Average pace in seconds per kilometer
    pub avg_pace_s_per_km: Option<f64>,
    /// Average heart rate in BPM
    pub avg_heart_rate_bpm: Option<u8>,
}

/// One virtual run pairing between two participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSession {
    pub id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_id: Uuid,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    /// Set only while `status` is pending.
    pub expires_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub inviter_stats: Option<FinalStats>,
    pub invitee_stats: Option<FinalStats>,
    /// Set once completed; `None` on a tie.
    pub winner_id: Option<Uuid>,
}

impl RunSession {
    /// Whether `participant_id` is one of the two participants.
    pub fn is_participant(&self, participant_id: Uuid) -> bool {
        participant_id == self.inviter_id || participant_id == self.invitee_id
    }

    /// The other participant's id, if `participant_id` is a participant.
    pub fn partner_of(&self, participant_id: Uuid) -> Option<Uuid> {
        if participant_id == self.inviter_id {
            Some(self.invitee_id)
        } else if participant_id == self.invitee_id {
            Some(self.inviter_id)
        } else {
            None
        }
    }

    /// Final stats submitted by `participant_id`, if any.
    pub fn stats_of(&self, participant_id: Uuid) -> Option<&FinalStats> {
        if participant_id == self.inviter_id {
            self.inviter_stats.as_ref()
        } else if participant_id == self.invitee_id {
            self.invitee_stats.as_ref()
        } else {
            None
        }
    }
}
