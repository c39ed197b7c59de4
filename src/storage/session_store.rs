//! Session lifecycle operations and two-phase completion.
//!
//! All transitions run inside a transaction on the shared connection, so
//! concurrent calls from both participants serialize without lost updates.
//! Each participant independently calls `submit_final_stats` with its own
//! final numbers; the session completes only once both sides have reported.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::session::types::{FinalStats, RunSession, SessionStatus};
use crate::session::INVITE_TTL_MINUTES;
use crate::storage::database::{
    append_event, parse_optional_timestamp, parse_timestamp, Database, DatabaseError,
};
use crate::validation::{ValidationConfig, ValidationError};

const SESSION_COLUMNS: &str = "id, inviter_id, invitee_id, status, created_at, expires_at, \
     started_at, ended_at, inviter_distance_m, inviter_duration_s, inviter_avg_pace, \
     inviter_avg_hr, invitee_distance_m, invitee_duration_s, invitee_avg_pace, \
     invitee_avg_hr, winner_id";

/// Store for session rows: invites, transitions, completion, sweeps.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
    validation: ValidationConfig,
}

impl SessionStore {
    /// Create a session store over the shared database.
    pub fn new(db: Arc<Database>, validation: ValidationConfig) -> Self {
        Self { db, validation }
    }

    /// Create a run invite from `inviter_id` to `invitee_id`.
    ///
    /// Rejected when the inviter has reached the pending-invite ceiling or
    /// an invite between the pair is already open. The invite expires five
    /// minutes from now unless accepted.
    pub fn create_invite(
        &self,
        inviter_id: Uuid,
        invitee_id: Uuid,
    ) -> Result<RunSession, SessionError> {
        if inviter_id == invitee_id {
            return Err(SessionError::SelfInvite);
        }

        let mut conn = self.db.connection();
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let pending: u32 = tx
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE inviter_id = ?1 AND status = 'pending'",
                params![inviter_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if pending >= self.validation.pending_invite_ceiling {
            return Err(ValidationError::InviteCeiling {
                ceiling: self.validation.pending_invite_ceiling,
            }
            .into());
        }

        let between_pair: u32 = tx
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE status = 'pending'
                 AND ((inviter_id = ?1 AND invitee_id = ?2)
                   OR (inviter_id = ?2 AND invitee_id = ?1))",
                params![inviter_id.to_string(), invitee_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if between_pair > 0 {
            return Err(SessionError::InviteAlreadyExists);
        }

        let now = Utc::now();
        let session = RunSession {
            id: Uuid::new_v4(),
            inviter_id,
            invitee_id,
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: Some(now + ChronoDuration::minutes(INVITE_TTL_MINUTES)),
            started_at: None,
            ended_at: None,
            inviter_stats: None,
            invitee_stats: None,
            winner_id: None,
        };

        tx.execute(
            "INSERT INTO sessions (id, inviter_id, invitee_id, status, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id.to_string(),
                inviter_id.to_string(),
                invitee_id.to_string(),
                session.status.as_str(),
                now.to_rfc3339(),
                session.expires_at.map(|dt| dt.to_rfc3339()),
            ],
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        append_event(&tx, session.id, Some(inviter_id), "invite_created", None)?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(session_id = %session.id, %inviter_id, %invitee_id, "invite created");
        Ok(session)
    }

    /// Accept a pending invite. Caller must be the invitee; fails if either
    /// participant already holds another active session.
    pub fn accept_invite(
        &self,
        session_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RunSession, SessionError> {
        let now = Utc::now();

        let mut conn = self.db.connection();
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let session = load_session(&tx, session_id)?;

        if session.status != SessionStatus::Pending {
            return Err(SessionError::InvalidTransition {
                status: session.status,
                action: "accept",
            });
        }

        if caller_id != session.invitee_id {
            return Err(SessionError::NotInvitee);
        }

        // The sweep may not have run yet; a dead invite must not activate.
        if matches!(session.expires_at, Some(expires) if expires < now) {
            return Err(SessionError::InviteExpired);
        }

        let active: u32 = tx
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE status = 'active'
                 AND (inviter_id IN (?1, ?2) OR invitee_id IN (?1, ?2))",
                params![
                    session.inviter_id.to_string(),
                    session.invitee_id.to_string()
                ],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        if active > 0 {
            return Err(SessionError::AlreadyInActiveRun);
        }

        tx.execute(
            "UPDATE sessions SET status = 'active', expires_at = NULL, started_at = ?2
             WHERE id = ?1",
            params![session_id.to_string(), now.to_rfc3339()],
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        append_event(&tx, session_id, Some(caller_id), "invite_accepted", None)?;

        let session = load_session(&tx, session_id)?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(session_id = %session_id, "invite accepted, run active");
        Ok(session)
    }

    /// Decline a pending invite or cancel an active run. Either participant
    /// may call this.
    pub fn decline_or_cancel(
        &self,
        session_id: Uuid,
        caller_id: Uuid,
    ) -> Result<RunSession, SessionError> {
        let now = Utc::now();

        let mut conn = self.db.connection();
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let session = load_session(&tx, session_id)?;

        if !session.is_participant(caller_id) {
            return Err(SessionError::NotAParticipant);
        }

        if session.status.is_terminal() {
            return Err(SessionError::InvalidTransition {
                status: session.status,
                action: "cancel",
            });
        }

        tx.execute(
            "UPDATE sessions SET status = 'cancelled', expires_at = NULL, ended_at = ?2
             WHERE id = ?1",
            params![session_id.to_string(), now.to_rfc3339()],
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        append_event(&tx, session_id, Some(caller_id), "session_cancelled", None)?;

        let session = load_session(&tx, session_id)?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(session_id = %session_id, %caller_id, "session cancelled");
        Ok(session)
    }

    /// Get a session by id.
    pub fn get_session(&self, session_id: Uuid) -> Result<RunSession, SessionError> {
        let conn = self.db.connection();
        load_session(&conn, session_id)
    }

    /// The participant's active session, if one exists. Used to recover
    /// from a client restart mid-run.
    pub fn fetch_active_session(
        &self,
        participant_id: Uuid,
    ) -> Result<Option<RunSession>, SessionError> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE status = 'active' AND (inviter_id = ?1 OR invitee_id = ?1)"
            ))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(params![participant_id.to_string()], map_session_row);

        match result {
            Ok(row) => Ok(Some(row.into_session()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string()).into()),
        }
    }

    /// Number of open invites sent by `inviter_id`.
    pub fn pending_invite_count(&self, inviter_id: Uuid) -> Result<u32, SessionError> {
        let count: u32 = self
            .db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE inviter_id = ?1 AND status = 'pending'",
                params![inviter_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count)
    }

    /// Record one participant's final stats; finalize once both sides have
    /// reported.
    ///
    /// Atomic and idempotent: the caller's final-stat columns are always
    /// overwritten (the latest call is authoritative), and the session is
    /// completed with a winner only when both final durations are present.
    /// A session that is already completed accepts a re-submission and
    /// recomputes the winner.
    pub fn submit_final_stats(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        stats: FinalStats,
    ) -> Result<RunSession, SessionError> {
        let now = Utc::now();

        let mut conn = self.db.connection();
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let session = load_session(&tx, session_id)?;

        if !session.is_participant(participant_id) {
            return Err(SessionError::NotAParticipant);
        }

        if !matches!(
            session.status,
            SessionStatus::Active | SessionStatus::Completed
        ) {
            return Err(SessionError::InvalidTransition {
                status: session.status,
                action: "submit final stats",
            });
        }

        let sql = if participant_id == session.inviter_id {
            "UPDATE sessions SET inviter_distance_m = ?2, inviter_duration_s = ?3,
             inviter_avg_pace = ?4, inviter_avg_hr = ?5 WHERE id = ?1"
        } else {
            "UPDATE sessions SET invitee_distance_m = ?2, invitee_duration_s = ?3,
             invitee_avg_pace = ?4, invitee_avg_hr = ?5 WHERE id = ?1"
        };

        tx.execute(
            sql,
            params![
                session_id.to_string(),
                stats.distance_m,
                stats.duration_s,
                stats.avg_pace_s_per_km,
                stats.avg_heart_rate_bpm,
            ],
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        append_event(
            &tx,
            session_id,
            Some(participant_id),
            "final_stats_submitted",
            Some(serde_json::json!({
                "distance_m": stats.distance_m,
                "duration_s": stats.duration_s,
            })),
        )?;

        // Finalize once both sides have reported; recompute the winner on
        // every call so the latest numbers stay authoritative.
        let session = load_session(&tx, session_id)?;
        if let (Some(inviter), Some(invitee)) = (session.inviter_stats, session.invitee_stats) {
            let winner_id = if inviter.distance_m > invitee.distance_m {
                Some(session.inviter_id)
            } else if invitee.distance_m > inviter.distance_m {
                Some(session.invitee_id)
            } else {
                None
            };

            tx.execute(
                "UPDATE sessions SET status = 'completed', winner_id = ?2,
                 ended_at = COALESCE(ended_at, ?3) WHERE id = ?1",
                params![
                    session_id.to_string(),
                    winner_id.map(|id| id.to_string()),
                    now.to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            if session.status != SessionStatus::Completed {
                append_event(&tx, session_id, None, "session_completed", None)?;
            }
        }

        let session = load_session(&tx, session_id)?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(
            session_id = %session_id,
            %participant_id,
            status = %session.status,
            "final stats recorded"
        );
        Ok(session)
    }

    // ========== Sweep Queries ==========

    /// Cancel every pending session whose invite window has passed.
    /// Returns the number of sessions cancelled.
    pub fn expire_pending(&self, now: DateTime<Utc>) -> Result<usize, SessionError> {
        let mut conn = self.db.connection();
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let expired: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id FROM sessions
                     WHERE status = 'pending' AND expires_at < ?1",
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            let rows = stmt
                .query_map(params![now.to_rfc3339()], |row| row.get(0))
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
            }
            ids
        };

        for id in &expired {
            tx.execute(
                "UPDATE sessions SET status = 'cancelled', expires_at = NULL, ended_at = ?2
                 WHERE id = ?1",
                params![id, now.to_rfc3339()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            if let Ok(session_id) = Uuid::parse_str(id) {
                append_event(&tx, session_id, None, "invite_expired", None)?;
            }
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(expired.len())
    }

    /// Cancel active sessions older than `stale_after` with no snapshot
    /// activity within `activity_window`. Returns the number cancelled.
    pub fn cancel_stale_active(
        &self,
        now: DateTime<Utc>,
        stale_after: ChronoDuration,
        activity_window: ChronoDuration,
    ) -> Result<usize, SessionError> {
        let started_cutoff = (now - stale_after).to_rfc3339();
        let activity_cutoff = (now - activity_window).to_rfc3339();

        let mut conn = self.db.connection();
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let stale: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT id FROM sessions
                     WHERE status = 'active' AND started_at < ?1
                     AND NOT EXISTS (
                         SELECT 1 FROM snapshots
                         WHERE snapshots.session_id = sessions.id
                         AND snapshots.server_received_at > ?2
                     )",
                )
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            let rows = stmt
                .query_map(params![started_cutoff, activity_cutoff], |row| row.get(0))
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
            }
            ids
        };

        for id in &stale {
            tx.execute(
                "UPDATE sessions SET status = 'cancelled', ended_at = ?2 WHERE id = ?1",
                params![id, now.to_rfc3339()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            if let Ok(session_id) = Uuid::parse_str(id) {
                append_event(&tx, session_id, None, "session_reaped", None)?;
            }
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        Ok(stale.len())
    }
}

/// Load one session row on an open connection or transaction.
fn load_session(conn: &Connection, session_id: Uuid) -> Result<RunSession, SessionError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
        ))
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

    let result = stmt.query_row(params![session_id.to_string()], map_session_row);

    match result {
        Ok(row) => Ok(row.into_session()?),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(SessionError::NotFound),
        Err(e) => Err(DatabaseError::QueryFailed(e.to_string()).into()),
    }
}

fn map_session_row(row: &rusqlite::Row) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        inviter_id: row.get(1)?,
        invitee_id: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
        started_at: row.get(6)?,
        ended_at: row.get(7)?,
        inviter_distance_m: row.get(8)?,
        inviter_duration_s: row.get(9)?,
        inviter_avg_pace: row.get(10)?,
        inviter_avg_hr: row.get(11)?,
        invitee_distance_m: row.get(12)?,
        invitee_duration_s: row.get(13)?,
        invitee_avg_pace: row.get(14)?,
        invitee_avg_hr: row.get(15)?,
        winner_id: row.get(16)?,
    })
}

/// Intermediate struct for reading session rows from the database.
struct SessionRow {
    id: String,
    inviter_id: String,
    invitee_id: String,
    status: String,
    created_at: String,
    expires_at: Option<String>,
    started_at: Option<String>,
    ended_at: Option<String>,
    inviter_distance_m: Option<f64>,
    inviter_duration_s: Option<u32>,
    inviter_avg_pace: Option<f64>,
    inviter_avg_hr: Option<u8>,
    invitee_distance_m: Option<f64>,
    invitee_duration_s: Option<u32>,
    invitee_avg_pace: Option<f64>,
    invitee_avg_hr: Option<u8>,
    winner_id: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<RunSession, DatabaseError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| DatabaseError::DeserializationError(format!("Invalid UUID: {}", e)))?;

        let inviter_id = Uuid::parse_str(&self.inviter_id).map_err(|e| {
            DatabaseError::DeserializationError(format!("Invalid inviter UUID: {}", e))
        })?;

        let invitee_id = Uuid::parse_str(&self.invitee_id).map_err(|e| {
            DatabaseError::DeserializationError(format!("Invalid invitee UUID: {}", e))
        })?;

        let status = SessionStatus::parse(&self.status).ok_or_else(|| {
            DatabaseError::DeserializationError(format!("Unknown status: {}", self.status))
        })?;

        let winner_id = self
            .winner_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid winner UUID: {}", e))
            })?;

        let inviter_stats = match (self.inviter_distance_m, self.inviter_duration_s) {
            (Some(distance_m), Some(duration_s)) => Some(FinalStats {
                distance_m,
                duration_s,
                avg_pace_s_per_km: self.inviter_avg_pace,
                avg_heart_rate_bpm: self.inviter_avg_hr,
            }),
            _ => None,
        };

        let invitee_stats = match (self.invitee_distance_m, self.invitee_duration_s) {
            (Some(distance_m), Some(duration_s)) => Some(FinalStats {
                distance_m,
                duration_s,
                avg_pace_s_per_km: self.invitee_avg_pace,
                avg_heart_rate_bpm: self.invitee_avg_hr,
            }),
            _ => None,
        };

        Ok(RunSession {
            id,
            inviter_id,
            invitee_id,
            status,
            created_at: parse_timestamp(&self.created_at, "created_at")?,
            expires_at: parse_optional_timestamp(self.expires_at, "expires_at")?,
            started_at: parse_optional_timestamp(self.started_at, "started_at")?,
            ended_at: parse_optional_timestamp(self.ended_at, "ended_at")?,
            inviter_stats,
            invitee_stats,
            winner_id,
        })
    }
}

/// Session protocol errors, surfaced to the caller as displayable text.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Not a participant in this session")]
    NotAParticipant,

    #[error("Only the invitee can accept an invite")]
    NotInvitee,

    #[error("Cannot invite yourself to a run")]
    SelfInvite,

    #[error("An invite between these runners is already open")]
    InviteAlreadyExists,

    #[error("Invite has expired")]
    InviteExpired,

    #[error("Already in an active run")]
    AlreadyInActiveRun,

    #[error("Session is {status}, cannot {action}")]
    InvalidTransition {
        status: SessionStatus,
        action: &'static str,
    },

    #[error(transparent)]
    Rejected(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
