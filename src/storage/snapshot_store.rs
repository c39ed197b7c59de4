//! Latest-value snapshot persistence (the durable synchronization path).
//!
//! One row per (session, participant), upsert semantics. Every write
//! passes the validation gate inside the transaction; a rejection leaves
//! the stored sample untouched. Accepted writes are re-broadcast on a
//! change feed so subscribers see persisted updates alongside live ones.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::session::types::SessionStatus;
use crate::storage::database::{
    append_event, parse_timestamp, Database, DatabaseError,
};
use crate::telemetry::types::RunSample;
use crate::validation::{ValidationConfig, ValidationError};

/// The latest persisted stat sample for one participant in one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub session_id: Uuid,
    pub participant_id: Uuid,
    pub distance_m: f64,
    pub duration_s: u32,
    pub pace_s_per_km: Option<f64>,
    pub heart_rate_bpm: Option<u8>,
    pub calories: u32,
    pub sequence: u64,
    /// Client-reported capture time; display only, never trusted.
    pub recorded_at: DateTime<Utc>,
    /// Stamped by the store on write; monotonically non-decreasing.
    pub server_received_at: DateTime<Utc>,
    pub paused: bool,
}

impl Snapshot {
    /// The persisted sample as a `RunSample`, for feeding a partner view.
    pub fn to_sample(&self) -> RunSample {
        RunSample {
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            pace_s_per_km: self.pace_s_per_km,
            heart_rate_bpm: self.heart_rate_bpm,
            calories: self.calories,
            sequence: self.sequence,
            recorded_at: self.recorded_at,
            paused: self.paused,
        }
    }
}

/// A persisted-change notification from the snapshot store.
#[derive(Debug, Clone)]
pub struct SnapshotChange {
    pub session_id: Uuid,
    pub snapshot: Snapshot,
}

/// Store for the latest persisted sample per (session, participant).
#[derive(Clone)]
pub struct SnapshotStore {
    db: Arc<Database>,
    validation: ValidationConfig,
    change_tx: broadcast::Sender<SnapshotChange>,
}

impl SnapshotStore {
    /// Create a snapshot store over the shared database.
    pub fn new(db: Arc<Database>, validation: ValidationConfig) -> Self {
        let (change_tx, _) = broadcast::channel(256);

        Self {
            db,
            validation,
            change_tx,
        }
    }

    /// Subscribe to persisted-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotChange> {
        self.change_tx.subscribe()
    }

    /// Validate and persist `sample` as the latest for the participant.
    ///
    /// The server receive timestamp is stamped here and never taken from
    /// the client; it is kept non-decreasing against the previous row.
    pub fn upsert(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        sample: &RunSample,
    ) -> Result<Snapshot, SnapshotError> {
        let now = Utc::now();

        let snapshot = {
            let mut conn = self.db.connection();
            let tx = conn
                .transaction()
                .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

            let session_status: String = tx
                .query_row(
                    "SELECT status FROM sessions WHERE id = ?1",
                    params![session_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => SnapshotError::SessionNotFound,
                    e => DatabaseError::QueryFailed(e.to_string()).into(),
                })?;

            if SessionStatus::parse(&session_status) != Some(SessionStatus::Active) {
                return Err(SnapshotError::SessionNotActive);
            }

            let previous = load_snapshot(&tx, session_id, participant_id)?;

            let gate_result = self.validation.check_sample(sample).and_then(|_| match &previous {
                Some(previous) => self.validation.check_update(previous, sample, now),
                None => Ok(()),
            });

            if let Err(rejection) = gate_result {
                append_event(
                    &tx,
                    session_id,
                    Some(participant_id),
                    "snapshot_rejected",
                    Some(serde_json::json!({ "reason": rejection.to_string() })),
                )?;
                tx.commit()
                    .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

                tracing::debug!(
                    session_id = %session_id,
                    %participant_id,
                    %rejection,
                    "snapshot write rejected"
                );
                return Err(rejection.into());
            }

            // Wall clocks can step backwards; the stored stamp must not.
            let server_received_at = match &previous {
                Some(previous) if previous.server_received_at > now => previous.server_received_at,
                _ => now,
            };

            tx.execute(
                "INSERT OR REPLACE INTO snapshots
                 (session_id, participant_id, distance_m, duration_s, pace_s_per_km,
                  heart_rate_bpm, calories, sequence, recorded_at, server_received_at, paused)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    session_id.to_string(),
                    participant_id.to_string(),
                    sample.distance_m,
                    sample.duration_s,
                    sample.pace_s_per_km,
                    sample.heart_rate_bpm,
                    sample.calories,
                    sample.sequence as i64,
                    sample.recorded_at.to_rfc3339(),
                    server_received_at.to_rfc3339(),
                    sample.paused as i32,
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            tx.commit()
                .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

            Snapshot {
                session_id,
                participant_id,
                distance_m: sample.distance_m,
                duration_s: sample.duration_s,
                pace_s_per_km: sample.pace_s_per_km,
                heart_rate_bpm: sample.heart_rate_bpm,
                calories: sample.calories,
                sequence: sample.sequence,
                recorded_at: sample.recorded_at,
                server_received_at,
                paused: sample.paused,
            }
        };

        let _ = self.change_tx.send(SnapshotChange {
            session_id,
            snapshot: snapshot.clone(),
        });

        Ok(snapshot)
    }

    /// The latest persisted sample for the participant, if any.
    pub fn get(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Option<Snapshot>, SnapshotError> {
        let conn = self.db.connection();
        load_snapshot(&conn, session_id, participant_id)
    }
}

fn load_snapshot(
    conn: &Connection,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<Option<Snapshot>, SnapshotError> {
    let mut stmt = conn
        .prepare(
            "SELECT distance_m, duration_s, pace_s_per_km, heart_rate_bpm, calories,
             sequence, recorded_at, server_received_at, paused
             FROM snapshots WHERE session_id = ?1 AND participant_id = ?2",
        )
        .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

    let result = stmt.query_row(
        params![session_id.to_string(), participant_id.to_string()],
        |row| {
            Ok(SnapshotRow {
                distance_m: row.get(0)?,
                duration_s: row.get(1)?,
                pace_s_per_km: row.get(2)?,
                heart_rate_bpm: row.get(3)?,
                calories: row.get(4)?,
                sequence: row.get(5)?,
                recorded_at: row.get(6)?,
                server_received_at: row.get(7)?,
                paused: row.get(8)?,
            })
        },
    );

    match result {
        Ok(row) => Ok(Some(row.into_snapshot(session_id, participant_id)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::QueryFailed(e.to_string()).into()),
    }
}

/// Intermediate struct for reading snapshot rows from the database.
struct SnapshotRow {
    distance_m: f64,
    duration_s: u32,
    pace_s_per_km: Option<f64>,
    heart_rate_bpm: Option<u8>,
    calories: u32,
    sequence: i64,
    recorded_at: String,
    server_received_at: String,
    paused: i32,
}

impl SnapshotRow {
    fn into_snapshot(
        self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> Result<Snapshot, DatabaseError> {
        Ok(Snapshot {
            session_id,
            participant_id,
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            pace_s_per_km: self.pace_s_per_km,
            heart_rate_bpm: self.heart_rate_bpm,
            calories: self.calories,
            sequence: self.sequence as u64,
            recorded_at: parse_timestamp(&self.recorded_at, "recorded_at")?,
            server_received_at: parse_timestamp(&self.server_received_at, "server_received_at")?,
            paused: self.paused != 0,
        })
    }
}

/// Snapshot write errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Session not found")]
    SessionNotFound,

    #[error("Session is not active")]
    SessionNotActive,

    #[error(transparent)]
    Rejected(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
