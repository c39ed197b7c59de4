//! Database operations using rusqlite.
//!
//! The single durable store behind the coordinating backend: session rows,
//! latest-value snapshots, and the append-only event log. One connection
//! behind a mutex; every state transition and validated write runs inside
//! a transaction on it, so concurrent calls from both participants
//! serialize without lost updates.

use chrono::Utc;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::schema::{CURRENT_VERSION, SCHEMA, SCHEMA_VERSION_TABLE};

/// Database wrapper for SQLite operations.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: &PathBuf) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::IoError(e.to_string()))?;
        }

        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), DatabaseError> {
        let conn = self.connection();

        conn.execute_batch(SCHEMA_VERSION_TABLE)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

        let current_version = Self::schema_version(&conn)?;

        if current_version < CURRENT_VERSION {
            Self::migrate(&conn, current_version)?;
        }

        Ok(())
    }

    /// Get the current schema version.
    fn schema_version(conn: &Connection) -> Result<i32, DatabaseError> {
        let result: SqliteResult<i32> = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(version) => Ok(version),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Run database migrations.
    fn migrate(conn: &Connection, from_version: i32) -> Result<(), DatabaseError> {
        if from_version < 1 {
            conn.execute_batch(SCHEMA)
                .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?, datetime('now'))",
                [CURRENT_VERSION],
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;

            tracing::info!("Database migrated to version {}", CURRENT_VERSION);
        }

        // Future migrations would go here:
        // if from_version < 2 { ... }

        Ok(())
    }

    /// Lock and return the underlying connection.
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ========== Event Log Operations ==========

    /// Append an observability event. Never read by the protocol.
    pub fn log_event(
        &self,
        session_id: Uuid,
        participant_id: Option<Uuid>,
        event_type: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<(), DatabaseError> {
        append_event(&self.connection(), session_id, participant_id, event_type, payload)
    }

    /// List logged event types for a session, oldest first (diagnosis only).
    pub fn list_events(&self, session_id: Uuid) -> Result<Vec<LoggedEvent>, DatabaseError> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(
                "SELECT participant_id, event_type, payload_json, created_at
                 FROM event_log WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![session_id.to_string()], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut events = Vec::new();
        for row in rows {
            let (participant_id, event_type, payload_json, created_at) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

            let participant_id = participant_id
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .map_err(|e| {
                    DatabaseError::DeserializationError(format!("Invalid UUID: {}", e))
                })?;

            let payload = payload_json
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| DatabaseError::DeserializationError(e.to_string()))?;

            events.push(LoggedEvent {
                session_id,
                participant_id,
                event_type,
                payload,
                created_at,
            });
        }

        Ok(events)
    }
}

/// Append an event on an already-held connection or open transaction, so
/// stores can log inside the transaction that produced the event.
pub(crate) fn append_event(
    conn: &Connection,
    session_id: Uuid,
    participant_id: Option<Uuid>,
    event_type: &str,
    payload: Option<serde_json::Value>,
) -> Result<(), DatabaseError> {
    let payload_json = payload
        .map(|p| serde_json::to_string(&p))
        .transpose()
        .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

    conn.execute(
        "INSERT INTO event_log (session_id, participant_id, event_type, payload_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            session_id.to_string(),
            participant_id.map(|id| id.to_string()),
            event_type,
            payload_json,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

    Ok(())
}

/// Parse an RFC 3339 TEXT column into a UTC timestamp.
pub(crate) fn parse_timestamp(
    s: &str,
    field: &str,
) -> Result<chrono::DateTime<Utc>, DatabaseError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::DeserializationError(format!("Invalid {}: {}", field, e)))
}

/// Parse a nullable RFC 3339 TEXT column.
pub(crate) fn parse_optional_timestamp(
    s: Option<String>,
    field: &str,
) -> Result<Option<chrono::DateTime<Utc>>, DatabaseError> {
    s.map(|s| parse_timestamp(&s, field)).transpose()
}

/// One entry read back from the event log.
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub session_id: Uuid,
    pub participant_id: Option<Uuid>,
    pub event_type: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: String,
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
