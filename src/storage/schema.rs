//! Database schema definitions for the run-session store.

/// SQL schema for creating all tables.
pub const SCHEMA: &str = r#"
-- Virtual run sessions
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    inviter_id TEXT NOT NULL,
    invitee_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    started_at TEXT,
    ended_at TEXT,
    inviter_distance_m REAL,
    inviter_duration_s INTEGER,
    inviter_avg_pace REAL,
    inviter_avg_hr INTEGER,
    invitee_distance_m REAL,
    invitee_duration_s INTEGER,
    invitee_avg_pace REAL,
    invitee_avg_hr INTEGER,
    winner_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_sessions_inviter ON sessions(inviter_id);
CREATE INDEX IF NOT EXISTS idx_sessions_invitee ON sessions(invitee_id);

-- At most one active session per participant, per role; the accept
-- transaction checks across both roles.
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_inviter_active
    ON sessions(inviter_id) WHERE status = 'active';
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_invitee_active
    ON sessions(invitee_id) WHERE status = 'active';

-- Latest persisted stat sample per (session, participant)
CREATE TABLE IF NOT EXISTS snapshots (
    session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    participant_id TEXT NOT NULL,
    distance_m REAL NOT NULL,
    duration_s INTEGER NOT NULL,
    pace_s_per_km REAL,
    heart_rate_bpm INTEGER,
    calories INTEGER NOT NULL,
    sequence INTEGER NOT NULL,
    recorded_at TEXT NOT NULL,
    server_received_at TEXT NOT NULL,
    paused INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (session_id, participant_id)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_received
    ON snapshots(session_id, server_received_at);

-- Append-only observability log; never read by the protocol
CREATE TABLE IF NOT EXISTS event_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    participant_id TEXT,
    event_type TEXT NOT NULL,
    payload_json TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_log_session ON event_log(session_id);
"#;

/// SQL for schema version tracking (migrations)
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;
