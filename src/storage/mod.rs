//! Durable storage for the coordinating backend.
//!
//! Session rows, latest-value snapshots, and the append-only event log,
//! all behind one SQLite database.

pub mod database;
pub mod schema;
pub mod session_store;
pub mod snapshot_store;

// Re-export commonly used types
pub use database::{Database, DatabaseError};
pub use session_store::{SessionError, SessionStore};
pub use snapshot_store::{Snapshot, SnapshotChange, SnapshotError, SnapshotStore};
