//! StrideSync - Virtual Run Synchronization
//!
//! Lets two runners on separate devices run "together" in real time: live
//! distance/pace/heart-rate exchange over a low-latency ephemeral channel
//! with a durable fallback, a shared session lifecycle, plausibility
//! validation of reported telemetry, two-phase completion with a mutually
//! agreed result, and best-effort exchange of recorded GPS routes.

pub mod reaper;
pub mod retry;
pub mod routes;
pub mod session;
pub mod storage;
pub mod sync;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types
pub use retry::{CancelToken, RetryPolicy};
pub use session::context::RunContext;
pub use session::types::{FinalStats, RunSession, SessionStatus};
pub use storage::database::Database;
pub use storage::session_store::SessionStore;
pub use storage::snapshot_store::SnapshotStore;
pub use sync::engine::SyncEngine;
pub use telemetry::sampler::TelemetrySampler;
pub use telemetry::types::RunSample;
pub use validation::ValidationConfig;
