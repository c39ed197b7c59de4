//! Session lifecycle types and the client-side run context.

pub mod context;
pub mod types;

// Re-export commonly used types
pub use context::RunContext;
pub use types::{FinalStats, RunSession, SessionStatus};

/// How long an invite stays open before the sweep cancels it.
pub const INVITE_TTL_MINUTES: i64 = 5;

/// Maximum simultaneous pending invites per inviter.
pub const PENDING_INVITE_CEILING: u32 = 5;
