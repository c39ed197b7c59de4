//! Telemetry sampling for the local participant.
//!
//! Reads local motion/heart-rate data and produces the periodic stat
//! samples published on both synchronization paths.

pub mod sampler;
pub mod types;

// Re-export commonly used types
pub use sampler::{MotionSource, TelemetrySampler};
pub use types::RunSample;
