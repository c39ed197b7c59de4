//! Live telemetry sample types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One live stat sample for a participant mid-run.
///
/// Samples carry a per-participant monotonically increasing sequence
/// number; receivers on any path discard a sample whose sequence does not
/// exceed the last one they accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    /// Cumulative distance in meters
    pub distance_m: f64,
    /// Elapsed running time in seconds, excluding paused intervals
    pub duration_s: u32,
    /// Derived pace in seconds per kilometer, absent until distance is
    /// meaningful
    pub pace_s_per_km: Option<f64>,
    /// Current heart rate in BPM
    pub heart_rate_bpm: Option<u8>,
    /// Estimated energy expenditure in kcal
    pub calories: u32,
    /// Per-participant monotonically increasing sequence number
    pub sequence: u64,
    /// Client-side capture timestamp
    pub recorded_at: DateTime<Utc>,
    /// Whether the participant has paused the run
    pub paused: bool,
}

impl RunSample {
    /// Pace in seconds per kilometer for the given totals, or `None` below
    /// the minimum distance at which pace is meaningful.
    pub fn derive_pace(distance_m: f64, duration_s: u32) -> Option<f64> {
        if distance_m < MIN_PACE_DISTANCE_M {
            return None;
        }
        Some(duration_s as f64 / (distance_m / 1000.0))
    }
}

/// Distance below which derived pace is considered noise.
pub const MIN_PACE_DISTANCE_M: f64 = 50.0;
