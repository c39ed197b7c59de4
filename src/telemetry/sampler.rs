//! Telemetry sampling from local motion and heart-rate sources.
//!
//! Produces the periodic stat samples fed to the synchronization engine.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;

use super::types::RunSample;

/// Source of local motion and heart-rate readings.
///
/// Implemented over the device's platform APIs; test doubles return
/// scripted values.
pub trait MotionSource: Send + Sync {
    /// Cumulative distance covered since the run started, in meters.
    fn distance_m(&self) -> f64;

    /// Current heart rate reading, if a monitor is paired.
    fn heart_rate_bpm(&self) -> Option<u8>;
}

/// kcal per kilogram per kilometer for level running.
const RUNNING_KCAL_PER_KG_KM: f64 = 1.036;

/// Produces sequenced stat samples for the local participant.
///
/// Tracks pause state so that paused intervals accrue no duration, and
/// stamps each sample with the next sequence number.
pub struct TelemetrySampler {
    source: Arc<dyn MotionSource>,
    weight_kg: f64,
    started_at: DateTime<Utc>,
    sequence: u64,
    paused: bool,
    paused_total: ChronoDuration,
    paused_since: Option<DateTime<Utc>>,
}

impl TelemetrySampler {
    /// Create a sampler for a run starting at `started_at`.
    pub fn new(source: Arc<dyn MotionSource>, weight_kg: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            source,
            weight_kg,
            started_at,
            sequence: 0,
            paused: false,
            paused_total: ChronoDuration::zero(),
            paused_since: None,
        }
    }

    /// Pause the run clock.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if !self.paused {
            self.paused = true;
            self.paused_since = Some(now);
        }
    }

    /// Resume the run clock.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.paused {
            if let Some(since) = self.paused_since.take() {
                self.paused_total = self.paused_total + (now - since);
            }
            self.paused = false;
        }
    }

    /// Whether the run is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Produce the next sample at `now`.
    pub fn sample(&mut self, now: DateTime<Utc>) -> RunSample {
        let distance_m = self.source.distance_m();
        let duration_s = self.elapsed_seconds(now);
        let distance_km = distance_m / 1000.0;
        let calories = (self.weight_kg * distance_km * RUNNING_KCAL_PER_KG_KM).round() as u32;

        self.sequence += 1;

        RunSample {
            distance_m,
            duration_s,
            pace_s_per_km: RunSample::derive_pace(distance_m, duration_s),
            heart_rate_bpm: self.source.heart_rate_bpm(),
            calories,
            sequence: self.sequence,
            recorded_at: now,
            paused: self.paused,
        }
    }

    /// Active running time in seconds at `now`, excluding paused intervals.
    fn elapsed_seconds(&self, now: DateTime<Utc>) -> u32 {
        let mut paused = self.paused_total;
        if let Some(since) = self.paused_since {
            paused = paused + (now - since);
        }
        let active = (now - self.started_at) - paused;
        active.num_seconds().max(0) as u32
    }
}
