//! Plausibility and rate-limit validation of client-reported telemetry.
//!
//! Applied synchronously to every durable snapshot write and every invite
//! creation. A failed check rejects the write with a typed error; stored
//! state is never clamped or partially applied.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::session::PENDING_INVITE_CEILING;
use crate::storage::snapshot_store::Snapshot;
use crate::telemetry::types::RunSample;

/// Tunable validation policy.
///
/// The numeric bounds are policy values, not protocol invariants; defaults
/// match deployed behavior.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    /// World-record floor: any reported pace faster (smaller) than this is
    /// rejected. Seconds per kilometer.
    pub min_pace_s_per_km: f64,
    /// Physiological ceiling on reported heart rate, in BPM.
    pub max_heart_rate_bpm: u8,
    /// Ceiling on the average speed implied by a distance delta between
    /// consecutive persisted samples, in km/h.
    pub max_implied_speed_kmh: f64,
    /// Minimum spacing between durable writes per (session, participant).
    pub min_write_spacing: Duration,
    /// Maximum simultaneous pending invites per inviter.
    pub pending_invite_ceiling: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_pace_s_per_km: 120.0,
            max_heart_rate_bpm: 250,
            max_implied_speed_kmh: 60.0,
            min_write_spacing: Duration::from_secs(10),
            pending_invite_ceiling: PENDING_INVITE_CEILING,
        }
    }
}

impl ValidationConfig {
    /// Checks applied to every sample, insert or update.
    pub fn check_sample(&self, sample: &RunSample) -> Result<(), ValidationError> {
        if let Some(pace) = sample.pace_s_per_km {
            if pace < self.min_pace_s_per_km {
                return Err(ValidationError::ImplausiblePace {
                    pace_s_per_km: pace,
                    floor: self.min_pace_s_per_km,
                });
            }
        }

        if let Some(bpm) = sample.heart_rate_bpm {
            if bpm > self.max_heart_rate_bpm {
                return Err(ValidationError::ImplausibleHeartRate {
                    bpm,
                    ceiling: self.max_heart_rate_bpm,
                });
            }
        }

        Ok(())
    }

    /// Additional checks applied when a persisted sample already exists.
    ///
    /// `now` is the server receive time being stamped onto the update; the
    /// implied speed is measured against the previous row's server
    /// timestamp, which the client cannot influence.
    pub fn check_update(
        &self,
        previous: &Snapshot,
        sample: &RunSample,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if sample.sequence <= previous.sequence {
            return Err(ValidationError::StaleSequence {
                sequence: sample.sequence,
                last_accepted: previous.sequence,
            });
        }

        let elapsed = now - previous.server_received_at;
        let elapsed_s = elapsed.num_milliseconds() as f64 / 1000.0;

        if elapsed_s < self.min_write_spacing.as_secs_f64() {
            return Err(ValidationError::WriteTooSoon {
                spacing: self.min_write_spacing,
            });
        }

        let delta_m = sample.distance_m - previous.distance_m;
        if delta_m > 0.0 && elapsed_s > 0.0 {
            let speed_kmh = delta_m / 1000.0 / (elapsed_s / 3600.0);
            if speed_kmh > self.max_implied_speed_kmh {
                return Err(ValidationError::ImplausibleSpeed {
                    speed_kmh,
                    ceiling: self.max_implied_speed_kmh,
                });
            }
        }

        Ok(())
    }
}

/// A rejected write. The write did not apply; state is unchanged.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("pace {pace_s_per_km:.0} s/km is faster than the {floor:.0} s/km floor")]
    ImplausiblePace { pace_s_per_km: f64, floor: f64 },

    #[error("heart rate {bpm} bpm exceeds the {ceiling} bpm ceiling")]
    ImplausibleHeartRate { bpm: u8, ceiling: u8 },

    #[error("implied speed {speed_kmh:.1} km/h exceeds the {ceiling:.0} km/h ceiling")]
    ImplausibleSpeed { speed_kmh: f64, ceiling: f64 },

    #[error("persisted less than {spacing:?} ago")]
    WriteTooSoon { spacing: Duration },

    #[error("sequence {sequence} does not exceed last accepted {last_accepted}")]
    StaleSequence { sequence: u64, last_accepted: u64 },

    #[error("pending invite ceiling of {ceiling} reached")]
    InviteCeiling { ceiling: u32 },
}
