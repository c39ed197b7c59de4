//! Unit tests for validation gate boundaries.
//!
//! The gate rejects values beyond its limits, never values sitting
//! exactly on them.

use chrono::Utc;
use std::time::Duration;
use stridesync::{RunSample, ValidationConfig};

fn sample(pace: Option<f64>, bpm: Option<u8>) -> RunSample {
    RunSample {
        distance_m: 5000.0,
        duration_s: 1500,
        pace_s_per_km: pace,
        heart_rate_bpm: bpm,
        calories: 350,
        sequence: 1,
        recorded_at: Utc::now(),
        paused: false,
    }
}

#[test]
fn test_pace_exactly_on_floor_passes() {
    let config = ValidationConfig::default();
    assert!(config.check_sample(&sample(Some(120.0), None)).is_ok());
}

#[test]
fn test_pace_just_under_floor_rejected() {
    let config = ValidationConfig::default();
    assert!(config.check_sample(&sample(Some(119.9), None)).is_err());
}

#[test]
fn test_heart_rate_exactly_on_ceiling_passes() {
    let config = ValidationConfig::default();
    assert!(config.check_sample(&sample(None, Some(250))).is_ok());
}

#[test]
fn test_absent_readings_pass() {
    let config = ValidationConfig::default();
    assert!(config.check_sample(&sample(None, None)).is_ok());
}

#[test]
fn test_custom_limits_apply() {
    let config = ValidationConfig {
        min_pace_s_per_km: 200.0,
        max_heart_rate_bpm: 190,
        max_implied_speed_kmh: 25.0,
        min_write_spacing: Duration::from_secs(5),
        pending_invite_ceiling: 2,
    };

    assert!(config.check_sample(&sample(Some(150.0), None)).is_err());
    assert!(config.check_sample(&sample(None, Some(195))).is_err());
    assert!(config.check_sample(&sample(Some(250.0), Some(185))).is_ok());
}
