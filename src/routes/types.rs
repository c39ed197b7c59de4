//! Recorded route types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded point along a run: coordinate plus heart rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
    pub heart_rate_bpm: Option<u8>,
    pub recorded_at: DateTime<Utc>,
}

/// A participant's recorded GPS + heart-rate polyline for one run.
///
/// Best-effort data: a session completes whether or not a route was ever
/// captured for either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub participant_id: Uuid,
    pub points: Vec<RoutePoint>,
    pub recorded_at: DateTime<Utc>,
}

impl Route {
    /// Whether the polyline carries any points at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Handle to an activity found on the local health platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRef {
    pub id: String,
    pub started_at: DateTime<Utc>,
}
