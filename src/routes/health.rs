//! Local wearable/health platform seam.

use async_trait::async_trait;
use chrono::Duration;

use super::types::{ActivityRef, Route};

/// The device's health platform, reduced to the two calls the route
/// exchange needs. Both are fallible and may legitimately come back
/// empty: the platform syncs activity records before route data, often
/// minutes apart.
#[async_trait]
pub trait HealthPlatform: Send + Sync {
    /// Find the most recent running activity started within `window` of
    /// now, if one has synced yet.
    async fn find_recent_run(&self, window: Duration) -> anyhow::Result<Option<ActivityRef>>;

    /// Fetch the route + heart-rate series for an activity, if it has
    /// materialized yet.
    async fn fetch_route(&self, activity: &ActivityRef) -> anyhow::Result<Option<Route>>;
}
