//! Best-effort exchange of recorded GPS/heart-rate routes.

use chrono::Duration as ChronoDuration;
use std::time::Duration;

pub mod exchange;
pub mod health;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use exchange::{RouteCapture, RouteExchange};
pub use health::HealthPlatform;
pub use store::{FsRouteStore, RouteStorage};
pub use types::{ActivityRef, Route, RoutePoint};

use crate::retry::RetryPolicy;

/// Route exchange configuration.
///
/// All bounds are policy values; defaults match deployed behavior.
#[derive(Debug, Clone, Copy)]
pub struct RouteConfig {
    /// How far back to look for the just-finished running activity.
    pub activity_window: ChronoDuration,
    /// Polling for the activity record to appear on the platform.
    pub activity_discovery: RetryPolicy,
    /// Polling for the route polyline to materialize once the activity
    /// is found.
    pub route_wait: RetryPolicy,
    /// Polling storage for the partner's uploaded route.
    pub partner_poll: RetryPolicy,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            activity_window: ChronoDuration::minutes(30),
            activity_discovery: RetryPolicy::new(18, Duration::from_secs(10))
                .with_ceiling(Duration::from_secs(180)),
            route_wait: RetryPolicy::new(30, Duration::from_secs(10))
                .with_ceiling(Duration::from_secs(300)),
            partner_poll: RetryPolicy::new(36, Duration::from_secs(10))
                .with_ceiling(Duration::from_secs(360)),
        }
    }
}

impl RouteConfig {
    /// Create a new route exchange configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }
}
