//! Best-effort route capture and exchange.
//!
//! Runs after run end, fully decoupled from session completion: the local
//! route is discovered from the health platform with bounded polling,
//! uploaded to shared storage, and the partner's route is polled from the
//! same storage. Every outcome here is acceptable; "no route recorded" is
//! a terminal state, not an error.

use std::sync::Arc;
use uuid::Uuid;

use super::health::HealthPlatform;
use super::store::RouteStorage;
use super::types::Route;
use super::RouteConfig;
use crate::retry::CancelToken;

/// Terminal outcome of a local capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteCapture {
    /// Captured from the local health platform (and upload attempted).
    Captured(Route),
    /// Local capture failed but a previously uploaded copy was recovered
    /// from storage, e.g. after a reinstall or a device switch.
    Recovered(Route),
    /// Nothing locally and nothing in storage. Shown as "no route
    /// recorded"; a manual retry re-runs the whole capture.
    Unavailable,
}

impl RouteCapture {
    /// The captured or recovered route, if any.
    pub fn route(&self) -> Option<&Route> {
        match self {
            RouteCapture::Captured(route) | RouteCapture::Recovered(route) => Some(route),
            RouteCapture::Unavailable => None,
        }
    }
}

/// Route exchange service for one participant.
pub struct RouteExchange {
    health: Arc<dyn HealthPlatform>,
    storage: Arc<dyn RouteStorage>,
    config: RouteConfig,
    cancel: CancelToken,
}

impl RouteExchange {
    /// Create an exchange over the given platform and storage seams.
    pub fn new(
        health: Arc<dyn HealthPlatform>,
        storage: Arc<dyn RouteStorage>,
        config: RouteConfig,
    ) -> Self {
        Self {
            health,
            storage,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token that aborts all in-flight capture/poll loops.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Capture the local participant's route and upload it.
    ///
    /// Route data syncs slower than the activity record itself, so both
    /// the activity lookup and the route fetch poll with bounded retries.
    /// Calling this again is the manual-retry affordance.
    pub async fn capture_own_route(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> RouteCapture {
        let health = self.health.as_ref();
        let window = self.config.activity_window;

        let activity = self
            .config
            .activity_discovery
            .run(&self.cancel, || async move {
                match health.find_recent_run(window).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::debug!("activity lookup failed: {}", e);
                        None
                    }
                }
            })
            .await;

        if let Some(activity) = activity {
            let activity = &activity;
            let route = self
                .config
                .route_wait
                .run(&self.cancel, || async move {
                    match health.fetch_route(activity).await {
                        // An empty polyline means the platform has the
                        // activity but its route has not materialized yet.
                        Ok(Some(route)) if !route.is_empty() => Some(route),
                        Ok(_) => None,
                        Err(e) => {
                            tracing::debug!("route fetch failed: {}", e);
                            None
                        }
                    }
                })
                .await;

            if let Some(route) = route {
                // Upload is best effort; the local copy is already in hand.
                if let Err(e) = self.storage.upload(session_id, participant_id, &route).await {
                    tracing::warn!(
                        session_id = %session_id,
                        "route upload failed: {}",
                        e
                    );
                }
                return RouteCapture::Captured(route);
            }
        }

        // Local capture exhausted: a copy uploaded earlier (other device,
        // previous install) may still exist.
        match self.storage.download(session_id, participant_id).await {
            Ok(Some(route)) => RouteCapture::Recovered(route),
            Ok(None) => RouteCapture::Unavailable,
            Err(e) => {
                tracing::warn!(session_id = %session_id, "route download failed: {}", e);
                RouteCapture::Unavailable
            }
        }
    }

    /// Poll storage for the partner's route, stopping as soon as it
    /// appears or the bounded attempts run out.
    pub async fn poll_partner_route(
        &self,
        session_id: Uuid,
        partner_id: Uuid,
    ) -> Option<Route> {
        let storage = self.storage.as_ref();

        self.config
            .partner_poll
            .run(&self.cancel, || async move {
                match storage.download(session_id, partner_id).await {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::debug!("partner route poll failed: {}", e);
                        None
                    }
                }
            })
            .await
    }
}
