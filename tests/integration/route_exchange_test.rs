//! Route capture and exchange scenarios with a scripted health platform.
//!
//! Runs under a paused clock so the minutes-long polling loops complete
//! instantly.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use stridesync::routes::{
    ActivityRef, FsRouteStore, HealthPlatform, Route, RouteCapture, RouteConfig, RouteExchange,
    RoutePoint, RouteStorage,
};
use uuid::Uuid;

/// Health platform double that starts returning data after a scripted
/// number of calls, mirroring the platform's slow background sync.
struct ScriptedHealth {
    activity_ready_after: u32,
    route_ready_after: u32,
    find_calls: AtomicU32,
    fetch_calls: AtomicU32,
    route: Route,
}

impl ScriptedHealth {
    fn new(activity_ready_after: u32, route_ready_after: u32, participant_id: Uuid) -> Self {
        Self {
            activity_ready_after,
            route_ready_after,
            find_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
            route: test_route(participant_id),
        }
    }
}

#[async_trait]
impl HealthPlatform for ScriptedHealth {
    async fn find_recent_run(
        &self,
        _window: ChronoDuration,
    ) -> anyhow::Result<Option<ActivityRef>> {
        let call = self.find_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.activity_ready_after {
            Ok(Some(ActivityRef {
                id: "activity-1".to_string(),
                started_at: Utc::now() - ChronoDuration::minutes(25),
            }))
        } else {
            Ok(None)
        }
    }

    async fn fetch_route(&self, _activity: &ActivityRef) -> anyhow::Result<Option<Route>> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.route_ready_after {
            Ok(Some(self.route.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Platform with nothing to offer, ever.
struct EmptyHealth;

#[async_trait]
impl HealthPlatform for EmptyHealth {
    async fn find_recent_run(
        &self,
        _window: ChronoDuration,
    ) -> anyhow::Result<Option<ActivityRef>> {
        Ok(None)
    }

    async fn fetch_route(&self, _activity: &ActivityRef) -> anyhow::Result<Option<Route>> {
        Ok(None)
    }
}

fn test_route(participant_id: Uuid) -> Route {
    Route {
        participant_id,
        points: vec![
            RoutePoint {
                latitude: 40.7812,
                longitude: -73.9665,
                heart_rate_bpm: Some(144),
                recorded_at: Utc::now(),
            },
            RoutePoint {
                latitude: 40.7823,
                longitude: -73.9641,
                heart_rate_bpm: Some(149),
                recorded_at: Utc::now(),
            },
        ],
        recorded_at: Utc::now(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_capture_uploads_and_partner_finds_it() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn RouteStorage> = Arc::new(FsRouteStore::new(dir.path().to_path_buf()));
    let (session_id, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    // Alice's platform needs a few polls before the data shows up.
    let alice_exchange = RouteExchange::new(
        Arc::new(ScriptedHealth::new(3, 2, alice)),
        Arc::clone(&storage),
        RouteConfig::default(),
    );

    let capture = alice_exchange.capture_own_route(session_id, alice).await;
    assert!(matches!(&capture, RouteCapture::Captured(_)));
    let route = capture.route().unwrap();
    assert_eq!(route.participant_id, alice);

    // Bob polls shared storage and sees Alice's upload.
    let bob_exchange = RouteExchange::new(
        Arc::new(EmptyHealth),
        Arc::clone(&storage),
        RouteConfig::default(),
    );
    let partners = bob_exchange.poll_partner_route(session_id, alice).await;
    assert_eq!(partners.as_ref(), Some(route));

    // Bob never uploaded anything, so his own key stays empty.
    assert!(bob_exchange
        .poll_partner_route(session_id, bob)
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_capture_recovers_previous_upload() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn RouteStorage> = Arc::new(FsRouteStore::new(dir.path().to_path_buf()));
    let (session_id, alice) = (Uuid::new_v4(), Uuid::new_v4());

    // A copy from a previous device is already in storage.
    let previous = test_route(alice);
    storage.upload(session_id, alice, &previous).await.unwrap();

    let exchange = RouteExchange::new(
        Arc::new(EmptyHealth),
        Arc::clone(&storage),
        RouteConfig::default(),
    );

    let capture = exchange.capture_own_route(session_id, alice).await;
    assert_eq!(capture, RouteCapture::Recovered(previous));
}

#[tokio::test(start_paused = true)]
async fn test_capture_unavailable_is_terminal_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn RouteStorage> = Arc::new(FsRouteStore::new(dir.path().to_path_buf()));

    let exchange = RouteExchange::new(
        Arc::new(EmptyHealth),
        Arc::clone(&storage),
        RouteConfig::default(),
    );

    let capture = exchange
        .capture_own_route(Uuid::new_v4(), Uuid::new_v4())
        .await;
    assert_eq!(capture, RouteCapture::Unavailable);
}

#[tokio::test(start_paused = true)]
async fn test_manual_retry_rediscovers_late_data() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn RouteStorage> = Arc::new(FsRouteStore::new(dir.path().to_path_buf()));
    let (session_id, alice) = (Uuid::new_v4(), Uuid::new_v4());

    // Data only appears after more polls than one capture run allows
    // (18 discovery attempts), so the first pass exhausts and the manual
    // retry succeeds.
    let exchange = RouteExchange::new(
        Arc::new(ScriptedHealth::new(20, 1, alice)),
        Arc::clone(&storage),
        RouteConfig::default(),
    );

    let first = exchange.capture_own_route(session_id, alice).await;
    assert_eq!(first, RouteCapture::Unavailable);

    let second = exchange.capture_own_route(session_id, alice).await;
    assert!(matches!(second, RouteCapture::Captured(_)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_aborts_polling() {
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn RouteStorage> = Arc::new(FsRouteStore::new(dir.path().to_path_buf()));

    let exchange = RouteExchange::new(
        Arc::new(EmptyHealth),
        Arc::clone(&storage),
        RouteConfig::default(),
    );
    exchange.cancel_token().cancel();

    let capture = exchange
        .capture_own_route(Uuid::new_v4(), Uuid::new_v4())
        .await;
    assert_eq!(capture, RouteCapture::Unavailable);
}
