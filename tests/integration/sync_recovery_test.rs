//! Dual-path synchronization and reconnect recovery scenarios.
//!
//! Exercises the engine against the durable store only; the live UDP
//! channel needs multicast networking, so its filtering logic is covered
//! by unit tests instead.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stridesync::sync::{SampleSource, SyncConfig, SyncError, SyncEvent};
use stridesync::telemetry::MotionSource;
use stridesync::{
    Database, RunContext, RunSample, SessionStatus, SessionStore, SnapshotStore, SyncEngine,
    TelemetrySampler, ValidationConfig,
};
use uuid::Uuid;

fn setup() -> (SessionStore, SnapshotStore, Uuid, Uuid, Uuid) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let validation = ValidationConfig {
        min_write_spacing: Duration::ZERO,
        ..ValidationConfig::default()
    };
    let sessions = SessionStore::new(Arc::clone(&db), validation);
    let snapshots = SnapshotStore::new(Arc::clone(&db), validation);

    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let session = sessions.create_invite(alice, bob).unwrap();
    sessions.accept_invite(session.id, bob).unwrap();

    (sessions, snapshots, session.id, alice, bob)
}

fn sample(distance_m: f64, sequence: u64) -> RunSample {
    RunSample {
        distance_m,
        duration_s: 600,
        pace_s_per_km: RunSample::derive_pace(distance_m, 600),
        heart_rate_bpm: Some(150),
        calories: 120,
        sequence,
        recorded_at: Utc::now(),
        paused: false,
    }
}

fn engine_for(
    sessions: &SessionStore,
    snapshots: &SnapshotStore,
    session_id: Uuid,
    local_id: Uuid,
) -> SyncEngine {
    let session = sessions.get_session(session_id).unwrap();
    let context = RunContext::new(session, local_id).unwrap();
    SyncEngine::new(context, snapshots.clone(), SyncConfig::default())
}

#[tokio::test]
async fn test_reconnect_falls_back_to_partner_durable_snapshot() {
    let (sessions, snapshots, session_id, alice, bob) = setup();

    // Bob's device kept persisting while Alice was offline.
    snapshots.upsert(session_id, bob, &sample(3200.0, 40)).unwrap();

    // Alice reconnects: instead of showing Bob as absent, her engine
    // reads his last durable snapshot, and subscribers hear about it.
    let engine = engine_for(&sessions, &snapshots, session_id, alice);
    let mut events = engine.subscribe();
    let partner = engine.resync().unwrap().unwrap();

    assert_eq!(partner.sample.distance_m, 3200.0);
    assert_eq!(partner.sample.sequence, 40);
    assert_eq!(partner.source, SampleSource::Durable);

    match events.try_recv().unwrap() {
        SyncEvent::PartnerUpdate(update) => assert_eq!(update.sample.sequence, 40),
        other => panic!("Expected partner update, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sampled_telemetry_flows_through_to_the_partner() {
    let (sessions, snapshots, session_id, alice, bob) = setup();

    struct TreadmillFeed;
    impl MotionSource for TreadmillFeed {
        fn distance_m(&self) -> f64 {
            1250.0
        }
        fn heart_rate_bpm(&self) -> Option<u8> {
            Some(141)
        }
    }

    // Alice's sampler reads her motion source; the engine persists the
    // sample; Bob's side reads it back as his partner view.
    let mut sampler = TelemetrySampler::new(Arc::new(TreadmillFeed), 68.0, Utc::now());
    let mut alice_engine = engine_for(&sessions, &snapshots, session_id, alice);
    alice_engine.publish(sampler.sample(Utc::now())).await.unwrap();

    let bob_engine = engine_for(&sessions, &snapshots, session_id, bob);
    let partner = bob_engine.resync().unwrap().unwrap();
    assert_eq!(partner.sample.distance_m, 1250.0);
    assert_eq!(partner.sample.heart_rate_bpm, Some(141));
    assert_eq!(partner.sample.sequence, 1);
}

#[tokio::test]
async fn test_restart_recovery_via_active_session_lookup() {
    let (sessions, snapshots, session_id, alice, bob) = setup();
    snapshots.upsert(session_id, bob, &sample(1500.0, 7)).unwrap();

    // Alice's app restarts mid-run: it finds the active session again and
    // rebuilds its context and engine from scratch.
    let recovered = sessions.fetch_active_session(alice).unwrap().unwrap();
    assert_eq!(recovered.id, session_id);

    let context = RunContext::new(recovered, alice).unwrap();
    assert_eq!(context.partner_id(), bob);

    let engine = SyncEngine::new(context, snapshots.clone(), SyncConfig::default());
    let partner = engine.resync().unwrap().unwrap();
    assert_eq!(partner.sample.distance_m, 1500.0);
}

#[tokio::test]
async fn test_durable_writes_are_throttled_to_the_interval() {
    let (sessions, snapshots, session_id, alice, _bob) = setup();
    let mut engine = engine_for(&sessions, &snapshots, session_id, alice);

    // First publish persists immediately; the next two fall inside the
    // durable interval and only go out on the (absent) live channel.
    engine.publish(sample(100.0, 1)).await.unwrap();
    engine.publish(sample(110.0, 2)).await.unwrap();
    engine.publish(sample(120.0, 3)).await.unwrap();

    let stored = snapshots.get(session_id, alice).unwrap().unwrap();
    assert_eq!(stored.sequence, 1);
    assert_eq!(stored.distance_m, 100.0);
}

#[tokio::test]
async fn test_plausibility_rejection_surfaces_through_publish() {
    let (sessions, snapshots, session_id, alice, _bob) = setup();
    let mut engine = engine_for(&sessions, &snapshots, session_id, alice);

    let mut cheat = sample(5000.0, 1);
    cheat.pace_s_per_km = Some(60.0);

    let err = engine.publish(cheat).await.unwrap_err();
    assert!(matches!(err, SyncError::Snapshot(_)));
    assert!(snapshots.get(session_id, alice).unwrap().is_none());
}

#[tokio::test]
async fn test_cancellation_tears_down_the_engine() {
    let (sessions, snapshots, session_id, alice, bob) = setup();
    let mut engine = engine_for(&sessions, &snapshots, session_id, alice);
    engine.publish(sample(100.0, 1)).await.unwrap();

    // Bob cancels; Alice observes the transition on refresh and reacts
    // locally.
    sessions.decline_or_cancel(session_id, bob).unwrap();
    let mut context = engine.context().clone();
    let observed = context.refresh(&sessions).unwrap();
    assert_eq!(observed, Some(SessionStatus::Cancelled));

    engine.handle_transition(SessionStatus::Cancelled).await;

    let err = engine.publish(sample(200.0, 2)).await.unwrap_err();
    assert!(matches!(err, SyncError::Stopped));
}
