//! End-to-end virtual run protocol scenarios over an in-memory store.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stridesync::session::FinalStats;
use stridesync::{
    Database, RunSample, SessionStatus, SessionStore, SnapshotStore, ValidationConfig,
};
use uuid::Uuid;

struct Harness {
    db: Arc<Database>,
    sessions: SessionStore,
    snapshots: SnapshotStore,
}

fn harness() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    // Spacing relaxed so scenario steps can persist back to back.
    let validation = ValidationConfig {
        min_write_spacing: Duration::ZERO,
        ..ValidationConfig::default()
    };
    Harness {
        sessions: SessionStore::new(Arc::clone(&db), validation),
        snapshots: SnapshotStore::new(Arc::clone(&db), validation),
        db,
    }
}

fn sample(distance_m: f64, duration_s: u32, sequence: u64) -> RunSample {
    RunSample {
        distance_m,
        duration_s,
        pace_s_per_km: RunSample::derive_pace(distance_m, duration_s),
        heart_rate_bpm: Some(155),
        calories: (distance_m / 1000.0 * 70.0) as u32,
        sequence,
        recorded_at: Utc::now(),
        paused: false,
    }
}

fn final_stats(distance_m: f64, duration_s: u32) -> FinalStats {
    FinalStats {
        distance_m,
        duration_s,
        avg_pace_s_per_km: RunSample::derive_pace(distance_m, duration_s),
        avg_heart_rate_bpm: Some(152),
    }
}

#[test]
fn test_full_virtual_run() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    // Invite and accept.
    let session = h.sessions.create_invite(alice, bob).unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    let session = h.sessions.accept_invite(session.id, bob).unwrap();
    assert_eq!(session.status, SessionStatus::Active);

    // Both sides persist snapshots during the run; each can read the
    // other's latest.
    h.snapshots
        .upsert(session.id, alice, &sample(2500.0, 750, 10))
        .unwrap();
    h.snapshots
        .upsert(session.id, bob, &sample(2400.0, 760, 12))
        .unwrap();

    let bobs_view_of_alice = h.snapshots.get(session.id, alice).unwrap().unwrap();
    assert_eq!(bobs_view_of_alice.distance_m, 2500.0);
    let alices_view_of_bob = h.snapshots.get(session.id, bob).unwrap().unwrap();
    assert_eq!(alices_view_of_bob.distance_m, 2400.0);

    // Alice finishes first with 5000 m; the session stays active until
    // Bob's own submission lands 40 seconds later with 4800 m.
    let after_alice = h
        .sessions
        .submit_final_stats(session.id, alice, final_stats(5000.0, 1500))
        .unwrap();
    assert_eq!(after_alice.status, SessionStatus::Active);
    assert!(after_alice.winner_id.is_none());

    let done = h
        .sessions
        .submit_final_stats(session.id, bob, final_stats(4800.0, 1540))
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.winner_id, Some(alice));
    assert!(done.ended_at.is_some());
    assert_eq!(done.stats_of(alice).unwrap().distance_m, 5000.0);
    assert_eq!(done.stats_of(bob).unwrap().distance_m, 4800.0);

    // The event log tells the whole story, in order.
    let events: Vec<String> = h
        .db
        .list_events(session.id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        events,
        vec![
            "invite_created",
            "invite_accepted",
            "final_stats_submitted",
            "final_stats_submitted",
            "session_completed",
        ]
    );
}

#[test]
fn test_completion_call_order_does_not_matter() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let session = h.sessions.create_invite(alice, bob).unwrap();
    h.sessions.accept_invite(session.id, bob).unwrap();

    // Invitee reports first this time.
    let after_bob = h
        .sessions
        .submit_final_stats(session.id, bob, final_stats(6200.0, 1800))
        .unwrap();
    assert_eq!(after_bob.status, SessionStatus::Active);

    let done = h
        .sessions
        .submit_final_stats(session.id, alice, final_stats(6000.0, 1750))
        .unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.winner_id, Some(bob));
}

#[test]
fn test_resubmission_supersedes_and_recomputes_winner() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let session = h.sessions.create_invite(alice, bob).unwrap();
    h.sessions.accept_invite(session.id, bob).unwrap();

    h.sessions
        .submit_final_stats(session.id, alice, final_stats(5000.0, 1500))
        .unwrap();
    let done = h
        .sessions
        .submit_final_stats(session.id, bob, final_stats(4800.0, 1540))
        .unwrap();
    assert_eq!(done.winner_id, Some(alice));

    // Bob's corrected upload shows he actually ran further; the latest
    // call is authoritative and the winner flips.
    let corrected = h
        .sessions
        .submit_final_stats(session.id, bob, final_stats(5200.0, 1540))
        .unwrap();
    assert_eq!(corrected.status, SessionStatus::Completed);
    assert_eq!(corrected.winner_id, Some(bob));
}

#[test]
fn test_single_active_session_per_participant() {
    let h = harness();
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let first = h.sessions.create_invite(alice, bob).unwrap();
    h.sessions.accept_invite(first.id, bob).unwrap();

    // Bob cannot enter a second run while the first is active.
    let second = h.sessions.create_invite(carol, bob).unwrap();
    assert!(h.sessions.accept_invite(second.id, bob).is_err());

    // Once the first run ends, the pending invite becomes acceptable.
    h.sessions.decline_or_cancel(first.id, alice).unwrap();
    let second = h.sessions.accept_invite(second.id, bob).unwrap();
    assert_eq!(second.status, SessionStatus::Active);

    assert_eq!(
        h.sessions.fetch_active_session(bob).unwrap().unwrap().id,
        second.id
    );
}

#[test]
fn test_cancelled_snapshots_are_refused() {
    let h = harness();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    let session = h.sessions.create_invite(alice, bob).unwrap();
    h.sessions.accept_invite(session.id, bob).unwrap();
    h.snapshots
        .upsert(session.id, alice, &sample(1000.0, 300, 1))
        .unwrap();

    h.sessions.decline_or_cancel(session.id, bob).unwrap();

    // The run is over; late telemetry no longer lands.
    assert!(h
        .snapshots
        .upsert(session.id, alice, &sample(1100.0, 330, 2))
        .is_err());
}
