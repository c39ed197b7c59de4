//! Unit tests for the client-side run context.

use std::sync::Arc;
use stridesync::storage::session_store::SessionError;
use stridesync::{Database, RunContext, SessionStatus, SessionStore, ValidationConfig};
use uuid::Uuid;

fn store() -> SessionStore {
    let db = Arc::new(Database::open_in_memory().unwrap());
    SessionStore::new(db, ValidationConfig::default())
}

#[test]
fn test_context_knows_the_partner() {
    let store = store();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let session = store.create_invite(a, b).unwrap();

    let context = RunContext::new(session.clone(), a).unwrap();
    assert_eq!(context.partner_id(), b);

    let context = RunContext::new(session, b).unwrap();
    assert_eq!(context.partner_id(), a);
}

#[test]
fn test_context_rejects_outsiders() {
    let store = store();
    let session = store.create_invite(Uuid::new_v4(), Uuid::new_v4()).unwrap();

    let result = RunContext::new(session, Uuid::new_v4());
    assert!(matches!(result, Err(SessionError::NotAParticipant)));
}

#[test]
fn test_refresh_reports_transition_once() {
    let store = store();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let session = store.create_invite(a, b).unwrap();
    let mut context = RunContext::new(session.clone(), a).unwrap();

    // Nothing changed yet.
    assert_eq!(context.refresh(&store).unwrap(), None);

    store.accept_invite(session.id, b).unwrap();
    assert_eq!(context.refresh(&store).unwrap(), Some(SessionStatus::Active));
    assert!(!context.is_terminal());

    // Partner cancels; the context observes the terminal state exactly once.
    store.decline_or_cancel(session.id, b).unwrap();
    assert_eq!(
        context.refresh(&store).unwrap(),
        Some(SessionStatus::Cancelled)
    );
    assert!(context.is_terminal());
    assert_eq!(context.refresh(&store).unwrap(), None);
}
