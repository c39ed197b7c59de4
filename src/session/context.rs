//! Client-side context for the run in progress.
//!
//! One `RunContext` is created per accepted session and handed to the
//! synchronization and presentation layers, instead of a process-wide
//! "current run" singleton. The owner re-reads session state through
//! `refresh` and tears its loops down when a terminal transition is
//! observed; cancellation is never pushed from the backend.

use uuid::Uuid;

use super::types::{RunSession, SessionStatus};
use crate::storage::session_store::{SessionError, SessionStore};

/// The local participant's view of one run session.
#[derive(Debug, Clone)]
pub struct RunContext {
    session: RunSession,
    local_id: Uuid,
    partner_id: Uuid,
}

impl RunContext {
    /// Build a context for `local_id`'s side of `session`.
    pub fn new(session: RunSession, local_id: Uuid) -> Result<Self, SessionError> {
        let partner_id = session
            .partner_of(local_id)
            .ok_or(SessionError::NotAParticipant)?;

        Ok(Self {
            session,
            local_id,
            partner_id,
        })
    }

    /// The session as last observed.
    pub fn session(&self) -> &RunSession {
        &self.session
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    pub fn partner_id(&self) -> Uuid {
        self.partner_id
    }

    /// Whether the session has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.session.status.is_terminal()
    }

    /// Re-read the session from the store. Returns the new status when it
    /// changed since the last observation; a terminal return obliges the
    /// caller to stop its synchronization loops.
    pub fn refresh(&mut self, store: &SessionStore) -> Result<Option<SessionStatus>, SessionError> {
        let latest = store.get_session(self.session.id)?;
        let changed = latest.status != self.session.status;
        self.session = latest;

        if changed {
            tracing::info!(
                session_id = %self.session.id,
                status = %self.session.status,
                "session transition observed"
            );
            Ok(Some(self.session.status))
        } else {
            Ok(None)
        }
    }
}
