//! Shared object storage for recorded routes.

use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

use super::types::Route;

/// Object storage keyed by (session, participant). Uploads supersede any
/// previous object under the same key; routes are never deleted by the
/// protocol.
#[async_trait]
pub trait RouteStorage: Send + Sync {
    /// Store `route` under the participant's key for the session.
    async fn upload(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        route: &Route,
    ) -> anyhow::Result<()>;

    /// Fetch the route under the key, or `None` if nothing was uploaded.
    async fn download(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> anyhow::Result<Option<Route>>;
}

/// Filesystem-backed route storage: one JSON object per key under a base
/// directory. Stands in for a shared blob store in self-hosted and test
/// setups.
pub struct FsRouteStore {
    base_dir: PathBuf,
}

impl FsRouteStore {
    /// Create a store rooted at `base_dir`.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn object_path(&self, session_id: Uuid, participant_id: Uuid) -> PathBuf {
        self.base_dir
            .join(session_id.to_string())
            .join(format!("{}.json", participant_id))
    }
}

#[async_trait]
impl RouteStorage for FsRouteStore {
    async fn upload(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        route: &Route,
    ) -> anyhow::Result<()> {
        let path = self.object_path(session_id, participant_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec(route)?;
        std::fs::write(&path, json)?;

        tracing::debug!(session_id = %session_id, %participant_id, "route uploaded");
        Ok(())
    }

    async fn download(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> anyhow::Result<Option<Route>> {
        let path = self.object_path(session_id, participant_id);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}
