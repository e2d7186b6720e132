//! In-memory session store.
//!
//! Each session sits behind its own mutex so mutations of one session are
//! serialized while other sessions stay available. Callers address sessions
//! by id and receive snapshots, never references into the store.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Location, Place, SearchParameters, Session};

/// Owner of every live session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new session with `cursor = 0` and no members or votes.
    pub async fn create(
        &self,
        session_id: impl Into<String>,
        parameters: SearchParameters,
        location: Location,
        candidates: Vec<Place>,
    ) -> Result<Session> {
        let session_id = session_id.into();
        if candidates.is_empty() {
            return Err(Error::NoCandidates { source: None });
        }

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(Error::DuplicateSession(session_id));
        }

        let session = Session::new(session_id.clone(), parameters, location, candidates);
        sessions.insert(session_id, Arc::new(Mutex::new(session.clone())));
        Ok(session)
    }

    /// Snapshot of a session.
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        let handle = self.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Add a member. Re-joining is a no-op.
    pub async fn join(&self, session_id: &str, user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(Error::invalid_parameters("user_id", "must not be empty"));
        }

        let handle = self.handle(session_id).await?;
        let mut session = handle.lock().await;
        if session.add_member(user_id) {
            debug!(
                "User {} added to session {}. Current members: {:?}",
                user_id, session_id, session.members
            );
        }
        Ok(())
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Ids of all stored sessions, sorted.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Per-session lock used by the engine to serialize mutations.
    pub(crate) async fn handle(&self, session_id: &str) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }
}
