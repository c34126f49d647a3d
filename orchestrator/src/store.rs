//! In-memory session registry
//!
//! Holds every in-flight `DeploymentSession` together with the pieces a
//! later resume needs: the host command channel and the original start
//! request. Entries are removed on cancellation and on terminal
//! completion; removal is idempotent.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use crate::channel::HostHandle;
use crate::context::StepContext;
use crate::errors::OrchestratorError;
use crate::models::session::{DeployMode, DeploymentSession};

/// The request that created a session, retained verbatim for resume
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub session_id: String,
    pub mode: DeployMode,
    pub request_config: Map<String, Value>,
}

/// One registered session and its runtime companions
pub struct SessionHandle {
    /// Mutable session state; single writer at a time
    pub state: tokio::sync::RwLock<DeploymentSession>,

    /// Accumulated cross-step results
    pub context: tokio::sync::RwLock<StepContext>,

    /// Command channel to the target host, shared read-only
    pub host: HostHandle,

    /// Original start request
    pub request: StartRequest,

    /// Exclusive execution token; true while a loop task is active
    pub executing: AtomicBool,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("request", &self.request)
            .field("executing", &self.executing)
            .finish_non_exhaustive()
    }
}

/// Concurrency-safe registry of in-flight sessions
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session; rejects duplicate session ids
    pub fn create(
        &self,
        request: StartRequest,
        host: HostHandle,
    ) -> Result<Arc<SessionHandle>, OrchestratorError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());

        if sessions.contains_key(&request.session_id) {
            return Err(OrchestratorError::SessionExists(request.session_id.clone()));
        }

        let session = DeploymentSession::new(
            request.session_id.clone(),
            request.mode,
            request.request_config.clone(),
        );

        let handle = Arc::new(SessionHandle {
            state: tokio::sync::RwLock::new(session),
            context: tokio::sync::RwLock::new(StepContext::new()),
            host,
            request: request.clone(),
            executing: AtomicBool::new(false),
        });

        sessions.insert(request.session_id, handle.clone());
        Ok(handle)
    }

    /// Look up a session by id
    pub fn get(&self, session_id: &str) -> Result<Arc<SessionHandle>, OrchestratorError> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }

    /// Remove a session; safe to call when already absent
    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id)
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalChannel;

    fn request(id: &str) -> StartRequest {
        StartRequest {
            session_id: id.to_string(),
            mode: DeployMode::Trust,
            request_config: Map::new(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::new();
        store.create(request("s-1"), Arc::new(LocalChannel)).unwrap();

        let handle = store.get("s-1").unwrap();
        assert_eq!(handle.request.session_id, "s-1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = SessionStore::new();
        store.create(request("s-1"), Arc::new(LocalChannel)).unwrap();

        let err = store.create(request("s-1"), Arc::new(LocalChannel)).unwrap_err();
        assert!(matches!(err, OrchestratorError::SessionExists(_)));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SessionStore::new();
        store.create(request("s-1"), Arc::new(LocalChannel)).unwrap();

        assert!(store.remove("s-1").is_some());
        assert!(store.remove("s-1").is_none());
        assert!(store.get("s-1").is_err());
    }
}
