//! Per-session exclusive execution token
//!
//! Exactly one loop task may execute a session at any moment. Launching a
//! task (initial start or resume after a confirmation) requires acquiring
//! the session's token first; a concurrent second resume fails with
//! `ConcurrentResume` instead of racing a parallel loop. The token is an
//! RAII guard, so a panicking loop task still releases it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::errors::OrchestratorError;
use crate::store::SessionHandle;

/// RAII guard proving exclusive right to execute a session's loop
pub struct RunToken {
    handle: Arc<SessionHandle>,
}

impl std::fmt::Debug for RunToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunToken")
            .field("handle", &self.handle)
            .finish()
    }
}

impl RunToken {
    /// Try to acquire the session's execution token
    pub fn acquire(handle: &Arc<SessionHandle>) -> Result<RunToken, OrchestratorError> {
        let claimed = handle
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if claimed {
            Ok(RunToken {
                handle: handle.clone(),
            })
        } else {
            Err(OrchestratorError::ConcurrentResume(
                handle.request.session_id.clone(),
            ))
        }
    }
}

impl Drop for RunToken {
    fn drop(&mut self) {
        self.handle.executing.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LocalChannel;
    use crate::models::session::DeployMode;
    use crate::store::{SessionStore, StartRequest};
    use serde_json::Map;

    fn handle() -> Arc<SessionHandle> {
        let store = SessionStore::new();
        store
            .create(
                StartRequest {
                    session_id: "s-1".to_string(),
                    mode: DeployMode::Trust,
                    request_config: Map::new(),
                },
                Arc::new(LocalChannel),
            )
            .unwrap()
    }

    #[test]
    fn test_second_acquire_rejected_while_held() {
        let handle = handle();
        let token = RunToken::acquire(&handle).unwrap();

        let err = RunToken::acquire(&handle).unwrap_err();
        assert!(matches!(err, OrchestratorError::ConcurrentResume(_)));

        drop(token);
        assert!(RunToken::acquire(&handle).is_ok());
    }
}
