//! Confirmation gate
//!
//! Tracks the single outstanding confirmation request per session. The
//! gate never enforces `timeout_seconds`; that value is advisory metadata
//! for the operator surface.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::errors::OrchestratorError;
use crate::models::confirmation::{ConfirmationRequest, ConfirmationResponse};

/// At-most-one pending confirmation request per session
#[derive(Default)]
pub struct ConfirmationGate {
    pending: RwLock<HashMap<String, ConfirmationRequest>>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a pending request; rejects if one is already open
    pub fn open(
        &self,
        session_id: &str,
        request: ConfirmationRequest,
    ) -> Result<(), OrchestratorError> {
        let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());

        if pending.contains_key(session_id) {
            return Err(OrchestratorError::ConfirmationPending(session_id.to_string()));
        }

        pending.insert(session_id.to_string(), request);
        Ok(())
    }

    /// Atomically take the pending request matching the given response
    ///
    /// The request is removed before being returned, so the engine acts on
    /// each confirmation exactly once. A response for the wrong step puts
    /// the request back untouched.
    pub fn resolve(
        &self,
        session_id: &str,
        response: &ConfirmationResponse,
    ) -> Result<ConfirmationRequest, OrchestratorError> {
        let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());

        let request = pending
            .remove(session_id)
            .ok_or_else(|| OrchestratorError::NoPendingConfirmation(session_id.to_string()))?;

        if request.step_id != response.step_id {
            let expected = request.step_id;
            pending.insert(session_id.to_string(), request);
            return Err(OrchestratorError::StepMismatch {
                expected,
                got: response.step_id,
            });
        }

        Ok(request)
    }

    /// Look at the pending request without consuming it
    pub fn peek(&self, session_id: &str) -> Option<ConfirmationRequest> {
        let pending = self.pending.read().unwrap_or_else(|e| e.into_inner());
        pending.get(session_id).cloned()
    }

    /// Drop any pending request, e.g. on cancellation
    pub fn discard(&self, session_id: &str) -> Option<ConfirmationRequest> {
        let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
        pending.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StepId;
    use crate::models::confirmation::ConfirmationAction;
    use serde_json::Map;

    fn request(step: StepId) -> ConfirmationRequest {
        ConfirmationRequest::before_step(step, 300, Map::new())
    }

    fn response(step: StepId) -> ConfirmationResponse {
        ConfirmationResponse {
            step_id: step,
            action: ConfirmationAction::Confirm,
            reason: None,
        }
    }

    #[test]
    fn test_open_rejects_second_request() {
        let gate = ConfirmationGate::new();
        gate.open("s-1", request(StepId::SystemDetection)).unwrap();

        let err = gate.open("s-1", request(StepId::DockerInstallation)).unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfirmationPending(_)));
    }

    #[test]
    fn test_resolve_consumes_request() {
        let gate = ConfirmationGate::new();
        gate.open("s-1", request(StepId::SystemDetection)).unwrap();

        gate.resolve("s-1", &response(StepId::SystemDetection)).unwrap();

        let err = gate.resolve("s-1", &response(StepId::SystemDetection)).unwrap_err();
        assert!(matches!(err, OrchestratorError::NoPendingConfirmation(_)));
    }

    #[test]
    fn test_step_mismatch_keeps_request_pending() {
        let gate = ConfirmationGate::new();
        gate.open("s-1", request(StepId::SystemDetection)).unwrap();

        let err = gate.resolve("s-1", &response(StepId::AppDeployment)).unwrap_err();
        assert!(matches!(err, OrchestratorError::StepMismatch { .. }));
        assert!(gate.peek("s-1").is_some());
    }
}
