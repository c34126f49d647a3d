//! Orchestration engine
//!
//! `DeploymentEngine` is the operator-facing control surface: it creates
//! sessions, launches the step loop, dispatches confirmation responses and
//! handles cancellation. The loop itself lives in `step_loop`; the
//! per-session exclusivity guard in `run_token`.

mod run_token;
mod step_loop;

pub use run_token::RunToken;

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::channel::HostHandle;
use crate::errors::OrchestratorError;
use crate::gate::ConfirmationGate;
use crate::models::confirmation::{ConfirmationAction, ConfirmationResponse};
use crate::models::session::{DeployMode, DeploymentSession, StepStatus};
use crate::options::EngineOptions;
use crate::publish::ProgressPublisher;
use crate::steps::StepExecutors;
use crate::store::{SessionHandle, SessionStore, StartRequest};

pub(crate) struct EngineShared {
    pub(crate) store: Arc<SessionStore>,
    pub(crate) gate: ConfirmationGate,
    pub(crate) executors: StepExecutors,
    pub(crate) publisher: Arc<dyn ProgressPublisher>,
    pub(crate) options: EngineOptions,
}

/// Interactive deployment orchestrator
pub struct DeploymentEngine {
    shared: Arc<EngineShared>,
}

impl DeploymentEngine {
    pub fn new(
        store: Arc<SessionStore>,
        executors: StepExecutors,
        publisher: Arc<dyn ProgressPublisher>,
        options: EngineOptions,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                store,
                gate: ConfirmationGate::new(),
                executors,
                publisher,
                options,
            }),
        }
    }

    /// Create a session and launch its step loop asynchronously
    pub async fn start(
        &self,
        session_id: &str,
        mode: DeployMode,
        request_config: Map<String, Value>,
        host: HostHandle,
    ) -> Result<(), OrchestratorError> {
        let request = StartRequest {
            session_id: session_id.to_string(),
            mode,
            request_config,
        };
        let handle = self.shared.store.create(request, host)?;
        info!("Deployment session {} created (mode: {:?})", session_id, mode);

        let token = RunToken::acquire(&handle)?;
        self.launch(handle, token);
        Ok(())
    }

    /// Dispatch an operator decision on the session's pending confirmation
    pub async fn confirm(
        &self,
        session_id: &str,
        response: ConfirmationResponse,
    ) -> Result<(), OrchestratorError> {
        let handle = self.shared.store.get(session_id)?;

        // Token first: a resume racing an active loop task must be
        // rejected before it can consume the pending request.
        let token = RunToken::acquire(&handle)?;
        let request = self.shared.gate.resolve(session_id, &response)?;

        info!(
            "Session {}: operator chose {:?} for step {}",
            session_id, response.action, request.step_id
        );

        match response.action {
            ConfirmationAction::Confirm => {
                self.mark_step_ready(&handle, "Operator confirmed execution").await;
                self.launch(handle, token);
            }
            ConfirmationAction::Retry => {
                self.mark_step_ready(&handle, "Operator requested retry").await;
                self.launch(handle, token);
            }
            ConfirmationAction::Skip => {
                self.skip_current_step(&handle, response.reason.as_deref()).await;
                self.launch(handle, token);
            }
            ConfirmationAction::Cancel => {
                drop(token);
                let reason = response
                    .reason
                    .unwrap_or_else(|| "Cancelled by operator".to_string());
                self.finalize_cancelled(&handle, &reason).await;
            }
        }

        Ok(())
    }

    /// Cancel a session from any state
    ///
    /// Cooperative: a step already delegated to an executor finishes, but
    /// its loop task observes the cleared `running` flag at the next step
    /// boundary and exits without touching the finalized state.
    pub async fn cancel(&self, session_id: &str, reason: &str) -> Result<(), OrchestratorError> {
        let handle = self.shared.store.get(session_id)?;
        self.finalize_cancelled(&handle, reason).await;
        Ok(())
    }

    /// Current snapshot of a session's state
    pub async fn get_status(&self, session_id: &str) -> Result<DeploymentSession, OrchestratorError> {
        let handle = self.shared.store.get(session_id)?;
        let session = handle.state.read().await;
        Ok(session.clone())
    }

    /// The session's pending confirmation request, if any
    pub fn pending_confirmation(
        &self,
        session_id: &str,
    ) -> Option<crate::models::confirmation::ConfirmationRequest> {
        self.shared.gate.peek(session_id)
    }

    fn launch(&self, handle: Arc<SessionHandle>, token: RunToken) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            shared.run_loop(handle, token).await;
        });
    }

    /// Transition the waiting step back onto the normal running path
    async fn mark_step_ready(&self, handle: &Arc<SessionHandle>, note: &str) {
        let mut session = handle.state.write().await;
        if let Some(step) = session.current_step_mut() {
            step.status = StepStatus::Running;
            step.message = Some(note.to_string());
            step.log(note);
        }
    }

    /// Mark the waiting step completed with a skip annotation and move past it
    async fn skip_current_step(&self, handle: &Arc<SessionHandle>, reason: Option<&str>) {
        let mut session = handle.state.write().await;
        let index = session.current_step_index;
        if let Some(step) = session.current_step_mut() {
            let note = match reason {
                Some(r) => format!("Skipped by operator: {r}"),
                None => "Skipped by operator".to_string(),
            };
            step.status = StepStatus::Completed;
            step.progress_percent = 100;
            step.message = Some(note.clone());
            step.error_message = None;
            step.context_data.insert("skipped".to_string(), json!(true));
            step.log(note);
        }
        session.current_step_index = index + 1;
    }

    /// Finalize a cancelled session and remove it from the store
    ///
    /// The gate is discarded while the state write lock is held. The loop
    /// installs confirmation requests under the same lock, so the discard
    /// sees any request installed before the cancel, and the loop's own
    /// terminal re-check stops one from being installed after it.
    async fn finalize_cancelled(&self, handle: &Arc<SessionHandle>, reason: &str) {
        let session_id = handle.request.session_id.clone();

        {
            let mut session = handle.state.write().await;
            self.shared.gate.discard(&session_id);
            if session.completed {
                // Already terminal; cleanup below stays idempotent
                warn!("Session {} cancelled after completion, ignoring", session_id);
            } else {
                session.running = false;
                session.completed = true;
                session.success = false;
                session.end_time = Some(Utc::now());
                if let Some(step) = session.current_step_mut() {
                    step.status = StepStatus::Failed;
                    step.error_message = Some(reason.to_string());
                    step.log(format!("Cancelled: {reason}"));
                }
                info!("Session {} cancelled: {}", session_id, reason);
            }
            self.shared.publisher.publish_status(&session_id, &session);
        }

        self.shared.store.remove(&session_id);
    }
}
