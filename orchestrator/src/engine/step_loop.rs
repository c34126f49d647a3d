//! The re-entrant step loop
//!
//! The loop owns no call-stack state across suspensions: pausing is
//! implemented by returning, and a later confirmation launches a fresh
//! task that re-enters here and picks up from the session's persisted
//! `current_step_index` and step statuses.

use chrono::Utc;
use serde_json::Map;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::catalog::StepId;
use crate::engine::run_token::RunToken;
use crate::engine::EngineShared;
use crate::errors::OrchestratorError;
use crate::models::confirmation::ConfirmationRequest;
use crate::models::progress::ProgressUpdate;
use crate::models::session::{DeployMode, FinalResult, StepStatus};
use crate::store::SessionHandle;

/// What the loop should do after handling one step
enum StepOutcome {
    /// Move on to the next step
    Advance,
    /// End this task; the session is paused or terminal
    Suspend,
}

impl EngineShared {
    /// Walk the session's steps from its persisted position
    pub(crate) async fn run_loop(&self, handle: Arc<SessionHandle>, token: RunToken) {
        // Held for the whole task so no second loop can race this one
        let _token = token;

        let session_id = handle.request.session_id.clone();
        let total = StepId::ALL.len();
        debug!("Entering step loop for session {}", session_id);

        loop {
            let (index, running, completed) = {
                let session = handle.state.read().await;
                (session.current_step_index, session.running, session.completed)
            };

            // Cooperative cancellation, checked only at step boundaries
            if !running || completed {
                debug!("Session {} no longer running, loop exiting", session_id);
                return;
            }
            if index >= total {
                break;
            }

            let (step_id, status, requires_confirmation) = {
                let session = handle.state.read().await;
                let step = &session.steps[index];
                (step.step_id, step.status, step.requires_confirmation)
            };

            let outcome = match status {
                // Paused; a confirmation dispatch will relaunch the loop.
                // Entering here without one pending is the spurious-resume
                // no-op: nothing is mutated.
                StepStatus::WaitingConfirmation => StepOutcome::Suspend,

                // Already done (e.g. skipped); just move past it
                StepStatus::Completed => {
                    let mut session = handle.state.write().await;
                    session.current_step_index = index + 1;
                    StepOutcome::Advance
                }

                StepStatus::Pending if requires_confirmation => {
                    self.request_confirmation(&handle, index).await;
                    StepOutcome::Suspend
                }

                // Pending in trust mode, or already marked ready by a
                // Confirm/Retry dispatch
                StepStatus::Pending | StepStatus::Running => {
                    self.execute_step(&handle, index, step_id).await
                }

                // A failed step either ended the session (trust mode) or
                // was turned into a recovery confirmation; reaching it
                // here means there is nothing left to drive.
                StepStatus::Failed => StepOutcome::Suspend,
            };

            match outcome {
                StepOutcome::Advance => continue,
                StepOutcome::Suspend => return,
            }
        }

        self.finalize_success(&handle).await;
    }

    /// Install a pre-step confirmation request and pause the session
    ///
    /// The gate entry is installed while the state write lock is still
    /// held: a concurrent cancel either finalizes first (observed by the
    /// re-check here, nothing is installed) or discards under the same
    /// lock afterwards. The gate never keeps a request for a session that
    /// was already torn down.
    async fn request_confirmation(&self, handle: &Arc<SessionHandle>, index: usize) {
        let session_id = handle.request.session_id.clone();
        let timeout = self.options.confirmation_timeout.as_secs();

        let request = {
            let mut session = handle.state.write().await;
            if !session.running || session.completed {
                return;
            }
            let step = &mut session.steps[index];
            step.status = StepStatus::WaitingConfirmation;
            step.message = Some("Waiting for operator confirmation".to_string());
            step.log("Waiting for operator confirmation");
            let request =
                ConfirmationRequest::before_step(step.step_id, timeout, step.context_data.clone());

            if let Err(e) = self.gate.open(&session_id, request.clone()) {
                // At-most-one invariant; a leftover request here is a bug
                warn!("Session {}: could not open confirmation: {}", session_id, e);
            }
            self.publisher.publish_confirmation(&session_id, &request);
            request
        };

        self.publish_progress(handle, Some(request)).await;
    }

    /// Run one step's executor, forwarding its intermediate progress
    async fn execute_step(
        &self,
        handle: &Arc<SessionHandle>,
        index: usize,
        step_id: StepId,
    ) -> StepOutcome {
        let session_id = handle.request.session_id.clone();

        {
            let mut session = handle.state.write().await;
            let step = &mut session.steps[index];
            step.status = StepStatus::Running;
            step.progress_percent = 0;
            step.message = Some(format!("Running: {}", step_id.display_name()));
            step.log("Step started");
        }
        self.publish_progress(handle, None).await;

        let executor = match self.executors.get(step_id) {
            Ok(executor) => executor,
            Err(e) => return self.handle_failure(handle, index, step_id, e).await,
        };

        let (ctx, config) = {
            let ctx = handle.context.read().await.clone();
            let session = handle.state.read().await;
            (ctx, session.request_config.clone())
        };
        let host = handle.host.clone();

        // Executors report progress through a sync callback; forward each
        // report into session state and out to the publisher while the
        // executor future is still in flight.
        let (tx, mut rx) = mpsc::unbounded_channel::<(u8, String)>();
        let on_progress = move |percent: u8, message: &str| {
            let _ = tx.send((percent, message.to_string()));
        };

        let exec_fut = executor.execute(step_id, &ctx, &config, &host, &on_progress);
        tokio::pin!(exec_fut);

        let result = loop {
            tokio::select! {
                result = &mut exec_fut => break result,
                Some((percent, message)) = rx.recv() => {
                    self.apply_progress(handle, index, percent, &message).await;
                }
            }
        };
        while let Ok((percent, message)) = rx.try_recv() {
            self.apply_progress(handle, index, percent, &message).await;
        }

        match result {
            Ok(delta) => {
                {
                    let mut context = handle.context.write().await;
                    context.absorb(step_id, delta.clone());
                }

                let mut session = handle.state.write().await;
                if !session.running || session.completed {
                    // Cancelled while the executor ran; the session was
                    // finalized elsewhere and must not be touched again
                    return StepOutcome::Suspend;
                }
                let step = &mut session.steps[index];
                step.context_data.extend(delta);
                step.status = StepStatus::Completed;
                step.error_message = None;
                step.progress_percent = 100;
                step.message = Some(format!("Completed: {}", step_id.display_name()));
                step.log("Step completed");
                drop(session);

                info!("Session {}: step {} completed", session_id, step_id);
                self.publish_progress(handle, None).await;

                let mut session = handle.state.write().await;
                if !session.completed {
                    session.current_step_index = index + 1;
                }
                StepOutcome::Advance
            }
            Err(e) => self.handle_failure(handle, index, step_id, e).await,
        }
    }

    /// Apply a step failure per the session's mode
    async fn handle_failure(
        &self,
        handle: &Arc<SessionHandle>,
        index: usize,
        step_id: StepId,
        error: OrchestratorError,
    ) -> StepOutcome {
        let session_id = handle.request.session_id.clone();
        let message = error.to_string();
        error!("Session {}: step {} failed: {}", session_id, step_id, message);

        let mode = {
            let mut session = handle.state.write().await;
            if !session.running || session.completed {
                return StepOutcome::Suspend;
            }
            let mode = session.mode;
            let step = &mut session.steps[index];
            step.status = StepStatus::Failed;
            step.error_message = Some(message.clone());
            step.log(format!("Step failed: {message}"));
            mode
        };

        match mode {
            // First failure ends the whole deployment
            DeployMode::Trust => {
                let mut session = handle.state.write().await;
                if session.completed {
                    return StepOutcome::Suspend;
                }
                session.running = false;
                session.completed = true;
                session.success = false;
                session.end_time = Some(Utc::now());
                let snapshot = session.clone();
                drop(session);

                self.publisher.publish_status(&session_id, &snapshot);
                self.store.remove(&session_id);
                StepOutcome::Suspend
            }

            // Offer the operator retry/skip/cancel
            DeployMode::Confirmation => {
                let timeout = self.options.confirmation_timeout.as_secs();
                // Installed under the state lock, same as the pre-step
                // request, so a racing cancel cannot strand the entry
                let request = {
                    let mut session = handle.state.write().await;
                    if session.completed {
                        return StepOutcome::Suspend;
                    }
                    let step = &mut session.steps[index];
                    step.status = StepStatus::WaitingConfirmation;
                    let request = ConfirmationRequest::recovery(
                        step_id,
                        &message,
                        timeout,
                        step.context_data.clone(),
                    );

                    if let Err(e) = self.gate.open(&session_id, request.clone()) {
                        warn!("Session {}: could not open recovery confirmation: {}", session_id, e);
                    }
                    self.publisher.publish_confirmation(&session_id, &request);
                    request
                };

                self.publish_progress(handle, Some(request)).await;
                StepOutcome::Suspend
            }
        }
    }

    /// Mark the session successfully completed and clean it up
    async fn finalize_success(&self, handle: &Arc<SessionHandle>) {
        let session_id = handle.request.session_id.clone();

        let summary = {
            let context = handle.context.read().await;
            context
                .for_step(StepId::DeploymentComplete)
                .cloned()
                .unwrap_or_else(Map::new)
        };

        let snapshot = {
            let mut session = handle.state.write().await;
            if session.completed {
                return;
            }
            let now = Utc::now();
            session.running = false;
            session.completed = true;
            session.success = true;
            session.end_time = Some(now);

            let skipped = session
                .steps
                .iter()
                .filter(|s| s.context_data.get("skipped").is_some())
                .count();
            session.final_result = Some(FinalResult {
                elapsed_secs: (now - session.start_time).num_seconds(),
                total_steps: session.steps.len(),
                completed_steps: session.completed_count(),
                skipped_steps: skipped,
                summary,
            });
            session.clone()
        };

        info!(
            "Session {} completed successfully in {}s",
            session_id,
            snapshot
                .final_result
                .as_ref()
                .map(|r| r.elapsed_secs)
                .unwrap_or_default()
        );
        self.publisher.publish_status(&session_id, &snapshot);
        self.store.remove(&session_id);
    }

    /// Emit the current step-level progress
    async fn apply_progress(
        &self,
        handle: &Arc<SessionHandle>,
        index: usize,
        percent: u8,
        message: &str,
    ) {
        {
            let mut session = handle.state.write().await;
            if !session.running || session.completed {
                // Executor still streaming after a cancel finalized the
                // session; its reports are dropped
                return;
            }
            let step = &mut session.steps[index];
            step.progress_percent = percent.min(100);
            step.message = Some(message.to_string());
            step.log(message);
        }
        self.publish_progress(handle, None).await;
    }

    async fn publish_progress(
        &self,
        handle: &Arc<SessionHandle>,
        pending: Option<ConfirmationRequest>,
    ) {
        let session = handle.state.read().await;
        if session.completed {
            // Nothing follows the terminal status event
            return;
        }
        if let Some(update) = ProgressUpdate::from_session(&session, pending) {
            self.publisher.publish_progress(&session.session_id, &update);
        }
    }
}
