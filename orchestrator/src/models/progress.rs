//! Progress and status snapshots pushed to observers

use serde::{Deserialize, Serialize};

use crate::models::confirmation::ConfirmationRequest;
use crate::models::session::{DeploymentSession, StepState};

/// Point-in-time progress of one session, assembled by the engine loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Snapshot of the step the loop is positioned at
    pub current_step: StepState,

    /// Catalog length
    pub total_steps: usize,

    /// Steps completed so far
    pub completed_count: usize,

    /// Progress across the whole catalog, 0-100
    pub overall_percent: u8,

    /// Pending confirmation, when the session is paused for one
    pub pending_confirmation: Option<ConfirmationRequest>,
}

impl ProgressUpdate {
    /// Assemble a progress update from the session's current position
    pub fn from_session(
        session: &DeploymentSession,
        pending_confirmation: Option<ConfirmationRequest>,
    ) -> Option<Self> {
        let current_step = session.steps.get(session.current_step_index)?.clone();
        Some(Self {
            current_step,
            total_steps: session.steps.len(),
            completed_count: session.completed_count(),
            overall_percent: session.overall_percent(),
            pending_confirmation,
        })
    }
}
