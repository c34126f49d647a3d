//! Publisher that emits progress as structured log events

use tracing::info;

use crate::models::confirmation::ConfirmationRequest;
use crate::models::progress::ProgressUpdate;
use crate::models::session::DeploymentSession;
use crate::publish::ProgressPublisher;

/// Logs every notification through `tracing`
pub struct TracingPublisher;

impl ProgressPublisher for TracingPublisher {
    fn publish_status(&self, session_id: &str, snapshot: &DeploymentSession) {
        info!(
            session_id = %session_id,
            running = snapshot.running,
            completed = snapshot.completed,
            success = snapshot.success,
            current_step = snapshot.current_step_index,
            "Session status"
        );
    }

    fn publish_progress(&self, session_id: &str, update: &ProgressUpdate) {
        info!(
            session_id = %session_id,
            step = %update.current_step.step_id,
            status = ?update.current_step.status,
            step_percent = update.current_step.progress_percent,
            overall_percent = update.overall_percent,
            "Step progress"
        );
    }

    fn publish_confirmation(&self, session_id: &str, request: &ConfirmationRequest) {
        info!(
            session_id = %session_id,
            step = %request.step_id,
            prompt = %request.prompt,
            "Confirmation requested"
        );
    }
}
