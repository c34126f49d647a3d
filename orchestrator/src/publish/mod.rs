//! Progress publication
//!
//! The engine pushes every observable state change through a
//! `ProgressPublisher`. Delivery is fire-and-forget: the loop never waits
//! for an acknowledgment, and a slow or failing publisher must not stall
//! step execution.

pub mod broadcast;
pub mod trace;

use crate::models::confirmation::ConfirmationRequest;
use crate::models::progress::ProgressUpdate;
use crate::models::session::DeploymentSession;

/// Sink for session status, step progress and confirmation requests
pub trait ProgressPublisher: Send + Sync {
    /// Full session snapshot after a lifecycle change
    fn publish_status(&self, session_id: &str, snapshot: &DeploymentSession);

    /// Step-level progress update
    fn publish_progress(&self, session_id: &str, update: &ProgressUpdate);

    /// A new confirmation request awaiting an operator decision
    fn publish_confirmation(&self, session_id: &str, request: &ConfirmationRequest);
}

/// Publisher that drops everything, for embedders that poll instead
pub struct NullPublisher;

impl ProgressPublisher for NullPublisher {
    fn publish_status(&self, _session_id: &str, _snapshot: &DeploymentSession) {}
    fn publish_progress(&self, _session_id: &str, _update: &ProgressUpdate) {}
    fn publish_confirmation(&self, _session_id: &str, _request: &ConfirmationRequest) {}
}
