//! Deployment session models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::StepId;

/// Operation mode of a deployment session, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Pause before every step and after every failure for operator approval
    Confirmation,

    /// Run all steps without pausing, abort on first failure
    Trust,
}

/// Lifecycle status of a single provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    WaitingConfirmation,
    Completed,
    Failed,
}

/// Runtime state of one canonical step within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepState {
    /// Canonical step identifier
    pub step_id: StepId,

    /// Human-readable name shown to the operator
    pub display_name: String,

    /// Current status
    pub status: StepStatus,

    /// Progress within this step, 0-100
    pub progress_percent: u8,

    /// Latest progress message
    pub message: Option<String>,

    /// Error message when the step failed
    pub error_message: Option<String>,

    /// Whether this step pauses for operator approval before running
    pub requires_confirmation: bool,

    /// Timestamped log lines, append-only
    pub logs: Vec<String>,

    /// Results this step's executor produced for downstream steps
    pub context_data: Map<String, Value>,
}

impl StepState {
    /// Create a pending step for the given catalog entry
    pub fn new(step_id: StepId, requires_confirmation: bool) -> Self {
        Self {
            step_id,
            display_name: step_id.display_name().to_string(),
            status: StepStatus::Pending,
            progress_percent: 0,
            message: None,
            error_message: None,
            requires_confirmation,
            logs: Vec::new(),
            context_data: Map::new(),
        }
    }

    /// Append a timestamped log line
    pub fn log(&mut self, line: impl AsRef<str>) {
        let stamped = format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), line.as_ref());
        self.logs.push(stamped);
    }
}

/// Summary produced when a session reaches normal completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    /// Total wall-clock duration in seconds
    pub elapsed_secs: i64,

    /// Number of steps in the catalog
    pub total_steps: usize,

    /// Steps that finished as completed (including skipped ones)
    pub completed_steps: usize,

    /// Steps the operator explicitly skipped
    pub skipped_steps: usize,

    /// Access summary assembled by the final step, if any
    pub summary: Map<String, Value>,
}

/// One in-flight deployment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSession {
    /// Externally supplied unique session key
    pub session_id: String,

    /// Operation mode, fixed at creation
    pub mode: DeployMode,

    /// Ordered step states, fixed length and order
    pub steps: Vec<StepState>,

    /// Index of the step the loop is currently positioned at
    pub current_step_index: usize,

    /// True while the session may still make progress
    pub running: bool,

    /// True once the session reached a terminal state
    pub completed: bool,

    /// True only on normal successful completion
    pub success: bool,

    /// Session creation time
    pub start_time: DateTime<Utc>,

    /// Terminal completion time
    pub end_time: Option<DateTime<Utc>>,

    /// Opaque configuration supplied at creation, read by step executors
    pub request_config: Map<String, Value>,

    /// Populated only on normal completion
    pub final_result: Option<FinalResult>,
}

impl DeploymentSession {
    /// Create a new running session with all catalog steps pending
    pub fn new(session_id: String, mode: DeployMode, request_config: Map<String, Value>) -> Self {
        let requires_confirmation = mode == DeployMode::Confirmation;
        let steps = StepId::ALL
            .iter()
            .map(|id| StepState::new(*id, requires_confirmation))
            .collect();

        Self {
            session_id,
            mode,
            steps,
            current_step_index: 0,
            running: true,
            completed: false,
            success: false,
            start_time: Utc::now(),
            end_time: None,
            request_config,
            final_result: None,
        }
    }

    /// Number of steps currently completed
    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// Overall progress across the whole catalog, 0-100
    pub fn overall_percent(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        let total: u32 = self
            .steps
            .iter()
            .map(|s| match s.status {
                StepStatus::Completed => 100u32,
                _ => s.progress_percent as u32,
            })
            .sum();
        (total / self.steps.len() as u32) as u8
    }

    /// Mutable access to the step at the current index
    pub fn current_step_mut(&mut self) -> Option<&mut StepState> {
        let idx = self.current_step_index;
        self.steps.get_mut(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_all_pending() {
        let session =
            DeploymentSession::new("s-1".to_string(), DeployMode::Trust, Map::new());

        assert_eq!(session.steps.len(), 9);
        assert!(session.running);
        assert!(!session.completed);
        assert!(session.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(session.steps.iter().all(|s| !s.requires_confirmation));
    }

    #[test]
    fn test_confirmation_mode_marks_all_steps() {
        let session =
            DeploymentSession::new("s-2".to_string(), DeployMode::Confirmation, Map::new());

        assert!(session.steps.iter().all(|s| s.requires_confirmation));
    }

    #[test]
    fn test_overall_percent() {
        let mut session =
            DeploymentSession::new("s-3".to_string(), DeployMode::Trust, Map::new());
        for step in session.steps.iter_mut().take(3) {
            step.status = StepStatus::Completed;
        }

        // 3 of 9 steps fully complete
        assert_eq!(session.overall_percent(), 33);
        assert_eq!(session.completed_count(), 3);
    }
}
