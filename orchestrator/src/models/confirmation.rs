//! Operator confirmation models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::StepId;

/// One choice offered to the operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationOption {
    /// Machine key, e.g. `confirm`, `retry`
    pub key: String,

    /// Human-readable label
    pub label: String,

    /// Marked as the suggested choice
    pub recommended: bool,

    /// Marked as potentially destructive or unsafe
    pub risky: bool,
}

impl ConfirmationOption {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            recommended: false,
            risky: false,
        }
    }

    pub fn recommended(mut self) -> Self {
        self.recommended = true;
        self
    }

    pub fn risky(mut self) -> Self {
        self.risky = true;
        self
    }
}

/// A pending request for operator approval; at most one per session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    /// Step awaiting a decision
    pub step_id: StepId,

    /// Question shown to the operator
    pub prompt: String,

    /// Ordered choices
    pub options: Vec<ConfirmationOption>,

    /// Key of the option applied if the operator does not answer
    pub default_choice: String,

    /// Advisory timeout; the engine itself never enforces expiry
    pub timeout_seconds: u64,

    /// Copy of the triggering step's context data
    pub context_snapshot: Map<String, Value>,
}

impl ConfirmationRequest {
    /// Build a pre-step approval request
    pub fn before_step(step_id: StepId, timeout_seconds: u64, snapshot: Map<String, Value>) -> Self {
        Self {
            step_id,
            prompt: format!("Run step '{}'?", step_id.display_name()),
            options: vec![
                ConfirmationOption::new("confirm", "Run this step").recommended(),
                ConfirmationOption::new("skip", "Skip this step").risky(),
                ConfirmationOption::new("cancel", "Cancel the deployment").risky(),
            ],
            default_choice: "confirm".to_string(),
            timeout_seconds,
            context_snapshot: snapshot,
        }
    }

    /// Build a failure-recovery request
    pub fn recovery(
        step_id: StepId,
        error: &str,
        timeout_seconds: u64,
        snapshot: Map<String, Value>,
    ) -> Self {
        Self {
            step_id,
            prompt: format!(
                "Step '{}' failed: {}. How should the deployment proceed?",
                step_id.display_name(),
                error
            ),
            options: vec![
                ConfirmationOption::new("retry", "Retry the step").recommended(),
                ConfirmationOption::new("skip", "Skip and continue").risky(),
                ConfirmationOption::new("cancel", "Cancel the deployment").risky(),
            ],
            default_choice: "retry".to_string(),
            timeout_seconds,
            context_snapshot: snapshot,
        }
    }
}

/// Operator decision on a pending confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationAction {
    Confirm,
    Skip,
    Cancel,
    Retry,
}

/// Operator response to a pending confirmation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    /// Step the decision applies to; must match the pending request
    pub step_id: StepId,

    /// The decision
    pub action: ConfirmationAction,

    /// Optional operator-supplied reason, recorded in the step log
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_step_request_defaults_to_confirm() {
        let req = ConfirmationRequest::before_step(StepId::DockerInstallation, 300, Map::new());

        assert_eq!(req.default_choice, "confirm");
        assert_eq!(req.options.len(), 3);
        assert!(req.options[0].recommended);
        assert!(req.options.iter().any(|o| o.key == "cancel" && o.risky));
    }

    #[test]
    fn test_recovery_request_defaults_to_retry() {
        let req =
            ConfirmationRequest::recovery(StepId::AppDeployment, "compose failed", 300, Map::new());

        assert_eq!(req.default_choice, "retry");
        assert!(req.prompt.contains("compose failed"));
    }
}
