//! Error types for the Helmsman orchestrator

use thiserror::Error;

use crate::catalog::StepId;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("No pending confirmation for session: {0}")]
    NoPendingConfirmation(String),

    #[error("Confirmation already pending for session: {0}")]
    ConfirmationPending(String),

    #[error("Confirmation step mismatch: expected {expected}, got {got}")]
    StepMismatch { expected: StepId, got: StepId },

    #[error("Session {0} already has an active execution task")]
    ConcurrentResume(String),

    #[error("Step {step} failed: {message}")]
    StepFailed { step: StepId, message: String },

    #[error("Missing upstream context: step {step} did not provide '{key}'")]
    MissingUpstream { step: StepId, key: String },

    #[error("Command channel error: {0}")]
    ChannelError(String),

    #[error("Remote command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
