//! Engine configuration options

use std::time::Duration;

/// Tunables for the orchestration engine
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Advisory timeout attached to confirmation requests; forwarded to
    /// the operator surface, never enforced by the engine itself
    pub confirmation_timeout: Duration,

    /// Attempts made by the service-validation step before it fails
    pub validation_retries: u32,

    /// Delay between validation attempts
    pub validation_retry_delay: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(300),
            validation_retries: 10,
            validation_retry_delay: Duration::from_secs(3),
        }
    }
}
