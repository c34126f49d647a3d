//! Step executors
//!
//! One executor per canonical catalog step. Executors are stateless:
//! everything they need arrives as arguments (accumulated context, the
//! session's request config, the host channel) and everything they learn
//! goes back as a context delta. The engine may call an executor again
//! after an operator-requested retry.

pub mod app;
pub mod detect;
pub mod docker;
pub mod mirror;
pub mod validate;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::StepId;
use crate::channel::HostHandle;
use crate::context::{ContextDelta, StepContext};
use crate::errors::OrchestratorError;
use crate::locks::KeyedLocks;
use crate::options::EngineOptions;

/// Intermediate progress callback: percent within the step plus a message
pub type ProgressFn<'a> = &'a (dyn Fn(u8, &str) + Send + Sync);

/// Performs one provisioning step against a target host
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        step: StepId,
        ctx: &StepContext,
        config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError>;
}

/// Registry mapping each catalog step to its executor
pub struct StepExecutors {
    executors: HashMap<StepId, Arc<dyn StepExecutor>>,
}

impl StepExecutors {
    /// Empty registry; callers must register every step they run
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Registry wired with the built-in executors for all nine steps
    pub fn with_defaults(options: &EngineOptions) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let mut registry = Self::empty();

        registry.register(StepId::GeolocationDetection, Arc::new(detect::GeolocationDetect));
        registry.register(StepId::SystemDetection, Arc::new(detect::SystemDetect));
        registry.register(StepId::PackageManagerConfig, Arc::new(mirror::PackageManagerConfig));
        registry.register(StepId::DockerInstallation, Arc::new(docker::DockerInstall));
        registry.register(StepId::DockerMirrorConfig, Arc::new(mirror::DockerMirrorConfig));
        registry.register(
            StepId::AppDeployment,
            Arc::new(app::AppDeploy::new(locks.clone())),
        );
        registry.register(StepId::ExternalAccessConfig, Arc::new(validate::ExternalAccessConfig));
        registry.register(
            StepId::ServiceValidation,
            Arc::new(validate::ServiceValidation::new(
                options.validation_retries,
                options.validation_retry_delay,
            )),
        );
        registry.register(StepId::DeploymentComplete, Arc::new(validate::DeploymentSummary));

        registry
    }

    /// Register (or replace) the executor for one step
    pub fn register(&mut self, step: StepId, executor: Arc<dyn StepExecutor>) {
        self.executors.insert(step, executor);
    }

    /// Look up the executor for a step
    pub fn get(&self, step: StepId) -> Result<Arc<dyn StepExecutor>, OrchestratorError> {
        self.executors.get(&step).cloned().ok_or_else(|| {
            OrchestratorError::ConfigError(format!("No executor registered for step {step}"))
        })
    }
}
