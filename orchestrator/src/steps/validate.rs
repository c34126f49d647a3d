//! Post-deployment steps: external access, health validation, summary

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::StepId;
use crate::channel::{exec_checked, HostHandle};
use crate::context::{ContextDelta, StepContext};
use crate::errors::OrchestratorError;
use crate::steps::{ProgressFn, StepExecutor};

/// Opens the application port in whichever firewall the host runs
pub struct ExternalAccessConfig;

#[async_trait]
impl StepExecutor for ExternalAccessConfig {
    async fn execute(
        &self,
        _step: StepId,
        ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        let port = ctx
            .get(StepId::AppDeployment, "http_port")
            .ok()
            .and_then(Value::as_u64)
            .unwrap_or(8080);

        on_progress(20, "Detecting firewall...");
        let probe = host
            .exec("command -v ufw firewall-cmd 2>/dev/null || true")
            .await?;

        let mut delta = Map::new();
        if probe.stdout.contains("ufw") {
            on_progress(60, "Opening port via ufw...");
            exec_checked(host, &format!("ufw allow {port}/tcp || true")).await?;
            delta.insert("firewall".to_string(), json!("ufw"));
        } else if probe.stdout.contains("firewall-cmd") {
            on_progress(60, "Opening port via firewalld...");
            exec_checked(
                host,
                &format!("firewall-cmd --permanent --add-port={port}/tcp && firewall-cmd --reload"),
            )
            .await?;
            delta.insert("firewall".to_string(), json!("firewalld"));
        } else {
            info!("No managed firewall detected, assuming port {} reachable", port);
            delta.insert("firewall".to_string(), json!("none"));
        }

        delta.insert("exposed_port".to_string(), json!(port));
        on_progress(100, "External access configured");
        Ok(delta)
    }
}

/// Polls the deployed container until it reports healthy
pub struct ServiceValidation {
    retries: u32,
    retry_delay: Duration,
}

impl ServiceValidation {
    pub fn new(retries: u32, retry_delay: Duration) -> Self {
        Self { retries, retry_delay }
    }

    fn is_up(inspect_output: &str) -> bool {
        matches!(inspect_output.trim(), "running" | "healthy")
    }
}

#[async_trait]
impl StepExecutor for ServiceValidation {
    async fn execute(
        &self,
        _step: StepId,
        ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        let app_name = match ctx.get_str(StepId::AppDeployment, "app_name") {
            Ok(name) => name.to_string(),
            Err(e) => {
                warn!("{}; validating default container name", e);
                "app".to_string()
            }
        };

        let inspect = format!(
            "docker inspect --format '{{{{.State.Health.Status}}}}' {app_name} 2>/dev/null \
             || docker inspect --format '{{{{.State.Status}}}}' {app_name}"
        );

        for attempt in 1..=self.retries {
            let percent = (attempt * 100 / (self.retries + 1)).min(95) as u8;
            on_progress(
                percent,
                &format!("Health check attempt {attempt}/{}", self.retries),
            );

            let output = host.exec(&inspect).await?;
            if output.success() && Self::is_up(&output.stdout) {
                info!("Container '{}' is healthy after {} attempt(s)", app_name, attempt);
                let mut delta = Map::new();
                delta.insert("healthy".to_string(), json!(true));
                delta.insert("attempts".to_string(), json!(attempt));
                on_progress(100, "Service is healthy");
                return Ok(delta);
            }

            // No sleep after the last attempt; fail immediately
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(OrchestratorError::ValidationError(format!(
            "Container '{app_name}' did not become healthy after {} attempts",
            self.retries
        )))
    }
}

/// Assembles the final access summary from upstream step results
pub struct DeploymentSummary;

#[async_trait]
impl StepExecutor for DeploymentSummary {
    async fn execute(
        &self,
        _step: StepId,
        ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        on_progress(30, "Collecting deployment summary...");

        let port = ctx
            .get(StepId::AppDeployment, "http_port")
            .ok()
            .and_then(Value::as_u64)
            .unwrap_or(8080);
        let password = ctx
            .str_or(StepId::AppDeployment, "admin_password", "<unchanged>")
            .to_string();

        let mut delta = Map::new();
        delta.insert(
            "access_url".to_string(),
            json!(format!("http://{}:{}", host.target(), port)),
        );
        delta.insert("admin_password".to_string(), json!(password));
        delta.insert(
            "docker_version".to_string(),
            json!(ctx.str_or(StepId::DockerInstallation, "docker_version", "unknown")),
        );

        on_progress(100, "Deployment complete");
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{CommandChannel, CommandOutput};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_is_up_accepts_running_and_healthy() {
        assert!(ServiceValidation::is_up("running\n"));
        assert!(ServiceValidation::is_up("healthy"));
        assert!(!ServiceValidation::is_up("restarting"));
        assert!(!ServiceValidation::is_up(""));
    }

    /// Channel whose container never leaves the restarting state
    struct NeverHealthyHost {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CommandChannel for NeverHealthyHost {
        async fn exec(&self, _command: &str) -> Result<CommandOutput, OrchestratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput {
                exit_code: 0,
                stdout: "restarting".to_string(),
                stderr: String::new(),
            })
        }

        fn target(&self) -> String {
            "test-host".to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_fails_without_sleeping_after_last_attempt() {
        let checker = Arc::new(NeverHealthyHost {
            calls: AtomicU32::new(0),
        });
        let host: HostHandle = checker.clone();
        let validator = ServiceValidation::new(3, Duration::from_secs(1));
        let on_progress = |_: u8, _: &str| {};
        let started = tokio::time::Instant::now();

        let err = validator
            .execute(
                StepId::ServiceValidation,
                &StepContext::new(),
                &Map::new(),
                &host,
                &on_progress,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::ValidationError(_)));
        assert_eq!(checker.calls.load(Ordering::SeqCst), 3);
        // Two sleeps between three attempts, none trailing the last one
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
