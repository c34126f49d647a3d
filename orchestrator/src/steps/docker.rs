//! Docker engine installation step

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::catalog::StepId;
use crate::channel::{exec_checked, HostHandle};
use crate::context::{ContextDelta, StepContext};
use crate::errors::OrchestratorError;
use crate::steps::{ProgressFn, StepExecutor};

/// Installs the Docker engine when absent and ensures the daemon runs
pub struct DockerInstall;

impl DockerInstall {
    /// Extract "26.1.4" from `docker --version` output
    fn parse_version(output: &str) -> Option<String> {
        let re = Regex::new(r"Docker version (\d+\.\d+\.\d+)").ok()?;
        re.captures(output).map(|c| c[1].to_string())
    }

    fn install_command(package_manager: &str) -> String {
        match package_manager {
            "apt-get" => {
                "apt-get update -qq && apt-get install -y -qq docker.io docker-compose-v2".to_string()
            }
            "dnf" => "dnf install -y docker docker-compose".to_string(),
            "yum" => "yum install -y docker docker-compose".to_string(),
            "apk" => "apk add --no-cache docker docker-cli-compose".to_string(),
            other => format!("{other} install -y docker"),
        }
    }
}

#[async_trait]
impl StepExecutor for DockerInstall {
    async fn execute(
        &self,
        _step: StepId,
        ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        on_progress(5, "Checking for existing Docker engine...");
        let probe = host.exec("docker --version 2>/dev/null || true").await?;

        let mut delta = Map::new();
        if let Some(version) = Self::parse_version(&probe.stdout) {
            info!("Docker {} already installed, skipping installation", version);
            delta.insert("docker_version".to_string(), json!(version));
            delta.insert("freshly_installed".to_string(), json!(false));
            on_progress(100, "Docker engine already present");
            return Ok(delta);
        }

        let pm = match ctx.get_str(StepId::SystemDetection, "package_manager") {
            Ok(pm) => pm.to_string(),
            Err(e) => {
                warn!("{}; assuming apt-get", e);
                "apt-get".to_string()
            }
        };

        on_progress(20, "Installing Docker engine...");
        exec_checked(host, &Self::install_command(&pm)).await?;

        on_progress(70, "Enabling docker daemon...");
        exec_checked(
            host,
            "systemctl enable --now docker 2>/dev/null || service docker start",
        )
        .await?;

        on_progress(90, "Verifying installation...");
        let verify = exec_checked(host, "docker --version").await?;
        let version = Self::parse_version(&verify.stdout).ok_or_else(|| {
            OrchestratorError::ValidationError(format!(
                "Docker installed but version not parseable: {}",
                verify.stdout.trim()
            ))
        })?;

        info!("Docker {} installed", version);
        delta.insert("docker_version".to_string(), json!(version));
        delta.insert("freshly_installed".to_string(), json!(true));
        on_progress(100, "Docker engine ready");
        Ok(delta)
    }
}
