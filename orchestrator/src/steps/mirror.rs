//! Mirror configuration steps
//!
//! Hosts on restricted networks get package and registry mirrors; all
//! other hosts keep official endpoints. Both steps back up the files they
//! touch before rewriting them.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::catalog::StepId;
use crate::channel::{exec_checked, HostHandle};
use crate::context::{ContextDelta, StepContext};
use crate::errors::OrchestratorError;
use crate::steps::{ProgressFn, StepExecutor};

const APT_MIRROR: &str = "mirrors.aliyun.com";
const YUM_MIRROR: &str = "mirrors.aliyun.com";
const DOCKER_MIRRORS: [&str; 2] = [
    "https://docker.m.daocloud.io",
    "https://dockerproxy.com",
];

/// Points the system package manager at a region-appropriate mirror
pub struct PackageManagerConfig;

#[async_trait]
impl StepExecutor for PackageManagerConfig {
    async fn execute(
        &self,
        _step: StepId,
        ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        // Missing geolocation output means the probe was skipped or failed;
        // keep official endpoints in that case.
        let restricted = match ctx.get(StepId::GeolocationDetection, "restricted_network") {
            Ok(v) => v.as_bool().unwrap_or(false),
            Err(e) => {
                warn!("{}; keeping official package endpoints", e);
                false
            }
        };

        let mut delta = Map::new();
        if !restricted {
            info!("Host network is unrestricted, keeping official package endpoints");
            delta.insert("mirror_applied".to_string(), json!(false));
            on_progress(100, "Package manager left on official endpoints");
            return Ok(delta);
        }

        let pm = ctx.str_or(StepId::SystemDetection, "package_manager", "apt-get");
        on_progress(20, "Backing up package manager configuration...");

        match pm {
            "apt-get" => {
                exec_checked(
                    host,
                    "cp -n /etc/apt/sources.list /etc/apt/sources.list.helmsman.bak",
                )
                .await?;
                on_progress(50, "Rewriting apt sources...");
                exec_checked(
                    host,
                    &format!(
                        "sed -i -E 's#https?://[a-z0-9.-]*(archive|security)\\.ubuntu\\.com#https://{APT_MIRROR}#g' /etc/apt/sources.list && apt-get update -qq"
                    ),
                )
                .await?;
                delta.insert("mirror_host".to_string(), json!(APT_MIRROR));
            }
            "yum" | "dnf" => {
                exec_checked(
                    host,
                    "mkdir -p /etc/yum.repos.d/helmsman-backup && cp -n /etc/yum.repos.d/*.repo /etc/yum.repos.d/helmsman-backup/ 2>/dev/null || true",
                )
                .await?;
                on_progress(50, "Rewriting yum repo baseurls...");
                exec_checked(
                    host,
                    &format!(
                        "sed -i -E 's|^#?baseurl=https?://[a-z0-9.-]+|baseurl=https://{YUM_MIRROR}|g' /etc/yum.repos.d/*.repo && {pm} makecache -q"
                    ),
                )
                .await?;
                delta.insert("mirror_host".to_string(), json!(YUM_MIRROR));
            }
            other => {
                info!("No mirror template for package manager '{}', leaving as-is", other);
                delta.insert("mirror_applied".to_string(), json!(false));
                on_progress(100, "Package manager left unchanged");
                return Ok(delta);
            }
        }

        delta.insert("mirror_applied".to_string(), json!(true));
        on_progress(100, "Package manager mirror configured");
        Ok(delta)
    }
}

/// Writes registry mirrors into /etc/docker/daemon.json
pub struct DockerMirrorConfig;

impl DockerMirrorConfig {
    fn daemon_json(mirrors: &[&str]) -> String {
        let value = json!({ "registry-mirrors": mirrors });
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }
}

#[async_trait]
impl StepExecutor for DockerMirrorConfig {
    async fn execute(
        &self,
        _step: StepId,
        ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        let restricted = match ctx.get(StepId::GeolocationDetection, "restricted_network") {
            Ok(v) => v.as_bool().unwrap_or(false),
            Err(e) => {
                warn!("{}; keeping official registry endpoints", e);
                false
            }
        };

        let mut delta = Map::new();
        if !restricted {
            info!("Registry mirrors not needed for this host");
            delta.insert("registry_mirrors".to_string(), json!([]));
            on_progress(100, "Docker registry left on official endpoints");
            return Ok(delta);
        }

        on_progress(20, "Backing up docker daemon.json...");
        exec_checked(
            host,
            "mkdir -p /etc/docker && ([ -f /etc/docker/daemon.json ] && cp -n /etc/docker/daemon.json /etc/docker/daemon.json.helmsman.bak || true)",
        )
        .await?;

        on_progress(50, "Writing registry mirrors...");
        let payload = Self::daemon_json(&DOCKER_MIRRORS);
        exec_checked(
            host,
            &format!("cat > /etc/docker/daemon.json << 'EOF'\n{payload}\nEOF"),
        )
        .await?;

        on_progress(80, "Restarting docker daemon...");
        exec_checked(host, "systemctl restart docker || service docker restart").await?;

        delta.insert("registry_mirrors".to_string(), json!(DOCKER_MIRRORS));
        on_progress(100, "Docker registry mirrors configured");
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{CommandChannel, CommandOutput};
    use std::sync::Arc;

    /// Channel that fails every command; steps under test must not run any
    struct OfflineHost;

    #[async_trait]
    impl CommandChannel for OfflineHost {
        async fn exec(&self, command: &str) -> Result<CommandOutput, OrchestratorError> {
            Err(OrchestratorError::ChannelError(format!(
                "unexpected command: {command}"
            )))
        }

        fn target(&self) -> String {
            "offline".to_string()
        }
    }

    #[tokio::test]
    async fn test_missing_geolocation_keeps_official_registry() {
        let host: HostHandle = Arc::new(OfflineHost);
        let ctx = StepContext::new();
        let on_progress = |_: u8, _: &str| {};

        let delta = DockerMirrorConfig
            .execute(StepId::DockerMirrorConfig, &ctx, &Map::new(), &host, &on_progress)
            .await
            .unwrap();

        assert_eq!(delta["registry_mirrors"], json!([]));
    }

    #[test]
    fn test_daemon_json_shape() {
        let text = DockerMirrorConfig::daemon_json(&["https://mirror.example"]);
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            value["registry-mirrors"][0].as_str(),
            Some("https://mirror.example")
        );
    }
}
