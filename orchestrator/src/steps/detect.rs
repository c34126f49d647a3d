//! Environment detection steps
//!
//! Both steps only read from the host: a geolocation probe to decide
//! whether mirror endpoints are needed, and OS/arch/package-manager
//! detection from `/etc/os-release` and `uname`.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::catalog::StepId;
use crate::channel::HostHandle;
use crate::context::{ContextDelta, StepContext};
use crate::errors::OrchestratorError;
use crate::steps::{ProgressFn, StepExecutor};

/// Detects the host's network region via a public geo endpoint
pub struct GeolocationDetect;

#[async_trait]
impl StepExecutor for GeolocationDetect {
    async fn execute(
        &self,
        _step: StepId,
        _ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        on_progress(10, "Probing network region...");

        let output = host
            .exec("curl -fsSL --max-time 8 https://ipinfo.io/country || true")
            .await?;
        let country = output.stdout.trim().to_uppercase();

        let mut delta = Map::new();
        if country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()) {
            let restricted = country == "CN";
            info!("Detected host region: {} (restricted_network={})", country, restricted);
            delta.insert("region".to_string(), json!(country));
            delta.insert("restricted_network".to_string(), json!(restricted));
        } else {
            // Offline hosts are common; downstream steps fall back to
            // official endpoints when the region is unknown.
            warn!("Region probe returned no usable answer, leaving region unset");
        }

        on_progress(100, "Region detection finished");
        Ok(delta)
    }
}

/// Detects OS distribution, version, architecture and package manager
pub struct SystemDetect;

impl SystemDetect {
    fn parse_os_release(text: &str) -> (Option<String>, Option<String>) {
        let id_re = Regex::new(r#"(?m)^ID="?([A-Za-z0-9._-]+)"?"#).ok();
        let ver_re = Regex::new(r#"(?m)^VERSION_ID="?([A-Za-z0-9._-]+)"?"#).ok();

        let os_id = id_re
            .and_then(|re| re.captures(text).map(|c| c[1].to_lowercase()));
        let version = ver_re
            .and_then(|re| re.captures(text).map(|c| c[1].to_string()));

        (os_id, version)
    }

    fn package_manager_for(os_id: &str, probe: &str) -> String {
        // Prefer what the host actually has on PATH over distro heuristics
        for pm in ["apt-get", "dnf", "yum", "zypper", "apk"] {
            if probe.lines().any(|l| l.trim().ends_with(pm)) {
                return pm.to_string();
            }
        }
        match os_id {
            "ubuntu" | "debian" => "apt-get".to_string(),
            "fedora" => "dnf".to_string(),
            "centos" | "rhel" | "rocky" | "almalinux" => "yum".to_string(),
            "alpine" => "apk".to_string(),
            _ => "apt-get".to_string(),
        }
    }
}

#[async_trait]
impl StepExecutor for SystemDetect {
    async fn execute(
        &self,
        _step: StepId,
        _ctx: &StepContext,
        _config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        on_progress(10, "Reading /etc/os-release...");
        let os_release = host.exec("cat /etc/os-release 2>/dev/null || true").await?;
        let (os_id, os_version) = Self::parse_os_release(&os_release.stdout);

        on_progress(40, "Detecting architecture...");
        let uname = host.exec("uname -m").await?;
        let arch = uname.stdout.trim().to_string();

        on_progress(70, "Locating package manager...");
        let probe = host
            .exec("command -v apt-get dnf yum zypper apk 2>/dev/null || true")
            .await?;
        let os_id = os_id.unwrap_or_else(|| "unknown".to_string());
        let package_manager = Self::package_manager_for(&os_id, &probe.stdout);

        debug!(
            "System detection: os={} version={:?} arch={} pm={}",
            os_id, os_version, arch, package_manager
        );

        if arch.is_empty() {
            return Err(OrchestratorError::ValidationError(
                "Could not determine host architecture".to_string(),
            ));
        }

        let mut delta = Map::new();
        delta.insert("os_id".to_string(), json!(os_id));
        if let Some(version) = os_version {
            delta.insert("os_version".to_string(), json!(version));
        }
        delta.insert("arch".to_string(), json!(arch));
        delta.insert("package_manager".to_string(), json!(package_manager));

        on_progress(100, "System detection finished");
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release_quoted_and_bare() {
        let text = "NAME=\"Ubuntu\"\nID=ubuntu\nVERSION_ID=\"22.04\"\n";
        let (id, version) = SystemDetect::parse_os_release(text);

        assert_eq!(id.as_deref(), Some("ubuntu"));
        assert_eq!(version.as_deref(), Some("22.04"));
    }

    #[test]
    fn test_parse_os_release_missing_fields() {
        let (id, version) = SystemDetect::parse_os_release("PRETTY_NAME=\"mystery\"\n");
        assert!(id.is_none());
        assert!(version.is_none());
    }

    #[test]
    fn test_package_manager_prefers_probe() {
        let pm = SystemDetect::package_manager_for("ubuntu", "/usr/bin/dnf\n");
        assert_eq!(pm, "dnf");
    }

    #[test]
    fn test_package_manager_falls_back_to_distro() {
        assert_eq!(SystemDetect::package_manager_for("centos", ""), "yum");
        assert_eq!(SystemDetect::package_manager_for("weird-os", ""), "apt-get");
    }
}
