//! Canonical provisioning step catalog
//!
//! Every deployment session walks the same fixed, ordered step sequence.
//! Executors for individual steps live in `steps/`; this module only owns
//! the identity and ordering of the catalog.

use serde::{Deserialize, Serialize};

/// Identifier of one canonical provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    GeolocationDetection,
    SystemDetection,
    PackageManagerConfig,
    DockerInstallation,
    DockerMirrorConfig,
    AppDeployment,
    ExternalAccessConfig,
    ServiceValidation,
    DeploymentComplete,
}

impl StepId {
    /// All steps in canonical execution order
    pub const ALL: [StepId; 9] = [
        StepId::GeolocationDetection,
        StepId::SystemDetection,
        StepId::PackageManagerConfig,
        StepId::DockerInstallation,
        StepId::DockerMirrorConfig,
        StepId::AppDeployment,
        StepId::ExternalAccessConfig,
        StepId::ServiceValidation,
        StepId::DeploymentComplete,
    ];

    /// Stable wire identifier, e.g. `docker_installation`
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::GeolocationDetection => "geolocation_detection",
            StepId::SystemDetection => "system_detection",
            StepId::PackageManagerConfig => "package_manager_config",
            StepId::DockerInstallation => "docker_installation",
            StepId::DockerMirrorConfig => "docker_mirror_config",
            StepId::AppDeployment => "app_deployment",
            StepId::ExternalAccessConfig => "external_access_config",
            StepId::ServiceValidation => "service_validation",
            StepId::DeploymentComplete => "deployment_complete",
        }
    }

    /// Human-readable name shown to the operator
    pub fn display_name(&self) -> &'static str {
        match self {
            StepId::GeolocationDetection => "Network region detection",
            StepId::SystemDetection => "System environment detection",
            StepId::PackageManagerConfig => "Package manager mirror configuration",
            StepId::DockerInstallation => "Docker engine installation",
            StepId::DockerMirrorConfig => "Docker registry mirror configuration",
            StepId::AppDeployment => "Application deployment",
            StepId::ExternalAccessConfig => "External access configuration",
            StepId::ServiceValidation => "Service validation",
            StepId::DeploymentComplete => "Deployment summary",
        }
    }

    /// Position of this step in the canonical order
    pub fn index(&self) -> usize {
        StepId::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    /// Parse a wire identifier back into a step id
    pub fn parse(s: &str) -> Option<StepId> {
        StepId::ALL.iter().copied().find(|id| id.as_str() == s)
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_is_stable() {
        assert_eq!(StepId::ALL.len(), 9);
        assert_eq!(StepId::ALL[0], StepId::GeolocationDetection);
        assert_eq!(StepId::ALL[3], StepId::DockerInstallation);
        assert_eq!(StepId::ALL[8], StepId::DeploymentComplete);
    }

    #[test]
    fn test_wire_id_round_trip() {
        for id in StepId::ALL {
            assert_eq!(StepId::parse(id.as_str()), Some(id));
        }
        assert_eq!(StepId::parse("unknown_step"), None);
    }

    #[test]
    fn test_index_matches_order() {
        for (i, id) in StepId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }
}
