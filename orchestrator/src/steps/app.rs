//! Application deployment step
//!
//! Renders a compose file from the session's request config, uploads it to
//! the target and brings the stack up. Deployments against the same target
//! are serialized through `KeyedLocks`; the lock may be held for the full
//! duration of the remote operation.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::catalog::StepId;
use crate::channel::{exec_checked, HostHandle};
use crate::context::{ContextDelta, StepContext};
use crate::errors::OrchestratorError;
use crate::locks::KeyedLocks;
use crate::steps::{ProgressFn, StepExecutor};

const DEFAULT_APP_NAME: &str = "app";
const DEFAULT_HTTP_PORT: u64 = 8080;

/// Deploys the application stack with docker compose
pub struct AppDeploy {
    locks: Arc<KeyedLocks>,
}

impl AppDeploy {
    pub fn new(locks: Arc<KeyedLocks>) -> Self {
        Self { locks }
    }

    fn config_str<'a>(config: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
        config.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    fn config_u64(config: &Map<String, Value>, key: &str, default: u64) -> u64 {
        config.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    /// Generate an admin credential unless the request supplied one
    fn admin_password(config: &Map<String, Value>) -> (String, bool) {
        match config.get("admin_password").and_then(Value::as_str) {
            Some(p) if !p.is_empty() => (p.to_string(), false),
            _ => (Uuid::new_v4().simple().to_string(), true),
        }
    }

    fn render_compose(
        app_name: &str,
        image: &str,
        http_port: u64,
        admin_password: &str,
    ) -> String {
        format!(
            r#"services:
  {app_name}:
    image: {image}
    container_name: {app_name}
    restart: unless-stopped
    ports:
      - "{http_port}:8080"
    environment:
      - ADMIN_PASSWORD={admin_password}
    volumes:
      - {app_name}-data:/data

volumes:
  {app_name}-data: {{}}
"#
        )
    }
}

#[async_trait]
impl StepExecutor for AppDeploy {
    async fn execute(
        &self,
        _step: StepId,
        _ctx: &StepContext,
        config: &Map<String, Value>,
        host: &HostHandle,
        on_progress: ProgressFn<'_>,
    ) -> Result<ContextDelta, OrchestratorError> {
        let app_name = Self::config_str(config, "app_name", DEFAULT_APP_NAME).to_string();
        let image = Self::config_str(config, "image", "").to_string();
        if image.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "request config is missing 'image'".to_string(),
            ));
        }
        let http_port = Self::config_u64(config, "http_port", DEFAULT_HTTP_PORT);
        let (admin_password, generated) = Self::admin_password(config);

        // One mutating deployment per target at a time
        let lock_key = format!("{}/{}", host.target(), app_name);
        on_progress(5, "Waiting for deployment lock...");
        let _guard = self.locks.acquire(&lock_key).await;

        let deploy_dir = format!("/opt/{app_name}");
        on_progress(15, "Preparing deployment directory...");
        exec_checked(host, &format!("mkdir -p {deploy_dir}")).await?;

        on_progress(30, "Uploading compose file...");
        let compose = Self::render_compose(&app_name, &image, http_port, &admin_password);
        exec_checked(
            host,
            &format!("cat > {deploy_dir}/docker-compose.yml << 'EOF'\n{compose}\nEOF"),
        )
        .await?;

        on_progress(45, "Pulling application image...");
        exec_checked(
            host,
            &format!("cd {deploy_dir} && (docker compose pull || docker-compose pull)"),
        )
        .await?;

        on_progress(75, "Starting application stack...");
        exec_checked(
            host,
            &format!("cd {deploy_dir} && (docker compose up -d || docker-compose up -d)"),
        )
        .await?;

        info!("Application stack '{}' started on {}", app_name, host.target());

        let mut delta = Map::new();
        delta.insert("app_name".to_string(), json!(app_name));
        delta.insert("deploy_dir".to_string(), json!(deploy_dir));
        delta.insert("http_port".to_string(), json!(http_port));
        delta.insert("admin_password".to_string(), json!(admin_password));
        delta.insert("password_generated".to_string(), json!(generated));
        on_progress(100, "Application deployed");
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_compose_substitutes_config() {
        let text = AppDeploy::render_compose("shop", "example/shop:1.2", 9000, "secret");

        assert!(text.contains("image: example/shop:1.2"));
        assert!(text.contains("\"9000:8080\""));
        assert!(text.contains("ADMIN_PASSWORD=secret"));
        assert!(text.contains("shop-data:"));
    }

    #[test]
    fn test_admin_password_generated_when_absent() {
        let (password, generated) = AppDeploy::admin_password(&Map::new());
        assert!(generated);
        assert_eq!(password.len(), 32);
    }

    #[test]
    fn test_admin_password_from_config() {
        let mut config = Map::new();
        config.insert("admin_password".to_string(), json!("hunter2"));

        let (password, generated) = AppDeploy::admin_password(&config);
        assert!(!generated);
        assert_eq!(password, "hunter2");
    }
}
