//! Remote command-execution channel
//!
//! The engine never talks to a transport directly; it holds an opaque
//! `HostHandle` and step executors run shell commands through it. The
//! concrete transport (SSH session, agent socket, ...) lives behind the
//! `CommandChannel` trait. `LocalChannel` runs commands on the local
//! machine and doubles as the provisioning path for `localhost` targets.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;

use crate::errors::OrchestratorError;

/// Captured result of one remote command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A persistent authenticated command channel to one target host
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Run one shell command to completion and capture its output
    async fn exec(&self, command: &str) -> Result<CommandOutput, OrchestratorError>;

    /// Short human-readable description of the target, for logs
    fn target(&self) -> String;
}

/// Shared handle to a session's command channel
pub type HostHandle = Arc<dyn CommandChannel>;

/// Run a command and fail unless it exits zero
pub async fn exec_checked(
    host: &HostHandle,
    command: &str,
) -> Result<CommandOutput, OrchestratorError> {
    let output = host.exec(command).await?;
    if !output.success() {
        return Err(OrchestratorError::CommandFailed {
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Command channel that executes on the local machine via `sh -c`
pub struct LocalChannel;

#[async_trait]
impl CommandChannel for LocalChannel {
    async fn exec(&self, command: &str) -> Result<CommandOutput, OrchestratorError> {
        debug!("Executing local command: {}", command);

        let output = Command::new("sh")
            .args(["-c", command])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OrchestratorError::ChannelError(format!("Failed to spawn shell: {e}")))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn target(&self) -> String {
        "localhost".to_string()
    }
}
