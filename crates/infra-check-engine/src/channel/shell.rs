//! Remote shell channel
//!
//! Commands run through the system `ssh` client in batch mode, so no password
//! prompt can ever block a worker.

use super::{interpret_output, render_template, Channel, ChannelError, ChannelOutput, Subject};
use crate::contracts::*;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Runs a command on a target and returns its stdout
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, target: &Target, command: &str) -> Result<String, ChannelError>;
}

/// SSH connection settings, resolved before the run
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Login user; the ssh client default when unset
    pub user: Option<String>,

    /// Private key file
    pub private_key_path: Option<String>,

    pub connect_timeout: Duration,
    pub command_timeout: Duration,

    /// ssh binary to invoke
    pub ssh_binary: String,

    /// Serialize invocations per host, for executors that share one session
    /// per host. `SshExecutor` spawns a client per command and needs none.
    pub serialize_per_host: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            user: None,
            private_key_path: None,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            ssh_binary: "ssh".to_string(),
            serialize_per_host: false,
        }
    }
}

/// `RemoteExecutor` over the OpenSSH client
#[derive(Debug, Clone)]
pub struct SshExecutor {
    config: ShellConfig,
}

impl SshExecutor {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the ssh binary
    pub fn ssh_args(&self, target: &Target, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout.as_secs().max(1)),
            "-p".to_string(),
            target.ssh_port.to_string(),
        ];
        if let Some(key) = &self.config.private_key_path {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args.push(match &self.config.user {
            Some(user) => format!("{}@{}", user, target.address),
            None => target.address.clone(),
        });
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, target: &Target, command: &str) -> Result<String, ChannelError> {
        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.args(self.ssh_args(target, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::trace!(host = %target.hostname, command, "ssh exec");

        let output = tokio::time::timeout(self.config.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                ChannelError::Timeout(format!(
                    "command on {} exceeded {}s",
                    target.hostname,
                    self.config.command_timeout.as_secs()
                ))
            })?
            .map_err(|e| ChannelError::Connection(format!("failed to spawn ssh: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(stdout);
        }

        if output.status.code() == Some(255) || stderr.contains("Permission denied") {
            return Err(ChannelError::Connection(format!(
                "{}: {}",
                target.address,
                stderr.trim()
            )));
        }

        Err(ChannelError::parse(
            format!(
                "command exited with status {}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string())
            ),
            format!("{}{}", stdout, stderr),
        ))
    }
}

/// Host-scoped commands
pub struct RemoteShellChannel {
    executor: Arc<dyn RemoteExecutor>,
    serialize_per_host: bool,
}

impl RemoteShellChannel {
    pub fn new(executor: Arc<dyn RemoteExecutor>, serialize_per_host: bool) -> Self {
        Self {
            executor,
            serialize_per_host,
        }
    }
}

#[async_trait]
impl Channel for RemoteShellChannel {
    fn name(&self) -> &str {
        "remote_shell"
    }

    fn session_key(&self, subject: &Subject, _check: &CheckDefinition) -> Option<String> {
        self.serialize_per_host.then(|| subject.session_key())
    }

    async fn fetch(
        &self,
        subject: &Subject,
        check: &CheckDefinition,
    ) -> Result<ChannelOutput, ChannelError> {
        let target = match subject {
            Subject::Host(target) | Subject::Service { target, .. } => target,
            Subject::Cluster(cluster) => {
                return Err(ChannelError::Unsupported(format!(
                    "remote shell check {} cannot target cluster {}",
                    check.id, cluster.name
                )))
            }
        };

        let command = render_template(&check.command, subject);
        let stdout = self.executor.execute(target, &command).await?;
        interpret_output(&stdout, check)
    }
}
