/// Remote command execution on cluster nodes
///
/// `NodeExecutor` is the seam between the bootstrap protocol and whatever transport
/// reaches a node. `SshExecutor` delegates to the system OpenSSH client.
use crate::error::ExecError;
use crate::node::HostNode;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Wrap a command so it runs as root through a login-preserving shell
pub fn sudo(command: &str) -> String {
    format!("sudo -E /bin/sh -c \"{}\"", command)
}

/// Output of one command on one node
///
/// `output` is stdout only; callers parse it. stderr is kept for failure reports.
#[derive(Debug, Clone, Default)]
pub struct RemoteCommandResult {
    pub output: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl RemoteCommandResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// stdout followed by stderr, for error messages
    pub fn combined(&self) -> String {
        let stdout = self.output.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Executor bound to a single node
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    fn host(&self) -> &HostNode;

    /// Run a command once. Transport problems are errors; a non-zero exit is not.
    async fn run(&self, command: &str) -> Result<RemoteCommandResult, ExecError>;

    /// Run a command, retrying the whole command up to `retries` more times.
    ///
    /// Returns the trimmed output of the first successful attempt. With
    /// `tolerate_failure` a final failure is still returned, but logged as a warning
    /// so best-effort callers can drop it.
    async fn execute(
        &self,
        command: &str,
        retries: u32,
        tolerate_failure: bool,
    ) -> Result<String, ExecError> {
        let mut attempt = 0;
        loop {
            let error = match self.run(command).await {
                Ok(result) if result.success() => return Ok(result.output.trim().to_string()),
                Ok(result) => ExecError::NonZeroExit {
                    status: result.exit_status,
                    output: result.combined(),
                },
                Err(e) => e,
            };

            if attempt >= retries {
                if tolerate_failure {
                    tracing::warn!(host = %self.host().name, "[Executor] {}: {}", command, error);
                } else {
                    tracing::error!(host = %self.host().name, "[Executor] {}: {}", command, error);
                }
                return Err(error);
            }

            attempt += 1;
            tracing::debug!(
                host = %self.host().name,
                attempt,
                retries,
                "[Executor] Retrying after: {}",
                error
            );
        }
    }
}

/// Runs commands through the `ssh` binary; authentication and host keys are left to
/// the operator's OpenSSH setup.
pub struct SshExecutor {
    program: PathBuf,
    host: HostNode,
    user: String,
    port: u16,
    private_key: Option<PathBuf>,
    timeout: Duration,
}

impl SshExecutor {
    pub fn new(
        host: HostNode,
        user: String,
        port: u16,
        private_key: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: PathBuf::from("ssh"),
            host,
            user,
            port,
            private_key,
            timeout,
        }
    }

    /// Use another OpenSSH-compatible client binary
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, remote: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-p")
            .arg(self.port.to_string());
        if let Some(key) = &self.private_key {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", self.user, self.host.address))
            .arg("--")
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl NodeExecutor for SshExecutor {
    fn host(&self) -> &HostNode {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<RemoteCommandResult, ExecError> {
        tracing::debug!(host = %self.host.name, "[SshExecutor] {}", command);

        let output = tokio::time::timeout(self.timeout, self.command(command).output())
            .await
            .map_err(|_| ExecError::Timeout(self.timeout))?
            .map_err(|e| ExecError::Transport(format!("failed to spawn ssh: {}", e)))?;

        // ssh reserves 255 for its own failures
        let exit_status = output.status.code().unwrap_or(-1);
        if exit_status == 255 {
            return Err(ExecError::Transport(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.trim().is_empty() {
            tracing::debug!(host = %self.host.name, "[SshExecutor] stderr: {}", stderr.trim());
        }

        Ok(RemoteCommandResult {
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            exit_status,
        })
    }
}
