//! Error types for the cluster bootstrap
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Failure of a single command on a single node
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command exited with status {status}: {output}")]
    NonZeroExit { status: i32, output: String },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{context} (node {host}): {source}")]
    RemoteCommand {
        context: String,
        host: String,
        #[source]
        source: ExecError,
    },

    #[error("Failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("Failed to generate kubeadm config: {0}")]
    ConfigGeneration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load kube binaries: {0}")]
    Provision(#[from] binaries::ProvisionError),

    #[error("Task failed on node {host}: {source}")]
    Node {
        host: String,
        #[source]
        source: Box<BootstrapError>,
    },

    #[error("Bootstrap error: {0}")]
    Protocol(String),
}

impl BootstrapError {
    pub fn remote(context: impl Into<String>, host: impl Into<String>, source: ExecError) -> Self {
        BootstrapError::RemoteCommand {
            context: context.into(),
            host: host.into(),
            source,
        }
    }

    pub fn filesystem(context: impl Into<String>, source: std::io::Error) -> Self {
        BootstrapError::Filesystem {
            context: context.into(),
            source,
        }
    }
}
