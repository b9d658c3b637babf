//! Kubernetes cluster bootstrap over kubeadm.
//!
//! Drives the first control-plane node through detection, initialization and
//! join-artifact issuance, then joins every other node. Remote commands go through
//! the [`NodeExecutor`] seam; binaries are provisioned by the `binaries` crate.

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod embedded_templates;
pub mod error;
pub mod executor;
pub mod installer;
pub mod join_artifacts;
pub mod kubeadm_config;
pub mod kubeconfig;
pub mod node;
pub mod retry;
pub mod status;
pub mod template_renderer;

pub use bootstrap::{
    BootstrapPhase, BootstrapReport, ClusterBootstrap, DnsProvisioner, NodeJoinOutcome,
};
pub use config::{HostConfig, InstallerConfig, KubernetesConfig, RoleGroups, SshConfig};
pub use dispatch::{NodeDispatcher, NodeFilter};
pub use error::{BootstrapError, ExecError, Result};
pub use executor::{sudo, NodeExecutor, RemoteCommandResult, SshExecutor};
pub use installer::Installer;
pub use node::{HostNode, Inventory};
pub use retry::with_retry;
pub use status::{ClusterStatus, ClusterStatusStore, JoinArtifacts};
pub use template_renderer::TemplateRenderer;
