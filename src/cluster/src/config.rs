/// Installer configuration
/// Loaded from kubeboot.toml
use crate::error::{BootstrapError, Result};
use binaries::DEFAULT_KUBE_VERSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file name searched for by `InstallerConfig::load`
pub const CONFIG_FILE_NAME: &str = "kubeboot.toml";

/// KubeSphere release that still ships helm 2 charts
pub const LEGACY_HELM_KUBESPHERE_VERSION: &str = "v2.1.1";

/// Installer configuration
/// Loaded from kubeboot.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Local directory holding the download cache, an optional custom
    /// kubeadm-config.yaml and the generated admin kubeconfig
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// Targeted KubeSphere release, if any
    #[serde(default)]
    pub kubesphere_version: Option<String>,

    /// Region hint; falls back to the KKZONE environment variable when unset
    #[serde(default)]
    pub region: Option<String>,

    /// Extra checksum table merged over the built-in one
    #[serde(default)]
    pub checksum_file: Option<PathBuf>,

    /// Use the digest published next to an upstream artifact when no table has it
    #[serde(default = "default_published_checksums")]
    pub published_checksums: bool,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Number of nodes driven concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    #[serde(default)]
    pub role_groups: RoleGroups,
}

impl InstallerConfig {
    /// Load configuration from an explicit path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::filesystem(format!("Failed to read config file {:?}", path), e)
        })?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| BootstrapError::Config(format!("{:?}: {}", path, e)))?;

        tracing::info!("Loaded installer config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| BootstrapError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Search the current directory, then `work_dir`, for kubeboot.toml
    pub fn load(work_dir: &Path) -> Result<Self> {
        let config_paths = [PathBuf::from(CONFIG_FILE_NAME), work_dir.join(CONFIG_FILE_NAME)];

        for path in config_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(BootstrapError::Config(format!(
            "No {} found in the current directory or {}",
            CONFIG_FILE_NAME,
            work_dir.display()
        )))
    }

    /// Kubernetes version to install, defaulting when unset
    pub fn kube_version(&self) -> &str {
        self.kubernetes
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_KUBE_VERSION)
    }

    /// Whether helm2 must be provisioned alongside helm
    pub fn needs_legacy_helm(&self) -> bool {
        self.kubesphere_version.as_deref() == Some(LEGACY_HELM_KUBESPHERE_VERSION)
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_published_checksums() -> bool {
    true
}

fn default_parallelism() -> usize {
    10
}

/// Cluster-wide Kubernetes settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    #[serde(default = "default_dns_domain")]
    pub dns_domain: String,

    #[serde(default = "default_pod_cidr")]
    pub pod_cidr: String,

    #[serde(default = "default_service_cidr")]
    pub service_cidr: String,

    #[serde(default = "default_image_repository")]
    pub image_repository: String,
}

fn default_cluster_name() -> String {
    "cluster.local".to_string()
}

fn default_dns_domain() -> String {
    "cluster.local".to_string()
}

fn default_pod_cidr() -> String {
    "10.233.64.0/18".to_string()
}

fn default_service_cidr() -> String {
    "10.233.0.0/18".to_string()
}

fn default_image_repository() -> String {
    "k8s.gcr.io".to_string()
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            version: None,
            cluster_name: default_cluster_name(),
            dns_domain: default_dns_domain(),
            pod_cidr: default_pod_cidr(),
            service_cidr: default_service_cidr(),
            image_repository: default_image_repository(),
        }
    }
}

/// Settings for the OpenSSH-backed executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Per-attempt command timeout; a timed out attempt counts as failed
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_command_timeout_secs() -> u64 {
    600
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            private_key: None,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// One machine in the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,

    /// Address used to reach the host over SSH
    pub address: String,

    /// Cluster-internal address; defaults to `address`
    #[serde(default)]
    pub internal_address: Option<String>,

    #[serde(default = "default_arch")]
    pub arch: String,

    /// Per-host SSH user override
    #[serde(default)]
    pub user: Option<String>,

    /// Per-host SSH port override
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_arch() -> String {
    "amd64".to_string()
}

/// Host names assigned to each role, in role order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleGroups {
    #[serde(default)]
    pub etcd: Vec<String>,

    #[serde(default)]
    pub master: Vec<String>,

    #[serde(default)]
    pub worker: Vec<String>,
}
