/// Binary artifact definitions for Kubernetes provisioning
///
/// One `BinaryArtifact` exists per (binary, architecture) pair. The resolver fills in
/// `url`, `path` and `fetch`; nothing else mutates an artifact after construction.
use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Kubernetes version used when the configuration does not name one
pub const DEFAULT_KUBE_VERSION: &str = "v1.19.8";

/// CNI plugin bundle version (fixed, independent of the Kubernetes version)
pub const DEFAULT_CNI_VERSION: &str = "v0.8.6";

/// Helm version (fixed, independent of the Kubernetes version)
pub const DEFAULT_HELM_VERSION: &str = "v3.2.1";

/// Helm 2 release needed by KubeSphere v2.1.1
pub const LEGACY_HELM_VERSION: &str = "v2.16.9";

/// Download cache prefix under the work directory
pub const DEFAULT_PRE_DIR: &str = "kubekey";

/// Host CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" => Ok(Arch::Amd64),
            "arm64" => Ok(Arch::Arm64),
            other => Err(ProvisionError::UnsupportedArchitecture(other.to_string())),
        }
    }
}

/// Logical binary name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
    /// Control-plane init tool
    Kubeadm,
    /// Node agent
    Kubelet,
    /// Control client
    Kubectl,
    /// Container network plugin bundle
    KubeCni,
    /// Package manager tool
    Helm,
    /// Legacy package manager tool
    Helm2,
}

impl BinaryKind {
    /// Name used in the checksum table and in log output
    pub fn name(&self) -> &'static str {
        match self {
            BinaryKind::Kubeadm => "kubeadm",
            BinaryKind::Kubelet => "kubelet",
            BinaryKind::Kubectl => "kubectl",
            BinaryKind::KubeCni => "kubecni",
            BinaryKind::Helm => "helm",
            BinaryKind::Helm2 => "helm2",
        }
    }
}

impl fmt::Display for BinaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the bytes behind `url` become the file at `path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// The response body is the file
    Direct,
    /// The response body is a gzipped tarball; extract the named member
    TarGzMember(String),
}

#[derive(Debug, Clone)]
pub struct BinaryArtifact {
    pub kind: BinaryKind,
    pub version: String,
    pub arch: Arch,
    pub path: PathBuf,
    pub url: String,
    pub fetch: FetchMode,
    /// Digest file published next to the upstream release, if there is one
    pub checksum_url: Option<String>,
    /// Expected digest of the downloaded archive for `TarGzMember` fetches
    pub archive_sha256: Option<String>,
}

impl BinaryArtifact {
    pub fn new(kind: BinaryKind, version: impl Into<String>, arch: Arch) -> Self {
        Self {
            kind,
            version: version.into(),
            arch,
            path: PathBuf::new(),
            url: String::new(),
            fetch: FetchMode::Direct,
            checksum_url: None,
            archive_sha256: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Shell equivalent of the fetch, reported to operators when a download fails
    pub fn download_command(&self) -> String {
        match &self.fetch {
            FetchMode::Direct => format!("curl -L -o {} {}", self.path.display(), self.url),
            FetchMode::TarGzMember(member) => format!(
                "curl -L {} | tar -zxO {} > {}",
                self.url,
                member,
                self.path.display()
            ),
        }
    }
}
