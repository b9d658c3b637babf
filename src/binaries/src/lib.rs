//! Kubernetes binary provisioning.
//!
//! Resolves the kubeadm/kubelet/kubectl/CNI/helm set for every host architecture,
//! downloads it into a versioned cache directory and verifies each file against the
//! SHA-256 checksum table before bootstrap is allowed to proceed.

pub mod artifact;
pub mod checksum;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod resolver;

pub use artifact::{
    Arch, BinaryArtifact, BinaryKind, FetchMode, DEFAULT_CNI_VERSION, DEFAULT_HELM_VERSION,
    DEFAULT_KUBE_VERSION, DEFAULT_PRE_DIR, LEGACY_HELM_VERSION,
};
pub use checksum::{ChecksumEntry, ChecksumTable, ExpectedDigest};
pub use error::{ProvisionError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use pipeline::{required_architectures, BinaryProvisioner, DOWNLOAD_ATTEMPTS};
pub use resolver::{ArtifactResolver, Region, MIRROR_REGION, REGION_ENV};
