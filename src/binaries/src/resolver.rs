/// Artifact resolution: source URL and cache path for each binary
///
/// URL selection depends only on the region. The mirror hosts serve every binary
/// directly, while upstream helm ships as a release tarball. Published digests
/// (`<file>.sha256`) only exist on the upstream hosts, so `checksum_url` always
/// points there and is unset for binaries that have no upstream counterpart.
use crate::artifact::{
    Arch, BinaryArtifact, BinaryKind, FetchMode, DEFAULT_CNI_VERSION, DEFAULT_HELM_VERSION,
    LEGACY_HELM_VERSION,
};
use std::path::Path;

/// Environment variable carrying the region hint
pub const REGION_ENV: &str = "KKZONE";

/// Region hint value that selects the mirror hosts
pub const MIRROR_REGION: &str = "cn";

const UPSTREAM_KUBE_RELEASE: &str = "https://storage.googleapis.com/kubernetes-release";
const MIRROR_KUBE_RELEASE: &str = "https://kubernetes-release.pek3b.qingstor.com";
const UPSTREAM_CNI_RELEASE: &str = "https://github.com/containernetworking";
const MIRROR_CNI_RELEASE: &str = "https://containernetworking.pek3b.qingstor.com";
const UPSTREAM_HELM_RELEASE: &str = "https://get.helm.sh";
const MIRROR_HELM_RELEASE: &str = "https://kubernetes-helm.pek3b.qingstor.com";

/// Download source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    /// Canonical public release hosts
    #[default]
    Upstream,
    /// Regional mirror hosts
    Mirror,
}

impl Region {
    /// Only the exact mirror value selects the mirror; anything else is upstream.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint {
            Some(value) if value.trim() == MIRROR_REGION => Region::Mirror,
            _ => Region::Upstream,
        }
    }

    /// Read the hint from `KKZONE`
    pub fn from_env() -> Self {
        Self::from_hint(std::env::var(REGION_ENV).ok().as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactResolver {
    region: Region,
}

impl ArtifactResolver {
    pub fn new(region: Region) -> Self {
        Self { region }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    /// Build the full artifact set for one architecture, resolved into `dir`.
    ///
    /// `legacy_helm` adds helm2 for distributions that still need it.
    pub fn artifact_set(
        &self,
        kube_version: &str,
        arch: Arch,
        dir: &Path,
        legacy_helm: bool,
    ) -> Vec<BinaryArtifact> {
        let mut set = vec![
            BinaryArtifact::new(BinaryKind::Kubeadm, kube_version, arch),
            BinaryArtifact::new(BinaryKind::Kubelet, kube_version, arch),
            BinaryArtifact::new(BinaryKind::Kubectl, kube_version, arch),
            BinaryArtifact::new(BinaryKind::Helm, DEFAULT_HELM_VERSION, arch),
            BinaryArtifact::new(BinaryKind::KubeCni, DEFAULT_CNI_VERSION, arch),
        ];
        if legacy_helm {
            set.push(BinaryArtifact::new(BinaryKind::Helm2, LEGACY_HELM_VERSION, arch));
        }

        set.into_iter()
            .map(|artifact| self.resolve(artifact, dir))
            .collect()
    }

    /// Fill in `path`, `url` and `fetch` for a single artifact
    pub fn resolve(&self, mut artifact: BinaryArtifact, dir: &Path) -> BinaryArtifact {
        let version = artifact.version.clone();
        let arch = artifact.arch.as_str();
        let mirror = self.region == Region::Mirror;

        match artifact.kind {
            BinaryKind::Kubeadm | BinaryKind::Kubelet | BinaryKind::Kubectl => {
                let name = artifact.kind.name();
                let host = if mirror {
                    MIRROR_KUBE_RELEASE
                } else {
                    UPSTREAM_KUBE_RELEASE
                };
                artifact.path = dir.join(name);
                artifact.url = format!("{}/release/{}/bin/linux/{}/{}", host, version, arch, name);
                artifact.checksum_url = Some(format!(
                    "{}/release/{}/bin/linux/{}/{}.sha256",
                    UPSTREAM_KUBE_RELEASE, version, arch, name
                ));
            }
            BinaryKind::KubeCni => {
                let file = format!("cni-plugins-linux-{}-{}.tgz", arch, version);
                let host = if mirror {
                    MIRROR_CNI_RELEASE
                } else {
                    UPSTREAM_CNI_RELEASE
                };
                artifact.url = format!("{}/plugins/releases/download/{}/{}", host, version, file);
                artifact.checksum_url = Some(format!(
                    "{}/plugins/releases/download/{}/{}.sha256",
                    UPSTREAM_CNI_RELEASE, version, file
                ));
                artifact.path = dir.join(file);
            }
            BinaryKind::Helm => {
                artifact.path = dir.join("helm");
                if mirror {
                    artifact.url = format!("{}/linux-{}/{}/helm", MIRROR_HELM_RELEASE, arch, version);
                } else {
                    artifact.url = format!(
                        "{}/helm-{}-linux-{}.tar.gz",
                        UPSTREAM_HELM_RELEASE, version, arch
                    );
                    artifact.fetch = FetchMode::TarGzMember(format!("linux-{}/helm", arch));
                    artifact.checksum_url = Some(format!("{}.sha256", artifact.url));
                }
            }
            BinaryKind::Helm2 => {
                // Helm 2 is only published on the mirror host
                artifact.path = dir.join("helm2");
                artifact.url = format!("{}/linux-{}/{}/helm", MIRROR_HELM_RELEASE, arch, version);
            }
        }

        artifact
    }
}
