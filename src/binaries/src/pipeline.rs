/// Binary provisioning pipeline
///
/// For every required architecture the pipeline creates
/// `<work_dir>/<prefix>/<version>/<arch>/`, resolves the artifact set into it and makes
/// sure each file is present with a matching checksum. Any failure aborts the whole run:
/// a partially provisioned cache is not usable for bootstrap.
use crate::artifact::{Arch, BinaryArtifact, FetchMode, DEFAULT_PRE_DIR};
use crate::checksum::{self, ChecksumTable, ExpectedDigest};
use crate::error::{ProvisionError, Result};
use crate::fetch::Fetcher;
use crate::resolver::{ArtifactResolver, Region};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Download attempts for a fresh artifact before a checksum mismatch becomes fatal
pub const DOWNLOAD_ATTEMPTS: u32 = 5;

/// Parse and deduplicate host architectures.
pub fn required_architectures<I, S>(arches: I) -> Result<Vec<Arch>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = BTreeSet::new();
    for arch in arches {
        set.insert(arch.as_ref().parse::<Arch>()?);
    }
    Ok(set.into_iter().collect())
}

pub struct BinaryProvisioner {
    work_dir: PathBuf,
    prefix: String,
    checksums: ChecksumTable,
    fetcher: Arc<dyn Fetcher>,
    legacy_helm: bool,
    published_checksums: bool,
}

impl BinaryProvisioner {
    pub fn new(work_dir: PathBuf, checksums: ChecksumTable, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            work_dir,
            prefix: DEFAULT_PRE_DIR.to_string(),
            checksums,
            fetcher,
            legacy_helm: false,
            published_checksums: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Also provision helm2 for every architecture
    pub fn with_legacy_helm(mut self, legacy_helm: bool) -> Self {
        self.legacy_helm = legacy_helm;
        self
    }

    /// Fall back to the digest published next to the upstream artifact when the
    /// table has no entry
    pub fn with_published_checksums(mut self, enabled: bool) -> Self {
        self.published_checksums = enabled;
        self
    }

    /// Cache directory for one version/architecture pair
    pub fn binaries_dir(&self, version: &str, arch: Arch) -> PathBuf {
        self.work_dir
            .join(&self.prefix)
            .join(version)
            .join(arch.as_str())
    }

    /// Provision the full binary set for `version` on every listed architecture.
    ///
    /// Returns the resolved artifacts, all of which exist on disk with verified
    /// checksums when this returns `Ok`.
    pub async fn provision<I, S>(
        &self,
        version: &str,
        architectures: I,
        region: Region,
    ) -> Result<Vec<BinaryArtifact>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let arches = required_architectures(architectures)?;
        let resolver = ArtifactResolver::new(region);

        tracing::info!(
            "[Provisioner] Downloading installation files for {} ({:?}, {:?})",
            version,
            arches,
            region
        );

        let mut planned = Vec::new();
        for arch in arches {
            let dir = self.binaries_dir(version, arch);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                ProvisionError::filesystem(
                    format!("Failed to create download target dir {}", dir.display()),
                    e,
                )
            })?;

            for artifact in resolver.artifact_set(version, arch, &dir, self.legacy_helm) {
                // Unsupported versions fail before any binary is downloaded
                let expected = self.expected_digest(&artifact).await?;
                planned.push((artifact, expected));
            }
        }

        // One task per artifact: the same file is never downloaded twice at once
        let downloads = planned
            .iter()
            .map(|(artifact, expected)| self.ensure_artifact(artifact, expected));
        futures::future::try_join_all(downloads).await?;

        tracing::info!("[Provisioner] {} binaries ready", planned.len());
        Ok(planned.into_iter().map(|(artifact, _)| artifact).collect())
    }

    /// Table entry first, then the published digest if enabled.
    ///
    /// A published digest of a tarball applies to the archive, not the extracted binary.
    pub async fn expected_digest(&self, artifact: &BinaryArtifact) -> Result<ExpectedDigest> {
        let unsupported = match self.checksums.expected(artifact) {
            Ok(digest) => return Ok(ExpectedDigest::File(digest)),
            Err(e) => e,
        };
        let url = match (&artifact.checksum_url, self.published_checksums) {
            (Some(url), true) => url,
            _ => return Err(unsupported),
        };

        let Some(content) = self.fetcher.fetch_text(url).await? else {
            return Err(unsupported);
        };
        let digest = checksum::parse_published_digest(&content).ok_or_else(|| {
            ProvisionError::ChecksumTable(format!("{} does not hold a SHA256 digest", url))
        })?;

        tracing::info!(
            "[Provisioner] Using published SHA256 for {} {} ({})",
            artifact.name(),
            artifact.version,
            artifact.arch
        );
        Ok(match artifact.fetch {
            FetchMode::Direct => ExpectedDigest::File(digest),
            FetchMode::TarGzMember(_) => ExpectedDigest::Archive(digest),
        })
    }

    /// Make sure a single artifact is on disk with the expected digest.
    ///
    /// A file that already exists is only verified: a mismatch there is fatal and is
    /// not re-downloaded. A fresh download is retried on mismatch, deleting the bad
    /// file each time, up to `DOWNLOAD_ATTEMPTS`. Transport errors are never retried.
    ///
    /// Binaries verified through their archive get a `<file>.sha256` record; an
    /// existing binary without one is downloaded again.
    pub async fn ensure_artifact(
        &self,
        artifact: &BinaryArtifact,
        expected: &ExpectedDigest,
    ) -> Result<()> {
        if path_exists(&artifact.path).await {
            let known = match expected {
                ExpectedDigest::File(digest) => Some(digest.clone()),
                ExpectedDigest::Archive(_) => checksum::read_digest_record(&artifact.path).await,
            };
            if let Some(digest) = known {
                tracing::info!(
                    "[Provisioner] {} ({}) already present, verifying",
                    artifact.name(),
                    artifact.arch
                );
                return checksum::verify(&artifact.path, &digest).await;
            }
            tracing::info!(
                "[Provisioner] {} ({}) has no recorded digest, downloading again",
                artifact.name(),
                artifact.arch
            );
        }

        let mut request = artifact.clone();
        if let ExpectedDigest::Archive(digest) = expected {
            request.archive_sha256 = Some(digest.clone());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!(
                "[Provisioner] Downloading {} {} ({}) attempt {}/{}",
                artifact.name(),
                artifact.version,
                artifact.arch,
                attempt,
                DOWNLOAD_ATTEMPTS
            );

            let outcome = match self.fetcher.fetch(&request).await {
                Ok(()) => match expected {
                    ExpectedDigest::File(digest) => checksum::verify(&artifact.path, digest).await,
                    ExpectedDigest::Archive(_) => Ok(()),
                },
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    if let ExpectedDigest::Archive(_) = expected {
                        checksum::write_digest_record(&artifact.path).await?;
                    }
                    return Ok(());
                }
                Err(e) if e.is_checksum_mismatch() => {
                    tracing::warn!(
                        binary = artifact.name(),
                        arch = %artifact.arch,
                        attempt,
                        "[Provisioner] {}",
                        e
                    );
                    remove_corrupt(&artifact.path).await?;
                    if attempt == DOWNLOAD_ATTEMPTS {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_corrupt(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisionError::filesystem(
            format!("Failed to remove corrupt download {}", path.display()),
            e,
        )),
    }
}
