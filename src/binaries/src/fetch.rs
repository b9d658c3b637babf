/// HTTP fetcher for binary artifacts
use crate::artifact::{BinaryArtifact, FetchMode};
use crate::checksum;
use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Writes the bytes behind `artifact.url` to `artifact.path`.
///
/// Implementations only report transport and filesystem failures; checksum
/// verification of the final file belongs to the provisioning pipeline. When
/// `artifact.archive_sha256` is set the archive is checked before extraction.
/// `artifact.path` is never left holding a partial download.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, artifact: &BinaryArtifact) -> Result<()>;

    /// Body of a small text document such as a published digest.
    /// `None` when the server does not have it.
    async fn fetch_text(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProvisionError::Download {
                name: "http-client".to_string(),
                command: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    fn download_error(artifact: &BinaryArtifact, message: impl Into<String>) -> ProvisionError {
        ProvisionError::Download {
            name: artifact.name().to_string(),
            command: artifact.download_command(),
            message: message.into(),
        }
    }

    /// Download to `<target>.part` and rename into place once the body is complete
    async fn download_to(&self, artifact: &BinaryArtifact, target: &Path) -> Result<()> {
        let partial = partial_path(target);

        let written = match self.stream_to(artifact, &partial).await {
            Ok(bytes) => fs::rename(&partial, target).await.map(|_| bytes).map_err(|e| {
                ProvisionError::filesystem(format!("Failed to move {} into place", partial.display()), e)
            }),
            Err(e) => Err(e),
        };

        match written {
            Ok(bytes) => {
                tracing::debug!(
                    binary = artifact.name(),
                    arch = %artifact.arch,
                    bytes,
                    "[HttpFetcher] Wrote {}",
                    target.display()
                );
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, artifact: &BinaryArtifact, partial: &Path) -> Result<u64> {
        let response = self
            .client
            .get(&artifact.url)
            .send()
            .await
            .map_err(|e| Self::download_error(artifact, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::download_error(
                artifact,
                format!("{} returned {}", artifact.url, response.status()),
            ));
        }
        let expected_len = response.content_length();

        let mut file = fs::File::create(partial).await.map_err(|e| {
            ProvisionError::filesystem(format!("Failed to create {}", partial.display()), e)
        })?;

        let mut total_bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Self::download_error(artifact, e.to_string()))?;
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;

        if let Some(expected_len) = expected_len {
            if total_bytes != expected_len {
                return Err(Self::download_error(
                    artifact,
                    format!("body ended after {} of {} bytes", total_bytes, expected_len),
                ));
            }
        }
        Ok(total_bytes)
    }

    /// Verify the downloaded archive, then extract the member next to it
    async fn unpack(&self, artifact: &BinaryArtifact, archive: &Path, member: &str) -> Result<()> {
        if let Some(expected) = &artifact.archive_sha256 {
            checksum::verify(archive, expected).await?;
        }

        let partial = partial_path(&artifact.path);
        let source = archive.to_path_buf();
        let target = partial.clone();
        let wanted = member.to_string();
        let extracted =
            tokio::task::spawn_blocking(move || extract_member(&source, &wanted, &target))
                .await
                .map_err(|e| Self::download_error(artifact, format!("extract task failed: {}", e)))?;

        let outcome = match extracted {
            Ok(true) => fs::rename(&partial, &artifact.path).await.map_err(|e| {
                ProvisionError::filesystem(format!("Failed to move {} into place", partial.display()), e)
            }),
            Ok(false) => Err(Self::download_error(
                artifact,
                format!("archive does not contain {}", member),
            )),
            Err(e) => Err(ProvisionError::filesystem(
                format!("Failed to extract {}", artifact.url),
                e,
            )),
        };
        if outcome.is_err() {
            let _ = fs::remove_file(&partial).await;
        }
        outcome
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, artifact: &BinaryArtifact) -> Result<()> {
        tracing::debug!("[HttpFetcher] {}", artifact.download_command());

        match &artifact.fetch {
            FetchMode::Direct => self.download_to(artifact, &artifact.path).await,
            FetchMode::TarGzMember(member) => {
                let archive = archive_path(&artifact.path);
                self.download_to(artifact, &archive).await?;

                let result = self.unpack(artifact, &archive, member).await;
                let _ = fs::remove_file(&archive).await;
                result
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<Option<String>> {
        let text_error = |message: String| ProvisionError::Download {
            name: url.to_string(),
            command: format!("curl -L {}", url),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| text_error(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(text_error(format!("{} returned {}", url, response.status())));
        }

        let body = response.text().await.map_err(|e| text_error(e.to_string()))?;
        Ok(Some(body))
    }
}

/// Where a tarball download lands before extraction
pub fn archive_path(target: &Path) -> PathBuf {
    with_suffix(target, ".tar.gz")
}

/// Where bytes are written until the file is complete
pub fn partial_path(target: &Path) -> PathBuf {
    with_suffix(target, ".part")
}

fn with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}

/// Unpack a single member of a gzipped tarball to `target`.
/// Returns `Ok(false)` when the member is absent.
pub fn extract_member(archive: &Path, member: &str, target: &Path) -> std::io::Result<bool> {
    let file = std::fs::File::open(archive)?;
    let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));

    for entry in tarball.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_ref() == Path::new(member) {
            entry.unpack(target)?;
            return Ok(true);
        }
    }
    Ok(false)
}
