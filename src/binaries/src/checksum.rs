/// SHA-256 checksum table and file verification
use crate::artifact::{Arch, BinaryArtifact};
use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Table compiled into the crate; operators extend it with `ChecksumTable::load`
static BUILTIN_TABLE: &str = include_str!("../checksums.toml");

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// What a provisioned file is checked against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedDigest {
    /// Digest of the file at `artifact.path`
    File(String),
    /// Digest of the release archive the file is extracted from
    Archive(String),
}

/// One row of the checksum table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumEntry {
    pub name: String,
    pub version: String,
    pub arch: Arch,
    pub sha256: String,
}

#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default, rename = "binary")]
    binaries: Vec<ChecksumEntry>,
}

/// Expected digests keyed by (name, version, arch)
#[derive(Debug, Clone, Default)]
pub struct ChecksumTable {
    entries: HashMap<(String, String, Arch), String>,
}

impl ChecksumTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The table shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLE)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TableFile = toml::from_str(content)
            .map_err(|e| ProvisionError::ChecksumTable(format!("Failed to parse table: {}", e)))?;

        let mut table = Self::new();
        for entry in file.binaries {
            table.insert(&entry.name, &entry.version, entry.arch, &entry.sha256);
        }
        Ok(table)
    }

    /// Load an operator-supplied table file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::filesystem(
                format!("Failed to read checksum table {}", path.display()),
                e,
            )
        })?;
        let table = Self::from_toml_str(&content)?;
        tracing::info!(
            "[Checksum] Loaded {} checksum entries from {}",
            table.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn insert(&mut self, name: &str, version: &str, arch: Arch, sha256: &str) {
        self.entries.insert(
            (name.to_string(), version.to_string(), arch),
            sha256.trim().to_lowercase(),
        );
    }

    /// Entries from `other` win over existing ones
    pub fn merge(&mut self, other: ChecksumTable) {
        self.entries.extend(other.entries);
    }

    pub fn lookup(&self, name: &str, version: &str, arch: Arch) -> Option<&str> {
        self.entries
            .get(&(name.to_string(), version.to_string(), arch))
            .map(String::as_str)
            .filter(|digest| !digest.is_empty())
    }

    /// Expected digest for an artifact, or `ChecksumUnsupported` if the table has none
    pub fn expected(&self, artifact: &BinaryArtifact) -> Result<String> {
        self.lookup(artifact.name(), &artifact.version, artifact.arch)
            .map(str::to_string)
            .ok_or_else(|| ProvisionError::ChecksumUnsupported {
                name: artifact.name().to_string(),
                version: artifact.version.clone(),
                arch: artifact.arch.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hex-encoded SHA-256 of a file, streamed in fixed-size chunks
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        ProvisionError::filesystem(format!("Failed to check SHA256 of {}", path.display()), e)
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare a file against its expected digest
pub async fn verify(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path).await?;
    if actual != expected {
        return Err(ProvisionError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }

    tracing::debug!("[Checksum] {} matches {}", path.display(), expected);
    Ok(())
}

/// First token of a published `.sha256` document, if it is a SHA-256 digest.
///
/// Accepts both a bare digest and `sha256sum` output (`<digest>  <file>`).
pub fn parse_published_digest(content: &str) -> Option<String> {
    let token = content.split_whitespace().next()?;
    if token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}

/// Sidecar file holding the digest of a binary that was verified through its archive
pub fn digest_record_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".sha256");
    path.with_file_name(name)
}

pub async fn read_digest_record(path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(digest_record_path(path)).await.ok()?;
    parse_published_digest(&content)
}

/// Record the digest of `path` after it was verified through its archive
pub async fn write_digest_record(path: &Path) -> Result<String> {
    let digest = sha256_file(path).await?;
    let record = digest_record_path(path);
    tokio::fs::write(&record, format!("{}\n", digest))
        .await
        .map_err(|e| ProvisionError::filesystem(format!("Failed to write {}", record.display()), e))?;
    Ok(digest)
}
