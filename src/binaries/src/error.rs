use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("Failed to download {name} binary ({command}): {message}")]
    Download {
        name: String,
        command: String,
        message: String,
    },

    #[error("No SHA256 found for {name} {version} ({arch}). {version} is not supported.")]
    ChecksumUnsupported {
        name: String,
        version: String,
        arch: String,
    },

    #[error("SHA256 no match for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Checksum table error: {0}")]
    ChecksumTable(String),

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    pub(crate) fn filesystem(context: impl Into<String>, source: std::io::Error) -> Self {
        ProvisionError::Filesystem {
            context: context.into(),
            source,
        }
    }

    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self, ProvisionError::ChecksumMismatch { .. })
    }
}
