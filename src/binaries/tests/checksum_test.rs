//! Tests for the checksum table and file verification

use binaries::checksum::{digest_record_path, parse_published_digest, sha256_file, verify};
use binaries::{Arch, BinaryArtifact, BinaryKind, ChecksumTable, ProvisionError};
use std::path::Path;

// sha256("hello world")
const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

#[tokio::test]
async fn test_sha256_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kubeadm");
    std::fs::write(&path, b"hello world").unwrap();

    assert_eq!(sha256_file(&path).await.unwrap(), HELLO_SHA256);
}

#[tokio::test]
async fn test_verify_match_and_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kubectl");
    std::fs::write(&path, b"hello world").unwrap();

    verify(&path, HELLO_SHA256).await.unwrap();

    let err = verify(&path, &"0".repeat(64)).await.unwrap_err();
    match err {
        ProvisionError::ChecksumMismatch { expected, actual, .. } => {
            assert_eq!(expected, "0".repeat(64));
            assert_eq!(actual, HELLO_SHA256);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_table_from_toml() {
    let table = ChecksumTable::from_toml_str(
        r#"
[[binary]]
name = "kubeadm"
version = "v1.21.0"
arch = "amd64"
sha256 = "  ABCDEF  "

[[binary]]
name = "kubeadm"
version = "v1.21.0"
arch = "arm64"
sha256 = "123456"
"#,
    )
    .unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.lookup("kubeadm", "v1.21.0", Arch::Amd64), Some("abcdef"));
    assert_eq!(table.lookup("kubeadm", "v1.21.0", Arch::Arm64), Some("123456"));
    assert_eq!(table.lookup("kubeadm", "v1.20.0", Arch::Amd64), None);
}

#[test]
fn test_missing_entry_is_unsupported_version() {
    let table = ChecksumTable::new();
    let artifact = BinaryArtifact::new(BinaryKind::Kubelet, "v9.9.9", Arch::Amd64);

    let err = table.expected(&artifact).unwrap_err();
    assert!(matches!(err, ProvisionError::ChecksumUnsupported { .. }));
    assert!(err.to_string().contains("v9.9.9 is not supported"));
}

#[test]
fn test_empty_digest_counts_as_missing() {
    let mut table = ChecksumTable::new();
    table.insert("helm", "v3.2.1", Arch::Amd64, "   ");
    assert_eq!(table.lookup("helm", "v3.2.1", Arch::Amd64), None);
}

#[test]
fn test_merge_overrides_existing_entries() {
    let mut base = ChecksumTable::new();
    base.insert("kubectl", "v1.21.0", Arch::Amd64, "aaaa");
    base.insert("kubelet", "v1.21.0", Arch::Amd64, "bbbb");

    let mut overrides = ChecksumTable::new();
    overrides.insert("kubectl", "v1.21.0", Arch::Amd64, "cccc");
    base.merge(overrides);

    assert_eq!(base.lookup("kubectl", "v1.21.0", Arch::Amd64), Some("cccc"));
    assert_eq!(base.lookup("kubelet", "v1.21.0", Arch::Amd64), Some("bbbb"));
}

#[test]
fn test_builtin_table_parses() {
    ChecksumTable::builtin().unwrap();
}

#[test]
fn test_invalid_table_is_rejected() {
    let err = ChecksumTable::from_toml_str("[[binary]]\nname = 1").unwrap_err();
    assert!(matches!(err, ProvisionError::ChecksumTable(_)));
}

#[test]
fn test_published_digest_formats() {
    let digest = "AB".repeat(32);
    assert_eq!(parse_published_digest(&format!("{}\n", digest)), Some("ab".repeat(32)));
    assert_eq!(
        parse_published_digest(&format!("{}  helm-v3.2.1-linux-amd64.tar.gz\n", digest)),
        Some("ab".repeat(32))
    );
    assert_eq!(parse_published_digest("<html>Not Found</html>"), None);
    assert_eq!(parse_published_digest(""), None);
    assert_eq!(parse_published_digest(&"z".repeat(64)), None);
}

#[test]
fn test_digest_record_sits_next_to_binary() {
    assert_eq!(
        digest_record_path(Path::new("/cache/v1.19.8/amd64/helm")),
        Path::new("/cache/v1.19.8/amd64/helm.sha256")
    );
}
