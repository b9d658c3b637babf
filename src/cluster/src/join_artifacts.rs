//! Join artifact extraction from kubeadm/kubectl output.
//!
//! The grammar is deliberately narrow: the certificate key is the first run of 64
//! lowercase hex characters, and the join command is whatever follows the literal
//! `kubeadm join` marker.

use crate::error::{BootstrapError, Result};
use regex::Regex;
use std::collections::BTreeSet;

pub const KUBEADM_BIN: &str = "/usr/local/bin/kubeadm";

/// Marker splitting `kubeadm token create --print-join-command` output
pub const JOIN_MARKER: &str = "kubeadm join";

const CERTIFICATE_KEY_PATTERN: &str = "[0-9a-f]{64}";

/// First 64-character hex token in `output`
pub fn extract_certificate_key(output: &str) -> Result<String> {
    let pattern = Regex::new(CERTIFICATE_KEY_PATTERN).map_err(|e| BootstrapError::Parse {
        what: "certificate key",
        detail: e.to_string(),
    })?;

    pattern
        .find(output)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| BootstrapError::Parse {
            what: "certificate key",
            detail: "no 64-character hex key in upload-certs output".to_string(),
        })
}

/// Canonical worker join command rebuilt around the argument tail
pub fn extract_worker_join_command(output: &str) -> Result<String> {
    let tail = output
        .split_once(JOIN_MARKER)
        .map(|(_, tail)| tail.lines().next().unwrap_or("").trim())
        .ok_or_else(|| BootstrapError::Parse {
            what: "join command",
            detail: format!("no '{}' in token create output", JOIN_MARKER),
        })?;

    if tail.is_empty() {
        return Err(BootstrapError::Parse {
            what: "join command",
            detail: "join command has no arguments".to_string(),
        });
    }

    Ok(format!("{} join {}", KUBEADM_BIN, tail))
}

pub fn master_join_command(worker_join_command: &str, certificate_key: &str) -> String {
    format!(
        "{} --control-plane --certificate-key {}",
        worker_join_command, certificate_key
    )
}

/// Node names from a `kubectl get nodes` listing (first column, header skipped)
pub fn parse_node_names(listing: &str) -> BTreeSet<String> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| *name != "NAME")
        .map(str::to_string)
        .collect()
}
