/// Admin kubeconfig handling on the installer machine
use crate::error::{BootstrapError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_yaml::Value;
use std::path::Path;

/// Secure API server port
pub const API_SERVER_PORT: u16 = 6443;

pub fn decode(kubeconfig_base64: &str) -> Result<String> {
    let bytes = BASE64
        .decode(kubeconfig_base64.trim())
        .map_err(|e| BootstrapError::Parse {
            what: "kubeconfig",
            detail: format!("invalid base64: {}", e),
        })?;
    String::from_utf8(bytes).map_err(|e| BootstrapError::Parse {
        what: "kubeconfig",
        detail: format!("not UTF-8: {}", e),
    })
}

/// `https://<address>:6443`, bracketing IPv6 literals
pub fn api_server_url(address: &str) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("https://[{}]:{}", address, API_SERVER_PORT)
    } else {
        format!("https://{}:{}", address, API_SERVER_PORT)
    }
}

/// Point every cluster entry's `server` at `address`
pub fn rewrite_server_address(kubeconfig: &str, address: &str) -> Result<String> {
    let mut doc: Value = serde_yaml::from_str(kubeconfig).map_err(|e| BootstrapError::Parse {
        what: "kubeconfig",
        detail: e.to_string(),
    })?;

    let server = Value::String(api_server_url(address));
    let mut rewritten = 0;
    if let Some(clusters) = doc.get_mut("clusters").and_then(Value::as_sequence_mut) {
        for entry in clusters {
            if let Some(cluster) = entry.get_mut("cluster").and_then(Value::as_mapping_mut) {
                cluster.insert(Value::String("server".to_string()), server.clone());
                rewritten += 1;
            }
        }
    }

    if rewritten == 0 {
        return Err(BootstrapError::Parse {
            what: "kubeconfig",
            detail: "no clusters entry to rewrite".to_string(),
        });
    }

    serde_yaml::to_string(&doc).map_err(|e| BootstrapError::Parse {
        what: "kubeconfig",
        detail: e.to_string(),
    })
}

/// Write the operator's copy of the admin kubeconfig
pub async fn write_local(path: &Path, kubeconfig_base64: &str, address: &str) -> Result<()> {
    let kubeconfig = rewrite_server_address(&decode(kubeconfig_base64)?, address)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BootstrapError::filesystem(format!("Failed to create {:?}", parent), e))?;
    }
    tokio::fs::write(path, kubeconfig)
        .await
        .map_err(|e| BootstrapError::filesystem(format!("Failed to write {:?}", path), e))?;

    tracing::info!("[Kubeconfig] Wrote admin kubeconfig to {}", path.display());
    Ok(())
}
