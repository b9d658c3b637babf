//! Cluster status store.
//!
//! Written only by the task driving the first control-plane node. Join artifacts are
//! published once as an immutable `Arc<JoinArtifacts>` which every join task reads;
//! the surrounding lock only guards the handful of scalar facts.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Everything a node needs to join, captured from the first control-plane node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinArtifacts {
    pub certificate_key: String,
    pub worker_join_command: String,
    pub master_join_command: String,
    /// Raw `kubectl get nodes -o wide` listing
    pub cluster_info: String,
    /// Nodes already registered; these are skipped by the join phase
    pub known_node_names: BTreeSet<String>,
    /// Admin kubeconfig, base64 encoded
    pub kubeconfig_base64: String,
}

impl JoinArtifacts {
    pub fn is_known(&self, node_name: &str) -> bool {
        self.known_node_names.contains(node_name)
    }
}

/// Point-in-time view of the store
#[derive(Debug, Clone, Default)]
pub struct ClusterStatus {
    pub exists: bool,
    pub version: String,
    pub join: Option<Arc<JoinArtifacts>>,
}

#[derive(Debug, Default)]
pub struct ClusterStatusStore {
    inner: RwLock<ClusterStatus>,
}

impl ClusterStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ClusterStatus {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn exists(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .exists
    }

    /// Flip `exists` to true. Returns false if it was already set.
    pub fn mark_exists(&self) -> bool {
        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let changed = !status.exists;
        status.exists = true;
        changed
    }

    pub fn set_version(&self, version: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .version = version.into();
    }

    /// Publish join artifacts; later readers see this exact value
    pub fn publish_join_artifacts(&self, artifacts: JoinArtifacts) -> Arc<JoinArtifacts> {
        let artifacts = Arc::new(artifacts);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .join = Some(artifacts.clone());
        artifacts
    }

    pub fn join_artifacts(&self) -> Option<Arc<JoinArtifacts>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .join
            .clone()
    }
}
