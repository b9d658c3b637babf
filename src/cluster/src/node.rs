/// Cluster inventory: static node identity and role flags
use crate::config::InstallerConfig;
use crate::error::{BootstrapError, Result};
use binaries::Arch;
use std::collections::HashSet;

/// One cluster member. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNode {
    pub name: String,
    /// SSH address
    pub address: String,
    /// Address other members and the API endpoint use
    pub internal_address: String,
    pub arch: Arch,
    pub is_master: bool,
    pub is_worker: bool,
    pub is_etcd: bool,
    /// Position within the master role group
    pub master_index: Option<usize>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl HostNode {
    pub fn new(name: impl Into<String>, address: impl Into<String>, arch: Arch) -> Self {
        let address = address.into();
        Self {
            name: name.into(),
            internal_address: address.clone(),
            address,
            arch,
            is_master: false,
            is_worker: false,
            is_etcd: false,
            master_index: None,
            user: None,
            port: None,
        }
    }

    pub fn master(mut self, index: usize) -> Self {
        self.is_master = true;
        self.master_index = Some(index);
        self
    }

    pub fn worker(mut self) -> Self {
        self.is_worker = true;
        self
    }

    pub fn etcd(mut self) -> Self {
        self.is_etcd = true;
        self
    }

    /// The node that initializes the control plane and issues join artifacts
    pub fn is_first_master(&self) -> bool {
        self.is_master && self.master_index == Some(0)
    }

    /// Runs kubelet (master or worker)
    pub fn is_k8s_node(&self) -> bool {
        self.is_master || self.is_worker
    }
}

#[derive(Debug, Clone)]
pub struct Inventory {
    nodes: Vec<HostNode>,
}

impl Inventory {
    pub fn new(nodes: Vec<HostNode>) -> Result<Self> {
        if !nodes.iter().any(HostNode::is_first_master) {
            return Err(BootstrapError::Config(
                "inventory has no master node".to_string(),
            ));
        }
        Ok(Self { nodes })
    }

    /// Build the inventory from hosts and role groups
    pub fn from_config(config: &InstallerConfig) -> Result<Self> {
        let known: HashSet<&str> = config.hosts.iter().map(|h| h.name.as_str()).collect();
        if known.len() != config.hosts.len() {
            return Err(BootstrapError::Config("duplicate host names".to_string()));
        }

        let groups = &config.role_groups;
        for name in groups.etcd.iter().chain(&groups.master).chain(&groups.worker) {
            if !known.contains(name.as_str()) {
                return Err(BootstrapError::Config(format!(
                    "role group references unknown host {}",
                    name
                )));
            }
        }

        let mut nodes = Vec::with_capacity(config.hosts.len());
        for host in &config.hosts {
            let arch: Arch = host.arch.parse()?;
            let mut node = HostNode::new(&host.name, &host.address, arch);
            if let Some(internal) = &host.internal_address {
                node.internal_address = internal.clone();
            }
            node.user = host.user.clone();
            node.port = host.port;

            if let Some(index) = groups.master.iter().position(|m| m == &host.name) {
                node = node.master(index);
            }
            if groups.worker.contains(&host.name) {
                node = node.worker();
            }
            if groups.etcd.contains(&host.name) {
                node = node.etcd();
            }
            nodes.push(node);
        }

        Self::new(nodes)
    }

    pub fn nodes(&self) -> &[HostNode] {
        &self.nodes
    }

    pub fn masters(&self) -> impl Iterator<Item = &HostNode> {
        self.nodes.iter().filter(|n| n.is_master)
    }

    pub fn first_master(&self) -> Option<&HostNode> {
        self.nodes.iter().find(|n| n.is_first_master())
    }

    /// Architectures of every node, as strings for the provisioning pipeline
    pub fn architectures(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.arch.to_string()).collect()
    }
}
