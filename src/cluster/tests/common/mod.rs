//! In-memory cluster that answers the commands the bootstrap protocol issues
#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use binaries::Arch;
use cluster::{ExecError, HostNode, NodeDispatcher, NodeExecutor, RemoteCommandResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

pub const CERT_KEY: &str = "3a5f0c9d2b7e4f1a8c6d0e9b2a4f7c1d5e8b3a6f9c2d4e7a1b5c8d0f3e6a9b2c";

pub const ADMIN_KUBECONFIG: &str = "apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: LS0tLS1CRUdJTg==
    server: https://lb.kubesphere.local:6443
  name: cluster.local
contexts:
- context:
    cluster: cluster.local
    user: kubernetes-admin
  name: kubernetes-admin@cluster.local
current-context: kubernetes-admin@cluster.local
kind: Config
users:
- name: kubernetes-admin
  user:
    client-certificate-data: LS0tLS1CRUdJTg==
";

pub const TOKEN_OUTPUT: &str = "W0101 12:00:00.000000 1 configset.go:348] WARNING: kubeadm cannot validate component configs\nkubeadm join 10.0.0.1:6443 --token abcdef.0123456789abcdef     --discovery-token-ca-cert-hash sha256:0123456789abcdef \nW0101 12:00:01.000000 1 configset.go:348] WARNING: kubeadm cannot validate component configs\n";

#[derive(Debug, Default)]
pub struct ClusterState {
    pub admin_conf_present: bool,
    pub members: BTreeSet<String>,
    pub init_failures: u32,
    pub upload_certs_output: String,
    /// Commands containing any of these fragments exit non-zero
    pub failing: Vec<String>,
    pub commands: HashMap<String, Vec<String>>,
}

/// Shared state behind every FakeNode of one cluster
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ClusterState {
                upload_certs_output: format!(
                    "[upload-certs] Storing the certificates in Secret \"kubeadm-certs\" in the \"kube-system\" Namespace\n[upload-certs] Using certificate key:\n{}\n",
                    CERT_KEY
                ),
                ..ClusterState::default()
            }),
        })
    }

    /// Cluster where `members` already joined and admin.conf exists on the first master
    pub fn existing(members: &[&str]) -> Arc<Self> {
        let cluster = Self::new();
        {
            let mut state = cluster.state.lock().unwrap();
            state.admin_conf_present = true;
            state.members = members.iter().map(|m| m.to_string()).collect();
        }
        cluster
    }

    pub fn with_state(&self, f: impl FnOnce(&mut ClusterState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .commands
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count_for(&self, host: &str, fragment: &str) -> usize {
        self.commands_for(host)
            .iter()
            .filter(|c| c.contains(fragment))
            .count()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    pub fn members(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().members.clone()
    }

    fn respond(&self, host: &HostNode, command: &str) -> RemoteCommandResult {
        let mut state = self.state.lock().unwrap();
        state
            .commands
            .entry(host.name.clone())
            .or_default()
            .push(command.to_string());

        if state.failing.iter().any(|f| command.contains(f.as_str())) {
            return failed("injected failure");
        }

        if command.contains("[ -f /etc/kubernetes/admin.conf ]") {
            if state.admin_conf_present {
                ok("Cluster already exists.")
            } else {
                ok("Cluster will be created.")
            }
        } else if command.contains("kube-apiserver.yaml") {
            ok("v1.19.8\n")
        } else if command.contains("upload-certs") {
            ok(&state.upload_certs_output)
        } else if command.contains("init --config") {
            if state.init_failures > 0 {
                state.init_failures -= 1;
                return failed("[ERROR Port-6443]: Port 6443 is in use");
            }
            state.admin_conf_present = true;
            state.members.insert(host.name.clone());
            ok("Your Kubernetes control-plane has initialized successfully!")
        } else if command.contains("reset -f") {
            ok("[reset] Deleting contents of stateful directories")
        } else if command.contains("token create") {
            ok(TOKEN_OUTPUT)
        } else if command.contains("get nodes -o wide") {
            let mut listing = String::from("NAME    STATUS   ROLES    AGE   VERSION\r\n");
            for member in &state.members {
                listing.push_str(&format!("{}   Ready    master   1m    v1.19.8\r\n", member));
            }
            ok(&listing)
        } else if command.contains("base64 --wrap=0") {
            ok(&BASE64.encode(ADMIN_KUBECONFIG))
        } else if command.contains("kubeadm join") {
            state.members.insert(host.name.clone());
            ok("This node has joined the cluster")
        } else {
            ok("")
        }
    }
}

fn ok(output: &str) -> RemoteCommandResult {
    RemoteCommandResult {
        output: output.to_string(),
        stderr: String::new(),
        exit_status: 0,
    }
}

fn failed(stderr: &str) -> RemoteCommandResult {
    RemoteCommandResult {
        output: String::new(),
        stderr: stderr.to_string(),
        exit_status: 1,
    }
}

pub struct FakeNode {
    host: HostNode,
    cluster: Arc<FakeCluster>,
}

#[async_trait]
impl NodeExecutor for FakeNode {
    fn host(&self) -> &HostNode {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<RemoteCommandResult, ExecError> {
        Ok(self.cluster.respond(&self.host, command))
    }
}

pub fn master(name: &str, address: &str, index: usize) -> HostNode {
    HostNode::new(name, address, Arch::Amd64).master(index).etcd()
}

pub fn worker(name: &str, address: &str) -> HostNode {
    HostNode::new(name, address, Arch::Amd64).worker()
}

pub fn dispatcher(cluster: &Arc<FakeCluster>, hosts: Vec<HostNode>) -> NodeDispatcher {
    let executors: Vec<Arc<dyn NodeExecutor>> = hosts
        .into_iter()
        .map(|host| {
            Arc::new(FakeNode {
                host,
                cluster: cluster.clone(),
            }) as Arc<dyn NodeExecutor>
        })
        .collect();
    NodeDispatcher::new(executors, 4)
}

/// Master node1 (10.0.0.1) and worker node2 (10.0.0.2)
pub fn two_hosts() -> Vec<HostNode> {
    vec![master("node1", "10.0.0.1", 0), worker("node2", "10.0.0.2")]
}
