//! Cluster bootstrap protocol.
//!
//! Driven from the first control-plane node: detect an existing cluster, initialize
//! the control plane when there is none, issue join artifacts, then join every other
//! Kubernetes node through the dispatcher. Join tasks only ever see the immutable
//! `JoinArtifacts` published after issuance.

use crate::config::KubernetesConfig;
use crate::dispatch::{NodeDispatcher, NodeFilter};
use crate::error::{BootstrapError, Result};
use crate::executor::{sudo, NodeExecutor};
use crate::join_artifacts::{self, KUBEADM_BIN};
use crate::kubeadm_config;
use crate::kubeconfig;
use crate::retry::with_retry;
use crate::status::{ClusterStatusStore, JoinArtifacts};
use crate::template_renderer::TemplateRenderer;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

pub const KUBECTL_BIN: &str = "/usr/local/bin/kubectl";
pub const ADMIN_CONF: &str = "/etc/kubernetes/admin.conf";
pub const KUBEADM_CONFIG_PATH: &str = "/etc/kubernetes/kubeadm-config.yaml";
pub const APISERVER_MANIFEST: &str = "/etc/kubernetes/manifests/kube-apiserver.yaml";

/// Local copy of the admin kubeconfig, relative to the work directory
pub const LOCAL_KUBECONFIG: &str = "config";

pub const INIT_ATTEMPTS: u32 = 3;
pub const JOIN_ATTEMPTS: u32 = 3;

/// Entries of kube-system/kubeadm-certs blanked after every certificate upload
pub const EXTERNAL_ETCD_CERTS: [&str; 3] =
    ["external-etcd-ca.crt", "external-etcd.crt", "external-etcd.key"];

const CLUSTER_EXISTS_MARKER: &str = "Cluster already exists";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Unknown,
    Detecting,
    Exists,
    Absent,
    Initializing,
    Initialized,
    IssuingJoinArtifacts,
    JoinReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeJoinOutcome {
    /// Already registered; no command was issued
    AlreadyMember,
    JoinedMaster,
    JoinedWorker,
}

/// Cluster DNS installation, run once right after control-plane initialization.
///
/// kubeboot ships no implementation: the DNS addon is installed by whatever embeds
/// the installer, through `Installer::with_dns` or `ClusterBootstrap::with_dns`.
#[async_trait]
pub trait DnsProvisioner: Send + Sync {
    async fn create_cluster_dns(&self, node: &dyn NodeExecutor) -> Result<()>;
}

/// What one `run()` did
#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub transitions: Vec<BootstrapPhase>,
    /// Control-plane version, scraped from the API server manifest for existing clusters
    pub version: String,
    /// Per-node outcome of the join phase, sorted by node name
    pub nodes: Vec<(String, NodeJoinOutcome)>,
}

impl BootstrapReport {
    pub fn initialized(&self) -> bool {
        self.transitions.contains(&BootstrapPhase::Initialized)
    }

    pub fn joined(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, outcome)| *outcome != NodeJoinOutcome::AlreadyMember)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, outcome)| *outcome == NodeJoinOutcome::AlreadyMember)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub struct ClusterBootstrap {
    work_dir: PathBuf,
    kube_version: String,
    kubernetes: KubernetesConfig,
    dispatcher: NodeDispatcher,
    renderer: TemplateRenderer,
    store: Arc<ClusterStatusStore>,
    dns: Option<Arc<dyn DnsProvisioner>>,
    transitions: Mutex<Vec<BootstrapPhase>>,
    outcomes: Mutex<Vec<(String, NodeJoinOutcome)>>,
}

impl ClusterBootstrap {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        kube_version: impl Into<String>,
        kubernetes: KubernetesConfig,
        dispatcher: NodeDispatcher,
    ) -> Result<Self> {
        Ok(Self {
            work_dir: work_dir.into(),
            kube_version: kube_version.into(),
            kubernetes,
            dispatcher,
            renderer: TemplateRenderer::from_embedded()?,
            store: Arc::new(ClusterStatusStore::new()),
            dns: None,
            transitions: Mutex::new(Vec::new()),
            outcomes: Mutex::new(Vec::new()),
        })
    }

    pub fn with_dns(mut self, dns: Arc<dyn DnsProvisioner>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn store(&self) -> Arc<ClusterStatusStore> {
        self.store.clone()
    }

    /// Run the whole protocol once
    pub async fn run(&self) -> Result<BootstrapReport> {
        self.reset_report();
        self.transition(BootstrapPhase::Unknown);

        let first_master = self.dispatcher.first_master().ok_or_else(|| {
            BootstrapError::Protocol("inventory has no first control-plane node".to_string())
        })?;
        let master = first_master.as_ref();

        self.transition(BootstrapPhase::Detecting);
        if self.detect(master).await? {
            self.transition(BootstrapPhase::Exists);
            let version = self.current_version(master).await?;
            tracing::info!("[Bootstrap] Cluster already exists (version {})", version);
            self.store.set_version(version);
            self.store.mark_exists();
        } else {
            self.transition(BootstrapPhase::Absent);
            self.transition(BootstrapPhase::Initializing);
            self.init_control_plane(master).await?;
            self.transition(BootstrapPhase::Initialized);
        }

        self.transition(BootstrapPhase::IssuingJoinArtifacts);
        let artifacts = self
            .store
            .publish_join_artifacts(issue_join_artifacts(master).await?);
        self.transition(BootstrapPhase::JoinReady);

        self.dispatcher
            .run_on_nodes(
                NodeFilter::K8sNodes,
                |node| self.join_node(node, artifacts.clone()),
                false,
            )
            .await?;

        kubeconfig::write_local(
            &self.work_dir.join(LOCAL_KUBECONFIG),
            &artifacts.kubeconfig_base64,
            &master.host().internal_address,
        )
        .await?;

        let report = self.report();
        tracing::info!(
            "[Bootstrap] Done: {} joined, {} already members",
            report.joined().len(),
            report.skipped().len()
        );
        Ok(report)
    }

    /// True when the admin kubeconfig is already present on the first master
    async fn detect(&self, node: &dyn NodeExecutor) -> Result<bool> {
        let detect = sudo(&format!(
            "[ -f {} ] && echo '{}.' || echo 'Cluster will be created.'",
            ADMIN_CONF, CLUSTER_EXISTS_MARKER
        ));
        let output = run(node, &detect, 0, false, "Failed to find /etc/kubernetes/admin.conf").await?;
        Ok(output.contains(CLUSTER_EXISTS_MARKER))
    }

    async fn current_version(&self, node: &dyn NodeExecutor) -> Result<String> {
        let command = format!(
            "sudo cat {} | grep 'image:' | awk -F '[:]' '{{print $(NF-0)}}'",
            APISERVER_MANIFEST
        );
        let output = run(node, &command, 1, false, "Failed to find current version").await?;
        Ok(output.trim().to_string())
    }

    async fn init_control_plane(&self, node: &dyn NodeExecutor) -> Result<()> {
        let host = node.host();
        tracing::info!("[Bootstrap] Initializing control plane on {}", host.name);

        let hosts = self.dispatcher.hosts();
        let config = kubeadm_config::resolve(
            &self.work_dir,
            &self.renderer,
            &self.kubernetes,
            &self.kube_version,
            &hosts,
            host,
        )?;
        let upload = sudo(&format!(
            "mkdir -p /etc/kubernetes && echo {} | base64 -d > {}",
            BASE64.encode(config),
            KUBEADM_CONFIG_PATH
        ));
        run(node, &upload, 1, false, "Failed to generate kubeadm config").await?;

        let init = sudo(&format!(
            "{} init --config={} --ignore-preflight-errors=FileExisting-crictl",
            KUBEADM_BIN, KUBEADM_CONFIG_PATH
        ));
        with_retry(INIT_ATTEMPTS, || reset_node(node), |_| {
            run(node, &init, 0, false, "Failed to init kubernetes cluster")
        })
        .await?;

        stage_admin_kubeconfig(node).await?;
        if host.is_worker {
            remove_master_taint(node).await?;
            label_worker(node).await;
        }

        match &self.dns {
            Some(dns) => dns.create_cluster_dns(node).await?,
            None => tracing::info!("[Bootstrap] No cluster DNS provisioner configured"),
        }

        self.store.set_version(self.kube_version.clone());
        self.store.mark_exists();
        tracing::info!("[Bootstrap] Control plane initialized on {}", host.name);
        Ok(())
    }

    async fn join_node(&self, node: Arc<dyn NodeExecutor>, artifacts: Arc<JoinArtifacts>) -> Result<()> {
        let host = node.host();
        if host.is_first_master() {
            return Ok(());
        }
        if artifacts.is_known(&host.name) {
            tracing::info!("[Bootstrap] {} is already a cluster member", host.name);
            self.record(&host.name, NodeJoinOutcome::AlreadyMember);
            return Ok(());
        }

        let node = node.as_ref();
        if host.is_master {
            join_with_retry(node, &artifacts.master_join_command, "Failed to add master to cluster")
                .await?;
            stage_admin_kubeconfig(node).await?;
            if host.is_worker {
                remove_master_taint(node).await?;
                label_worker(node).await;
            }
            self.record(&host.name, NodeJoinOutcome::JoinedMaster);
        } else {
            join_with_retry(node, &artifacts.worker_join_command, "Failed to add worker to cluster")
                .await?;
            write_admin_kubeconfig(node, &artifacts.kubeconfig_base64).await?;
            label_worker(node).await;
            self.record(&host.name, NodeJoinOutcome::JoinedWorker);
        }

        tracing::info!("[Bootstrap] {} joined the cluster", host.name);
        Ok(())
    }

    fn transition(&self, phase: BootstrapPhase) {
        tracing::debug!("[Bootstrap] -> {:?}", phase);
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(phase);
    }

    fn record(&self, name: &str, outcome: NodeJoinOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), outcome));
    }

    fn reset_report(&self) {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn report(&self) -> BootstrapReport {
        let mut nodes = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));

        BootstrapReport {
            transitions: self
                .transitions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            version: self.store.snapshot().version,
            nodes,
        }
    }
}

/// Upload certificates, scrub external-etcd entries and capture everything joins need
pub async fn issue_join_artifacts(node: &dyn NodeExecutor) -> Result<JoinArtifacts> {
    let upload = sudo(&format!("{} init phase upload-certs --upload-certs", KUBEADM_BIN));
    let output = run(node, &upload, 5, true, "Failed to upload kubeadm certs").await?;

    // The scrub runs whether or not a key was found; extraction errors win.
    let certificate_key = join_artifacts::extract_certificate_key(&output);
    let scrubbed = scrub_external_etcd_certs(node).await;
    let certificate_key = certificate_key?;
    scrubbed?;

    let token = sudo(&format!("{} token create --print-join-command", KUBEADM_BIN));
    let output = run(node, &token, 0, false, "Failed to get join node cmd").await?;
    let worker_join_command = join_artifacts::extract_worker_join_command(&output)?;
    let master_join_command =
        join_artifacts::master_join_command(&worker_join_command, &certificate_key);

    let nodes = sudo(&format!("{} get nodes -o wide", KUBECTL_BIN));
    let cluster_info = run(node, &nodes, 5, false, "Failed to get cluster info").await?;
    let known_node_names = join_artifacts::parse_node_names(&cluster_info);

    let admin = sudo(&format!("cat {} | base64 --wrap=0", ADMIN_CONF));
    let kubeconfig_base64 = run(node, &admin, 1, false, "Failed to get cluster kubeconfig").await?;

    tracing::info!(
        "[Bootstrap] Join artifacts issued ({} registered nodes)",
        known_node_names.len()
    );

    Ok(JoinArtifacts {
        certificate_key,
        worker_join_command,
        master_join_command,
        cluster_info,
        known_node_names,
        kubeconfig_base64,
    })
}

async fn scrub_external_etcd_certs(node: &dyn NodeExecutor) -> Result<()> {
    for entry in EXTERNAL_ETCD_CERTS {
        let patch = sudo(&format!(
            r#"{} patch -n kube-system secret kubeadm-certs -p '{{\"data\": {{\"{}\": \"\"}}}}'"#,
            KUBECTL_BIN, entry
        ));
        run(node, &patch, 5, false, "Failed to patch kubeadm secret").await?;
    }
    Ok(())
}

async fn join_with_retry(node: &dyn NodeExecutor, join_command: &str, context: &str) -> Result<()> {
    let command = sudo(join_command);
    with_retry(JOIN_ATTEMPTS, || reset_node(node), |_| {
        run(node, &command, 0, false, context)
    })
    .await?;
    Ok(())
}

/// Best effort; the next attempt reports the real failure
async fn reset_node(node: &dyn NodeExecutor) {
    let reset = sudo(&format!("{} reset -f", KUBEADM_BIN));
    if let Err(e) = node.execute(&reset, 0, true).await {
        tracing::warn!("[Bootstrap] kubeadm reset failed on {}: {}", node.host().name, e);
    }
}

/// Copy admin.conf into root's and the login user's kubeconfig on a control-plane node
async fn stage_admin_kubeconfig(node: &dyn NodeExecutor) -> Result<()> {
    let root = sudo(&format!(
        "mkdir -p /root/.kube && cp -f {} /root/.kube/config",
        ADMIN_CONF
    ));
    run(node, &root, 1, false, "Failed to sync kube config").await?;

    let user = sudo(&format!(
        "mkdir -p $HOME/.kube && cp -f {} $HOME/.kube/config && chown $(id -u):$(id -g) -R $HOME/.kube",
        ADMIN_CONF
    ));
    run(node, &user, 1, false, "Failed to sync kube config").await?;
    Ok(())
}

/// Materialize the captured admin kubeconfig on a worker
async fn write_admin_kubeconfig(node: &dyn NodeExecutor, kubeconfig_base64: &str) -> Result<()> {
    let dirs = sudo("mkdir -p /root/.kube && mkdir -p $HOME/.kube");
    run(node, &dirs, 1, false, "Failed to create kube dir").await?;

    let root = sudo(&format!(
        "echo {} | base64 -d > /root/.kube/config",
        kubeconfig_base64
    ));
    run(node, &root, 1, false, "Failed to sync kube config").await?;

    let user = sudo(&format!(
        "echo {} | base64 -d > $HOME/.kube/config && chown $(id -u):$(id -g) -R $HOME/.kube",
        kubeconfig_base64
    ));
    run(node, &user, 1, false, "Failed to sync kube config").await?;
    Ok(())
}

async fn remove_master_taint(node: &dyn NodeExecutor) -> Result<()> {
    let taint = sudo(&format!(
        "{} taint nodes {} node-role.kubernetes.io/master=:NoSchedule-",
        KUBECTL_BIN,
        node.host().name
    ));
    run(node, &taint, 5, false, "Failed to remove master taint").await?;
    Ok(())
}

async fn label_worker(node: &dyn NodeExecutor) {
    let label = sudo(&format!(
        "{} label --overwrite node {} node-role.kubernetes.io/worker=",
        KUBECTL_BIN,
        node.host().name
    ));
    if run(node, &label, 5, true, "Failed to add worker label").await.is_err() {
        tracing::warn!("[Bootstrap] Continuing without worker label on {}", node.host().name);
    }
}

async fn run(
    node: &dyn NodeExecutor,
    command: &str,
    retries: u32,
    tolerate_failure: bool,
    context: &str,
) -> Result<String> {
    node.execute(command, retries, tolerate_failure)
        .await
        .map_err(|e| BootstrapError::remote(context, node.host().name.as_str(), e))
}
