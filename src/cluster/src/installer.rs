/// Installer facade: configuration in, provisioned binaries and a bootstrapped cluster out
use crate::bootstrap::{BootstrapReport, ClusterBootstrap, DnsProvisioner};
use crate::config::InstallerConfig;
use crate::dispatch::NodeDispatcher;
use crate::error::Result;
use crate::executor::{NodeExecutor, SshExecutor};
use crate::node::Inventory;
use binaries::{BinaryArtifact, BinaryProvisioner, ChecksumTable, HttpFetcher, Region};
use std::sync::Arc;
use std::time::Duration;

/// Per-request timeout for binary downloads
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct Installer {
    config: InstallerConfig,
    inventory: Inventory,
    dns: Option<Arc<dyn DnsProvisioner>>,
}

impl Installer {
    pub fn new(config: InstallerConfig) -> Result<Self> {
        let inventory = Inventory::from_config(&config)?;
        Ok(Self {
            config,
            inventory,
            dns: None,
        })
    }

    /// Cluster DNS installer handed to every bootstrap this installer creates
    pub fn with_dns(mut self, dns: Arc<dyn DnsProvisioner>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Configured region wins over `KKZONE`
    pub fn region(&self) -> Region {
        match self.config.region.as_deref() {
            Some(region) => Region::from_hint(Some(region)),
            None => Region::from_env(),
        }
    }

    /// Built-in checksum table with the operator's table merged on top
    pub fn checksum_table(&self) -> Result<ChecksumTable> {
        let mut table = ChecksumTable::builtin()?;
        if let Some(path) = &self.config.checksum_file {
            table.merge(ChecksumTable::load(path)?);
            tracing::info!("[Installer] Merged checksum table {}", path.display());
        }
        Ok(table)
    }

    /// Download and verify binaries for every architecture in the inventory
    pub async fn download_binaries(&self) -> Result<Vec<BinaryArtifact>> {
        let fetcher = Arc::new(HttpFetcher::new(DOWNLOAD_TIMEOUT)?);
        let provisioner =
            BinaryProvisioner::new(self.config.work_dir.clone(), self.checksum_table()?, fetcher)
                .with_legacy_helm(self.config.needs_legacy_helm())
                .with_published_checksums(self.config.published_checksums);

        let artifacts = provisioner
            .provision(
                self.config.kube_version(),
                self.inventory.architectures(),
                self.region(),
            )
            .await?;
        Ok(artifacts)
    }

    /// One OpenSSH executor per host, honoring per-host user and port overrides
    pub fn ssh_dispatcher(&self) -> NodeDispatcher {
        let ssh = &self.config.ssh;
        let executors: Vec<Arc<dyn NodeExecutor>> = self
            .inventory
            .nodes()
            .iter()
            .map(|host| {
                Arc::new(SshExecutor::new(
                    host.clone(),
                    host.user.clone().unwrap_or_else(|| ssh.user.clone()),
                    host.port.unwrap_or(ssh.port),
                    ssh.private_key.clone(),
                    Duration::from_secs(ssh.command_timeout_secs),
                )) as Arc<dyn NodeExecutor>
            })
            .collect();
        NodeDispatcher::new(executors, self.config.parallelism)
    }

    pub fn bootstrap(&self, dispatcher: NodeDispatcher) -> Result<ClusterBootstrap> {
        let bootstrap = ClusterBootstrap::new(
            self.config.work_dir.clone(),
            self.config.kube_version(),
            self.config.kubernetes.clone(),
            dispatcher,
        )?;
        Ok(match &self.dns {
            Some(dns) => bootstrap.with_dns(dns.clone()),
            None => bootstrap,
        })
    }

    pub async fn run(&self, skip_download: bool) -> Result<BootstrapReport> {
        if skip_download {
            tracing::info!("[Installer] Skipping binary download");
        } else {
            let artifacts = self.download_binaries().await?;
            tracing::info!("[Installer] {} binaries ready", artifacts.len());
        }

        self.bootstrap(self.ssh_dispatcher())?.run().await
    }
}
