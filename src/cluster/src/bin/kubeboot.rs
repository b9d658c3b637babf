//! kubeboot: provision Kubernetes binaries and bootstrap a kubeadm cluster over SSH.

use anyhow::Context;
use clap::Parser;
use cluster::{Installer, InstallerConfig};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kubeboot", version, about = "Bootstrap a kubeadm cluster from bare hosts")]
struct Args {
    #[arg(short = 'f', long = "config", help = "Installer config (default: search for kubeboot.toml)")]
    config: Option<PathBuf>,

    #[arg(long = "work-dir", help = "Overrides work_dir from the config file")]
    work_dir: Option<PathBuf>,

    #[arg(long = "skip-download", help = "Use binaries already in the download cache")]
    skip_download: bool,
}

fn main() {
    // Default to info level if RUST_LOG not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();

    let result: anyhow::Result<()> = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")
        .and_then(|rt| rt.block_on(run(args)));

    if let Err(e) = result {
        tracing::error!("kubeboot failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => InstallerConfig::from_file(path)?,
        None => InstallerConfig::load(args.work_dir.as_deref().unwrap_or(Path::new(".")))?,
    };
    if let Some(work_dir) = args.work_dir {
        config.work_dir = work_dir;
    }

    let installer = Installer::new(config).context("Invalid inventory")?;
    info!(
        "Installing Kubernetes {} on {} hosts",
        installer.config().kube_version(),
        installer.inventory().nodes().len()
    );

    let report = installer.run(args.skip_download).await?;
    info!("Control-plane version: {}", report.version);
    for (name, outcome) in &report.nodes {
        info!("  {}: {:?}", name, outcome);
    }
    info!(
        "Admin kubeconfig written to {}",
        installer.config().work_dir.join("config").display()
    );
    Ok(())
}
