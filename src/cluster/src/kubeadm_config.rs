/// kubeadm configuration document for control-plane initialization
///
/// An operator-supplied `<work_dir>/kubeadm-config.yaml` wins over the embedded
/// template. Either way the document must parse as YAML before it is uploaded.
use crate::config::KubernetesConfig;
use crate::error::{BootstrapError, Result};
use crate::kubeconfig::API_SERVER_PORT;
use crate::node::HostNode;
use crate::template_renderer::TemplateRenderer;
use serde::Deserialize;
use std::path::Path;
use tera::Context;

/// Custom configuration file looked up in the work directory
pub const CUSTOM_CONFIG_FILE: &str = "kubeadm-config.yaml";

const TEMPLATE_NAME: &str = "kubeadm-config.yaml.j2";

/// Render the embedded template for `node`, the first control-plane node
pub fn render(
    renderer: &TemplateRenderer,
    kubernetes: &KubernetesConfig,
    kube_version: &str,
    hosts: &[&HostNode],
    node: &HostNode,
) -> Result<String> {
    let mut cert_sans: Vec<String> = vec![
        "kubernetes".to_string(),
        "kubernetes.default".to_string(),
        "kubernetes.default.svc".to_string(),
        format!("kubernetes.default.svc.{}", kubernetes.dns_domain),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ];
    for master in hosts.iter().filter(|h| h.is_master) {
        for san in [&master.name, &master.internal_address, &master.address] {
            if !cert_sans.contains(san) {
                cert_sans.push(san.clone());
            }
        }
    }

    let mut context = Context::new();
    context.insert("cluster_name", &kubernetes.cluster_name);
    context.insert("kube_version", kube_version);
    context.insert("image_repository", &kubernetes.image_repository);
    context.insert(
        "control_plane_endpoint",
        &format!("{}:{}", node.internal_address, API_SERVER_PORT),
    );
    context.insert("dns_domain", &kubernetes.dns_domain);
    context.insert("pod_cidr", &kubernetes.pod_cidr);
    context.insert("service_cidr", &kubernetes.service_cidr);
    context.insert("cert_sans", &cert_sans);
    context.insert("advertise_address", &node.internal_address);
    context.insert("api_server_port", &API_SERVER_PORT);
    context.insert("node_name", &node.name);

    let rendered = renderer.render_with_context(TEMPLATE_NAME, &context)?;
    validate(&rendered)?;
    Ok(rendered)
}

/// Every document in the stream must be valid YAML, and there must be at least one
pub fn validate(document: &str) -> Result<()> {
    let mut count = 0;
    for doc in serde_yaml::Deserializer::from_str(document) {
        serde_yaml::Value::deserialize(doc)
            .map_err(|e| BootstrapError::ConfigGeneration(format!("invalid YAML: {}", e)))?;
        count += 1;
    }

    if count == 0 {
        return Err(BootstrapError::ConfigGeneration(
            "kubeadm config is empty".to_string(),
        ));
    }
    Ok(())
}

/// Custom file from `work_dir` if present, otherwise the rendered template
pub fn resolve(
    work_dir: &Path,
    renderer: &TemplateRenderer,
    kubernetes: &KubernetesConfig,
    kube_version: &str,
    hosts: &[&HostNode],
    node: &HostNode,
) -> Result<String> {
    let custom = work_dir.join(CUSTOM_CONFIG_FILE);
    if custom.exists() {
        let content = std::fs::read_to_string(&custom).map_err(|e| {
            BootstrapError::filesystem(
                format!("Failed to read custom kubeadm config: {}", custom.display()),
                e,
            )
        })?;
        validate(&content)?;
        tracing::info!("[KubeadmConfig] Using custom config {}", custom.display());
        return Ok(content);
    }

    render(renderer, kubernetes, kube_version, hosts, node)
}
