use binaries::Arch;
use cluster::kubeadm_config::{render, resolve, validate};
use cluster::{BootstrapError, HostNode, KubernetesConfig, TemplateRenderer};

fn hosts() -> Vec<HostNode> {
    let mut first = HostNode::new("node1", "192.168.0.2", Arch::Amd64).master(0);
    first.internal_address = "10.0.0.2".to_string();
    vec![
        first,
        HostNode::new("node2", "10.0.0.3", Arch::Amd64).master(1),
        HostNode::new("node3", "10.0.0.4", Arch::Arm64).worker(),
    ]
}

#[test]
fn test_embedded_template_is_loaded() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    assert_eq!(renderer.list_templates(), vec!["kubeadm-config.yaml.j2"]);
}

#[test]
fn test_rendered_config_targets_first_master() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let hosts = hosts();
    let refs: Vec<&HostNode> = hosts.iter().collect();

    let rendered = render(
        &renderer,
        &KubernetesConfig::default(),
        "v1.19.8",
        &refs,
        &hosts[0],
    )
    .unwrap();

    let docs: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&rendered)
        .map(|doc| serde::Deserialize::deserialize(doc).unwrap())
        .collect();
    assert_eq!(docs.len(), 3);

    let cluster = &docs[0];
    assert_eq!(cluster["kind"], "ClusterConfiguration");
    assert_eq!(cluster["kubernetesVersion"], "v1.19.8");
    assert_eq!(cluster["controlPlaneEndpoint"], "10.0.0.2:6443");
    assert_eq!(cluster["networking"]["podSubnet"], "10.233.64.0/18");
    assert_eq!(cluster["networking"]["serviceSubnet"], "10.233.0.0/18");

    let sans: Vec<&str> = cluster["apiServer"]["certSANs"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    for expected in ["node1", "10.0.0.2", "192.168.0.2", "node2", "10.0.0.3", "localhost", "127.0.0.1"] {
        assert!(sans.contains(&expected), "missing SAN {}", expected);
    }
    assert!(!sans.contains(&"node3"));

    let init = &docs[1];
    assert_eq!(init["kind"], "InitConfiguration");
    assert_eq!(init["localAPIEndpoint"]["advertiseAddress"], "10.0.0.2");
    assert_eq!(init["nodeRegistration"]["name"], "node1");
}

#[test]
fn test_custom_config_wins_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let custom = "apiVersion: kubeadm.k8s.io/v1beta2\nkind: ClusterConfiguration\n";
    std::fs::write(dir.path().join("kubeadm-config.yaml"), custom).unwrap();

    let renderer = TemplateRenderer::from_embedded().unwrap();
    let hosts = hosts();
    let refs: Vec<&HostNode> = hosts.iter().collect();

    let resolved = resolve(
        dir.path(),
        &renderer,
        &KubernetesConfig::default(),
        "v1.19.8",
        &refs,
        &hosts[0],
    )
    .unwrap();
    assert_eq!(resolved, custom);
}

#[test]
fn test_invalid_custom_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("kubeadm-config.yaml"), "kind: [unclosed").unwrap();

    let renderer = TemplateRenderer::from_embedded().unwrap();
    let hosts = hosts();
    let refs: Vec<&HostNode> = hosts.iter().collect();

    let err = resolve(
        dir.path(),
        &renderer,
        &KubernetesConfig::default(),
        "v1.19.8",
        &refs,
        &hosts[0],
    )
    .unwrap_err();
    assert!(matches!(err, BootstrapError::ConfigGeneration(_)));
}

#[test]
fn test_empty_document_is_rejected() {
    assert!(validate("").is_err());
    assert!(validate("a: 1\n---\nb: 2\n").is_ok());
}
