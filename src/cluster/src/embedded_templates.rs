//! Embedded bootstrap templates - compiled into the binary so the installer is self-contained.

/// kubeadm init configuration
pub const KUBEADM_CONFIG: &str = include_str!("templates/kubeadm-config.yaml.j2");

/// All embedded templates as (name, content) pairs for registration with Tera.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[("kubeadm-config.yaml.j2", KUBEADM_CONFIG)];
