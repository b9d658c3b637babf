use cluster::{ClusterStatusStore, JoinArtifacts};
use std::sync::Arc;

#[test]
fn test_exists_flips_once() {
    let store = ClusterStatusStore::new();
    assert!(!store.exists());

    assert!(store.mark_exists());
    assert!(!store.mark_exists());
    assert!(store.exists());
}

#[test]
fn test_join_artifacts_absent_until_published() {
    let store = ClusterStatusStore::new();
    assert!(store.join_artifacts().is_none());
    assert!(store.snapshot().join.is_none());
}

#[test]
fn test_published_snapshot_is_shared() {
    let store = ClusterStatusStore::new();
    let published = store.publish_join_artifacts(JoinArtifacts {
        worker_join_command: "/usr/local/bin/kubeadm join 10.0.0.1:6443".to_string(),
        known_node_names: ["node1".to_string()].into_iter().collect(),
        ..JoinArtifacts::default()
    });

    let read = store.join_artifacts().unwrap();
    assert!(Arc::ptr_eq(&published, &read));
    assert!(read.is_known("node1"));
    assert!(!read.is_known("node2"));
}

#[tokio::test]
async fn test_concurrent_readers_see_same_snapshot() {
    let store = Arc::new(ClusterStatusStore::new());
    store.set_version("v1.19.8");
    let published = store.publish_join_artifacts(JoinArtifacts::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.join_artifacts() })
        })
        .collect();

    for handle in handles {
        let seen = handle.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&seen, &published));
    }
    assert_eq!(store.snapshot().version, "v1.19.8");
}
