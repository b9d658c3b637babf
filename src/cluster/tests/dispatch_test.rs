//! Tests for the node dispatcher and the executor retry contract

use async_trait::async_trait;
use binaries::Arch;
use cluster::{
    BootstrapError, ExecError, HostNode, NodeDispatcher, NodeExecutor, NodeFilter,
    RemoteCommandResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fails the first `failures` runs, then echoes the command
struct FlakyNode {
    host: HostNode,
    failures: usize,
    runs: AtomicUsize,
}

impl FlakyNode {
    fn new(host: HostNode, failures: usize) -> Self {
        Self {
            host,
            failures,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NodeExecutor for FlakyNode {
    fn host(&self) -> &HostNode {
        &self.host
    }

    async fn run(&self, command: &str) -> Result<RemoteCommandResult, ExecError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        if run < self.failures {
            return Ok(RemoteCommandResult {
                output: String::new(),
                stderr: "boom".to_string(),
                exit_status: 2,
            });
        }
        Ok(RemoteCommandResult {
            output: format!("  {}\n", command),
            stderr: String::new(),
            exit_status: 0,
        })
    }
}

fn inventory() -> Vec<Arc<dyn NodeExecutor>> {
    vec![
        Arc::new(FlakyNode::new(
            HostNode::new("master1", "10.0.0.1", Arch::Amd64).master(0),
            0,
        )),
        Arc::new(FlakyNode::new(
            HostNode::new("master2", "10.0.0.2", Arch::Amd64).master(1),
            0,
        )),
        Arc::new(FlakyNode::new(
            HostNode::new("worker1", "10.0.0.3", Arch::Arm64).worker(),
            0,
        )),
        Arc::new(FlakyNode::new(
            HostNode::new("etcd1", "10.0.0.4", Arch::Amd64).etcd(),
            0,
        )),
    ]
}

#[tokio::test]
async fn test_execute_retries_then_returns_trimmed_output() {
    let node = FlakyNode::new(HostNode::new("n", "10.0.0.9", Arch::Amd64), 2);

    let output = node.execute("hostname", 2, false).await.unwrap();

    assert_eq!(output, "hostname");
    assert_eq!(node.runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_execute_returns_last_failure() {
    let node = FlakyNode::new(HostNode::new("n", "10.0.0.9", Arch::Amd64), 10);

    let err = node.execute("hostname", 1, true).await.unwrap_err();

    assert!(matches!(err, ExecError::NonZeroExit { status: 2, ref output } if output == "boom"));
    assert_eq!(node.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_filters_select_roles() {
    for (filter, expected) in [
        (NodeFilter::All, vec!["master1", "master2", "worker1", "etcd1"]),
        (NodeFilter::Masters, vec!["master1", "master2"]),
        (NodeFilter::K8sNodes, vec!["master1", "master2", "worker1"]),
    ] {
        let dispatcher = NodeDispatcher::new(inventory(), 2);
        let seen = Mutex::new(Vec::new());
        let seen_ref = &seen;

        dispatcher
            .run_on_nodes(
                filter,
                |node| async move {
                    seen_ref.lock().unwrap().push(node.host().name.clone());
                    Ok(())
                },
                false,
            )
            .await
            .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        let mut expected: Vec<String> = expected.into_iter().map(String::from).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }
}

#[tokio::test]
async fn test_failure_is_wrapped_with_host() {
    let dispatcher = NodeDispatcher::new(inventory(), 4);

    let err = dispatcher
        .run_on_nodes(
            NodeFilter::All,
            |node| async move {
                if node.host().name == "worker1" {
                    Err(BootstrapError::Protocol("join failed".to_string()))
                } else {
                    Ok(())
                }
            },
            false,
        )
        .await
        .unwrap_err();

    match err {
        BootstrapError::Node { host, source } => {
            assert_eq!(host, "worker1");
            assert!(matches!(*source, BootstrapError::Protocol(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_tolerated_failures_do_not_abort() {
    let dispatcher = NodeDispatcher::new(inventory(), 1);
    let completed = AtomicUsize::new(0);
    let completed_ref = &completed;

    dispatcher
        .run_on_nodes(
            NodeFilter::All,
            |node| async move {
                completed_ref.fetch_add(1, Ordering::SeqCst);
                if node.host().is_master {
                    Err(BootstrapError::Protocol("label failed".to_string()))
                } else {
                    Ok(())
                }
            },
            true,
        )
        .await
        .unwrap();

    assert_eq!(completed.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_first_master_lookup() {
    let dispatcher = NodeDispatcher::new(inventory(), 0);
    assert_eq!(dispatcher.first_master().unwrap().host().name, "master1");
    assert_eq!(dispatcher.hosts().len(), 4);
}
