/// Node task dispatcher: runs one task per selected node with bounded concurrency
use crate::error::{BootstrapError, Result};
use crate::executor::NodeExecutor;
use crate::node::HostNode;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;

/// Node selection for a dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFilter {
    All,
    Masters,
    /// Masters and workers
    K8sNodes,
}

impl NodeFilter {
    pub fn matches(&self, host: &HostNode) -> bool {
        match self {
            NodeFilter::All => true,
            NodeFilter::Masters => host.is_master,
            NodeFilter::K8sNodes => host.is_k8s_node(),
        }
    }
}

pub struct NodeDispatcher {
    executors: Vec<Arc<dyn NodeExecutor>>,
    parallelism: usize,
}

impl NodeDispatcher {
    /// `parallelism` of 1 runs nodes sequentially in inventory order
    pub fn new(executors: Vec<Arc<dyn NodeExecutor>>, parallelism: usize) -> Self {
        Self {
            executors,
            parallelism: parallelism.max(1),
        }
    }

    pub fn hosts(&self) -> Vec<&HostNode> {
        self.executors.iter().map(|e| e.host()).collect()
    }

    pub fn first_master(&self) -> Option<Arc<dyn NodeExecutor>> {
        self.executors
            .iter()
            .find(|e| e.host().is_first_master())
            .cloned()
    }

    /// Run `task` on every node matching `filter`.
    ///
    /// Every selected node runs to completion. Without `tolerate_failure` the first
    /// failure (in inventory order) is returned; with it failures are only logged.
    pub async fn run_on_nodes<F, Fut>(
        &self,
        filter: NodeFilter,
        task: F,
        tolerate_failure: bool,
    ) -> Result<()>
    where
        F: Fn(Arc<dyn NodeExecutor>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let selected: Vec<(usize, Arc<dyn NodeExecutor>)> = self
            .executors
            .iter()
            .filter(|e| filter.matches(e.host()))
            .cloned()
            .enumerate()
            .collect();

        tracing::debug!(
            "[Dispatcher] Running task on {} nodes ({:?}, parallelism {})",
            selected.len(),
            filter,
            self.parallelism
        );

        let mut results: Vec<(usize, String, Result<()>)> =
            futures::stream::iter(selected.into_iter().map(|(order, executor)| {
                let name = executor.host().name.clone();
                let fut = task(executor);
                async move { (order, name, fut.await) }
            }))
            .buffer_unordered(self.parallelism)
            .collect()
            .await;
        results.sort_by_key(|(order, _, _)| *order);

        let mut first_error = None;
        for (_, host, result) in results {
            if let Err(e) = result {
                if tolerate_failure {
                    tracing::warn!("[Dispatcher] Ignoring failure on {}: {}", host, e);
                } else {
                    tracing::error!("[Dispatcher] Task failed on {}: {}", host, e);
                    if first_error.is_none() {
                        first_error = Some(BootstrapError::Node {
                            host,
                            source: Box::new(e),
                        });
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
