//! Scheduler API and the orchestrator's own cluster connection.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{Node, Readiness};

/// Node-level operations against the cluster scheduler.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List every node currently registered with the scheduler.
    async fn list_nodes(&self) -> anyhow::Result<Vec<Node>>;

    /// Mark a node unschedulable.
    async fn cordon(&self, node: &str) -> anyhow::Result<()>;

    /// Mark a node schedulable again.
    async fn uncordon(&self, node: &str) -> anyhow::Result<()>;

    /// Cordon a node and evict its workloads, bounded by `timeout`.
    async fn drain(&self, node: &str, timeout: Duration) -> anyhow::Result<()>;

    /// Current value of the node's `Ready` condition.
    async fn readiness(&self, node: &str) -> anyhow::Result<Readiness>;

    /// Run a shell command on the node and return its output.
    async fn execute(&self, node: &str, timeout: Duration, command: &str)
        -> anyhow::Result<String>;
}

/// The orchestrator's cached connection to the cluster control plane.
///
/// Exclusively owned by the rollout controller. It is only reset during a
/// consensus hand-off, after the control-plane member it may have been
/// connected through is removed.
#[async_trait]
pub trait ClusterConnection: Send + Sync {
    /// Drop the cached connection so the next call re-resolves an endpoint.
    fn reset(&mut self);

    /// Probe the (possibly new) connection.
    async fn is_healthy(&self) -> bool;
}
