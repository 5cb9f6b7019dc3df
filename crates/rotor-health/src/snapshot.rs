//! Point-in-time cluster health.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Aggregate health of the whole cluster at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub ready_nodes: u32,
    pub unready_nodes: u32,
    pub running_pods: u32,
    pub pending_pods: u32,
    pub error_pods: u32,
    pub crash_looping_pods: u32,
}

impl HealthSnapshot {
    /// Pods that are not running: pending, failed, or crash-looping.
    pub fn non_ready_pods(&self) -> u32 {
        self.pending_pods
            .saturating_add(self.error_pods)
            .saturating_add(self.crash_looping_pods)
    }

    /// True if this snapshot is worse than `baseline`: more unready
    /// nodes or more non-ready pods.
    pub fn is_degraded_compared_to(&self, baseline: &HealthSnapshot) -> bool {
        self.unready_nodes > baseline.unready_nodes
            || self.non_ready_pods() > baseline.non_ready_pods()
    }
}

impl fmt::Display for HealthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes ready={} unready={}, pods running={} pending={} error={} crashloop={}",
            self.ready_nodes,
            self.unready_nodes,
            self.running_pods,
            self.pending_pods,
            self.error_pods,
            self.crash_looping_pods,
        )
    }
}

/// Source of health snapshots (pod and node status across the cluster).
#[async_trait]
pub trait HealthAggregator: Send + Sync {
    async fn snapshot(&self) -> HealthSnapshot;
}
