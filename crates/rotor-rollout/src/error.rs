//! Rollout error types.
//!
//! Every variant aborts the whole rollout. Non-fatal failures (old machine
//! termination, reboot command errors, forced drains) are logged instead
//! and never surface here.

use std::fmt;

use thiserror::Error;

use rotor_core::{NodeRole, Readiness};
use rotor_health::HealthSnapshot;

pub type RolloutResult<T> = Result<T, RolloutError>;

/// Step of the consensus hand-off that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffStep {
    ConnectMember,
    ListMembers,
    NoTransferCandidate,
    MoveLeader,
    ConnectLeader,
    RemoveMember,
    Deregister,
    Reconnect,
}

impl fmt::Display for HandoffStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandoffStep::ConnectMember => "connect to member",
            HandoffStep::ListMembers => "list members",
            HandoffStep::NoTransferCandidate => "pick next leader",
            HandoffStep::MoveLeader => "move leader",
            HandoffStep::ConnectLeader => "connect to leader",
            HandoffStep::RemoveMember => "remove member",
            HandoffStep::Deregister => "deregister from directory",
            HandoffStep::Reconnect => "reconnect to control plane",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("failed to list nodes: {0}")]
    ListNodes(#[source] anyhow::Error),

    #[error("failed to resolve machine for {node}: {source}")]
    MachineLookup {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("etcd hand-off for {node} failed to {step}: {source}")]
    Handoff {
        node: String,
        step: HandoffStep,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to cordon {node}: {source}")]
    Cordon {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create new {role} to replace {node}: {source}")]
    Provision {
        node: String,
        role: NodeRole,
        #[source]
        source: anyhow::Error,
    },

    #[error("replacement {replacement} for {node} did not come up healthy: {}", describe(.status))]
    ReplacementNotReady {
        node: String,
        replacement: String,
        status: Option<Readiness>,
    },

    #[error("failed to drain {node}: {source}")]
    Drain {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to restart node {node}, shutdown not detected: {}", describe(.status))]
    ShutdownNotDetected {
        node: String,
        status: Option<Readiness>,
    },

    #[error("{node} did not come back up: {}", describe(.status))]
    NotRecovered {
        node: String,
        status: Option<Readiness>,
    },

    #[error("failed to uncordon {node}: {source}")]
    Uncordon {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cluster is not healthy, aborting rollout after {rolled} of {total} ({health})")]
    HealthDegraded {
        rolled: u32,
        total: usize,
        health: HealthSnapshot,
    },

    /// A per-node failure during a rolling update, with the progress made
    /// before it.
    #[error("rolling update aborted after {rolled} of {total}: {source}")]
    Interrupted {
        rolled: u32,
        total: usize,
        #[source]
        source: Box<RolloutError>,
    },
}

impl RolloutError {
    /// The node being processed when the rollout stopped, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            RolloutError::ListNodes(_) | RolloutError::HealthDegraded { .. } => None,
            RolloutError::MachineLookup { node, .. }
            | RolloutError::Handoff { node, .. }
            | RolloutError::Cordon { node, .. }
            | RolloutError::Provision { node, .. }
            | RolloutError::ReplacementNotReady { node, .. }
            | RolloutError::Drain { node, .. }
            | RolloutError::ShutdownNotDetected { node, .. }
            | RolloutError::NotRecovered { node, .. }
            | RolloutError::Uncordon { node, .. } => Some(node),
            RolloutError::Interrupted { source, .. } => source.node(),
        }
    }

    /// The underlying failure, without any progress wrapper.
    pub fn root(&self) -> &RolloutError {
        match self {
            RolloutError::Interrupted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Nodes replaced before the rollout stopped, where that is known.
    pub fn rolled(&self) -> Option<u32> {
        match self {
            RolloutError::Interrupted { rolled, .. }
            | RolloutError::HealthDegraded { rolled, .. } => Some(*rolled),
            _ => None,
        }
    }
}

/// Wrap a per-node update failure with the progress made so far.
pub(crate) fn interrupted(rolled: u32, total: usize) -> impl FnOnce(RolloutError) -> RolloutError {
    move |source| RolloutError::Interrupted {
        rolled,
        total,
        source: Box::new(source),
    }
}

/// Render the last observed readiness, which may be missing if the node
/// could never be queried.
pub(crate) fn describe(status: &Option<Readiness>) -> String {
    match status {
        Some(r) => r.to_string(),
        None => "status unavailable".to_string(),
    }
}
