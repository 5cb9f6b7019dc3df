//! Domain types shared by the rollout engine and its collaborators.
//!
//! Nodes are what the scheduler observes; machines are what the
//! provisioner owns. Both are read-only snapshots taken when a rollout
//! starts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Unique name of a node (and of the machine backing it).
pub type NodeName = String;

/// Raft member ID inside the consensus store.
pub type MemberId = u64;

/// Legacy label marking a control-plane node.
pub const MASTER_ROLE_LABEL: &str = "node-role.kubernetes.io/master";

/// Current label marking a control-plane node.
pub const CONTROL_PLANE_ROLE_LABEL: &str = "node-role.kubernetes.io/control-plane";

// ── Node ───────────────────────────────────────────────────────────

/// Role of a node, derived from its labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::ControlPlane => f.pad("control-plane"),
            NodeRole::Worker => f.pad("worker"),
        }
    }
}

/// Tri-state value of a node's `Ready` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    True,
    False,
    Unknown,
}

impl Readiness {
    /// A node that is `False` or `Unknown` has gone down.
    pub fn is_down(self) -> bool {
        matches!(self, Readiness::False | Readiness::Unknown)
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::True => f.write_str("Ready=True"),
            Readiness::False => f.write_str("Ready=False"),
            Readiness::Unknown => f.write_str("Ready=Unknown"),
        }
    }
}

/// A cluster-observed compute unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: NodeName,
    pub labels: BTreeMap<String, String>,
    pub readiness: Readiness,
    /// True when cordoned.
    pub unschedulable: bool,
}

impl Node {
    /// A ready, schedulable node with no labels.
    pub fn new(name: impl Into<NodeName>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            readiness: Readiness::True,
            unschedulable: false,
        }
    }

    /// A ready node carrying the control-plane role label.
    pub fn control_plane(name: impl Into<NodeName>) -> Self {
        Self::new(name).with_label(CONTROL_PLANE_ROLE_LABEL, "")
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn role(&self) -> NodeRole {
        if self.labels.contains_key(MASTER_ROLE_LABEL)
            || self.labels.contains_key(CONTROL_PLANE_ROLE_LABEL)
        {
            NodeRole::ControlPlane
        } else {
            NodeRole::Worker
        }
    }

    pub fn is_control_plane(&self) -> bool {
        self.role() == NodeRole::ControlPlane
    }
}

// ── Machine ────────────────────────────────────────────────────────

/// The provisioner-side record backing a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    /// Same as the node name.
    pub name: NodeName,
    /// Time since the machine was created.
    pub age: Duration,
    /// Template (image) the machine was cloned from.
    pub template: String,
}

impl Machine {
    pub fn new(name: impl Into<NodeName>, age: Duration, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            template: template.into(),
        }
    }
}

// ── Etcd ───────────────────────────────────────────────────────────

/// A participant in the consensus store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcdMember {
    pub id: MemberId,
    pub name: String,
    pub is_leader: bool,
}
