//! rotor-rollout: replace or restart cluster nodes without losing quorum.
//!
//! Nodes are processed strictly one at a time. Each node's pipeline is
//! gated by cluster health: a snapshot is taken before the node is
//! touched, and the next node is only started once health is back to
//! where it was.
//!
//! # Components
//!
//! - **`ordering`**: pair nodes with their machines, oldest first
//! - **`handoff`**: etcd leadership transfer and member removal for control-plane nodes
//! - **`lifecycle`**: replace (cordon, provision, wait, terminate) and restart (drain, reboot, wait, uncordon)
//! - **`controller`**: the rolling update / rolling restart loops and the dry-run plan
//! - **`report`**: what a rollout did

pub mod controller;
pub mod error;
pub mod handoff;
pub mod lifecycle;
pub mod ordering;
pub mod report;

pub use controller::{Collaborators, RolloutController};
pub use error::{HandoffStep, RolloutError, RolloutResult};
pub use handoff::ConsensusHandoff;
pub use lifecycle::{wait_for_readiness, Lifecycle, REBOOT_COMMAND};
pub use ordering::{pair_nodes, restart_order, NodeMachine};
pub use report::{PlanAction, PlanStep, Replacement, Restart, RestartReport, UpdatePlan, UpdateReport};
