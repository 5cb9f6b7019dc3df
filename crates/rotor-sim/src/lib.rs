//! rotor-sim: an in-memory fleet for exercising rollouts.
//!
//! [`SimFleet`] implements every collaborator the rollout engine talks to:
//! the scheduler API, the machine provisioner, the etcd client factory, the
//! control-plane registry, the health aggregator, and the orchestrator's
//! cluster connection. Every mutating call is appended to a journal so
//! tests can assert on ordering, and most calls can be made to fail per
//! node.
//!
//! Fleets can be built in code or loaded from a TOML file
//! ([`FleetConfig`]), which is what the `rotor` CLI does.

pub mod config;
pub mod fleet;
pub mod journal;

pub use config::{FleetConfig, NodeSpec};
pub use fleet::{Faults, SimConnection, SimFleet};
pub use journal::Call;
