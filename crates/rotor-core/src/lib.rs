//! rotor-core: shared model and interfaces for the Rotor node-rotation engine.
//!
//! Rotor replaces or restarts the machines underneath a running cluster one
//! node at a time. This crate holds everything the engine and its
//! collaborators agree on:
//!
//! - **`types`**: Node, Machine, and etcd member records
//! - **`cluster`**: scheduler API and the orchestrator's own cluster connection
//! - **`provision`**: machine provisioner (create / terminate instances)
//! - **`etcd`**: consensus client factory and member operations
//! - **`directory`**: control-plane service registry
//! - **`poll`**: bounded-timeout polling primitive
//! - **`config`**: `RollingOptions` and the `[rollout]` TOML table

pub mod cluster;
pub mod config;
pub mod directory;
pub mod error;
pub mod etcd;
pub mod poll;
pub mod provision;
pub mod types;

pub use cluster::{ClusterApi, ClusterConnection};
pub use config::{parse_duration, RollingOptions, RolloutConfig};
pub use directory::FleetDirectory;
pub use error::{ConfigError, ConfigResult};
pub use etcd::{EtcdClient, EtcdClientFactory};
pub use poll::{do_until, Poller, DEFAULT_POLL_INTERVAL};
pub use provision::MachineProvisioner;
pub use types::*;
