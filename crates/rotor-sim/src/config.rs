//! Fleet description files.
//!
//! ```toml
//! [rollout]
//! timeout = "10m"
//! min_age = "720h"
//!
//! [[nodes]]
//! name = "cp-1"
//! role = "control-plane"
//! age = "2000h"
//! etcd_leader = true
//!
//! [[nodes]]
//! name = "worker-a"
//! age = "900h"
//! template = "ubuntu-22.04"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use rotor_core::{parse_duration, ConfigError, ConfigResult, Machine, Node, NodeRole, RolloutConfig};

use crate::fleet::{SimFleet, DEFAULT_TEMPLATE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub rollout: RolloutConfig,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Readiness polls a new node stays `False`.
    pub boot_polls: Option<u32>,
    /// Readiness polls a rebooted node stays `False`.
    pub reboot_polls: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: NodeRole,
    pub age: String,
    pub template: Option<String>,
    #[serde(default)]
    pub etcd_leader: bool,
}

fn default_role() -> NodeRole {
    NodeRole::Worker
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Build the simulated fleet this file describes.
    pub fn build(&self) -> ConfigResult<SimFleet> {
        let mut fleet = SimFleet::new();
        if let Some(polls) = self.boot_polls {
            fleet = fleet.with_boot_polls(polls);
        }
        if let Some(polls) = self.reboot_polls {
            fleet = fleet.with_reboot_polls(polls);
        }

        for spec in &self.nodes {
            let age = parse_duration(&spec.age).ok_or_else(|| ConfigError::InvalidDuration {
                field: "age",
                value: spec.age.clone(),
            })?;
            let template = spec.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
            let machine = Machine::new(&spec.name, age, template);
            fleet = match spec.role {
                NodeRole::ControlPlane => fleet
                    .with_node(Node::control_plane(&spec.name), Some(machine))
                    .with_etcd_member(&spec.name, spec.etcd_leader),
                NodeRole::Worker => fleet.with_node(Node::new(&spec.name), Some(machine)),
            };
        }
        Ok(fleet)
    }
}
