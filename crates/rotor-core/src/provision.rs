//! Machine provisioner interface.

use async_trait::async_trait;

use crate::types::Machine;

/// Creates and destroys the compute instances backing cluster nodes.
#[async_trait]
pub trait MachineProvisioner: Send + Sync {
    /// Resolve the machine backing `node`. Errors if none exists.
    async fn get_machine(&self, node: &str) -> anyhow::Result<Machine>;

    /// Provision a new control-plane node that joins the existing cluster.
    async fn create_control_plane_node(&self) -> anyhow::Result<Machine>;

    /// Provision a new worker. `template` overrides the default image.
    async fn create_worker_node(&self, template: Option<&str>) -> anyhow::Result<Machine>;

    /// Destroy a machine.
    async fn terminate(&self, machine: &Machine) -> anyhow::Result<()>;
}
