//! Service registry used for control-plane discovery.

use async_trait::async_trait;

/// Directory of control-plane endpoints (e.g. a consul catalog).
#[async_trait]
pub trait FleetDirectory: Send + Sync {
    /// Deregister `node` so clients stop being routed to it.
    async fn remove_member(&self, node: &str) -> anyhow::Result<()>;
}
