//! Consensus store (etcd) client interfaces.

use async_trait::async_trait;

use crate::types::{EtcdMember, MemberId, Node};

/// A client connected to one etcd member.
#[async_trait]
pub trait EtcdClient: Send + Sync {
    /// Whether the member this client is connected to is the leader.
    fn is_leader(&self) -> bool;

    /// ID of the member this client is connected to.
    fn member_id(&self) -> MemberId;

    /// Name of the member this client is connected to.
    fn name(&self) -> &str;

    /// All members of the cluster.
    async fn members(&self) -> anyhow::Result<Vec<EtcdMember>>;

    /// Transfer leadership to `target`. Only valid on the current leader.
    async fn move_leader(&self, target: MemberId) -> anyhow::Result<()>;

    /// Remove `member` from the cluster.
    async fn remove_member(&self, member: MemberId) -> anyhow::Result<()>;
}

/// Builds clients scoped to a specific member.
#[async_trait]
pub trait EtcdClientFactory: Send + Sync {
    /// Client connected to the etcd member running on `node`.
    async fn client_for_node(&self, node: &str) -> anyhow::Result<Box<dyn EtcdClient>>;

    /// Client connected to whichever member is leader right now.
    async fn client_for_leader(&self, nodes: &[Node]) -> anyhow::Result<Box<dyn EtcdClient>>;
}
