//! Consensus hand-off for control-plane nodes.
//!
//! Before a control-plane node is cordoned, it has to leave etcd cleanly.
//! The steps run in strict order and any failure aborts the rollout:
//!
//! 1. connect to the etcd member on the node
//! 2. if it is the leader, move leadership to the first other member
//! 3. connect to the (possibly new) leader and remove the node's member
//! 4. deregister the node from the control-plane directory
//! 5. reset the orchestrator's connection and wait for it to be healthy

use std::time::Duration;

use anyhow::anyhow;
use tracing::info;

use rotor_core::{
    ClusterConnection, EtcdClientFactory, EtcdMember, FleetDirectory, MemberId, Node, Poller,
};

use crate::error::{HandoffStep, RolloutError, RolloutResult};

pub struct ConsensusHandoff<'a> {
    etcd: &'a dyn EtcdClientFactory,
    directory: &'a dyn FleetDirectory,
    poller: Poller,
    timeout: Duration,
}

impl<'a> ConsensusHandoff<'a> {
    pub fn new(
        etcd: &'a dyn EtcdClientFactory,
        directory: &'a dyn FleetDirectory,
        poller: Poller,
        timeout: Duration,
    ) -> Self {
        Self {
            etcd,
            directory,
            poller,
            timeout,
        }
    }

    /// Take `node` out of etcd and the directory, then re-establish
    /// `connection`. `nodes` is the node list the rollout started from.
    pub async fn run(
        &self,
        connection: &mut dyn ClusterConnection,
        node: &Node,
        nodes: &[Node],
    ) -> RolloutResult<()> {
        let fail = |step: HandoffStep| {
            let node = node.name.clone();
            move |source: anyhow::Error| RolloutError::Handoff { node, step, source }
        };

        let client = self
            .etcd
            .client_for_node(&node.name)
            .await
            .map_err(fail(HandoffStep::ConnectMember))?;

        if client.is_leader() {
            let members = client
                .members()
                .await
                .map_err(fail(HandoffStep::ListMembers))?;
            let next = next_leader(&members, client.member_id()).ok_or_else(|| {
                fail(HandoffStep::NoTransferCandidate)(anyhow!(
                    "{} is the only etcd member",
                    client.name()
                ))
            })?;
            info!(from = client.name(), to = %next.name, "moving etcd leader");
            client
                .move_leader(next.id)
                .await
                .map_err(fail(HandoffStep::MoveLeader))?;
        }

        let leader = self
            .etcd
            .client_for_leader(nodes)
            .await
            .map_err(fail(HandoffStep::ConnectLeader))?;

        info!(node = %node.name, member = client.member_id(), "removing etcd member");
        leader
            .remove_member(client.member_id())
            .await
            .map_err(fail(HandoffStep::RemoveMember))?;

        // Deregister before reconnecting so the new connection cannot
        // resolve to the removed member.
        self.directory
            .remove_member(&node.name)
            .await
            .map_err(fail(HandoffStep::Deregister))?;

        connection.reset();
        let conn: &dyn ClusterConnection = connection;
        if !self
            .poller
            .until(self.timeout, move || conn.is_healthy())
            .await
        {
            return Err(fail(HandoffStep::Reconnect)(anyhow!(
                "control plane connection not healthy after {:?}",
                self.timeout
            )));
        }
        info!(node = %node.name, "control plane connection re-established");
        Ok(())
    }
}

/// The first member that is not `current`.
fn next_leader(members: &[EtcdMember], current: MemberId) -> Option<&EtcdMember> {
    members.iter().find(|m| m.id != current)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rotor_sim::{Call, SimFleet};

    use super::*;

    fn day() -> Duration {
        Duration::from_secs(24 * 3600)
    }

    fn three_masters(leader: &str) -> SimFleet {
        SimFleet::new()
            .with_control_plane("cp1", day(), leader == "cp1")
            .with_control_plane("cp2", day(), leader == "cp2")
            .with_control_plane("cp3", day(), leader == "cp3")
    }

    async fn run(fleet: &SimFleet, node: &str) -> RolloutResult<()> {
        let handoff = ConsensusHandoff::new(fleet, fleet, Poller::new(), Duration::from_secs(60));
        let mut conn = fleet.connection();
        let nodes = fleet.nodes();
        let target = fleet.node(node).unwrap();
        handoff.run(&mut conn, &target, &nodes).await
    }

    #[tokio::test(start_paused = true)]
    async fn leader_transfers_before_removal() {
        let fleet = three_masters("cp1");
        run(&fleet, "cp1").await.unwrap();

        assert_eq!(
            fleet.journal(),
            vec![
                Call::MoveLeader {
                    from: "cp1".into(),
                    to: "cp2".into()
                },
                Call::RemoveMember("cp1".into()),
                Call::Deregister("cp1".into()),
                Call::ResetConnection,
            ]
        );
        assert_eq!(fleet.leader().as_deref(), Some("cp2"));
        assert!(fleet.members().iter().all(|m| m.name != "cp1"));
        assert_eq!(fleet.registry(), vec!["cp2".to_string(), "cp3".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn follower_is_removed_without_transfer() {
        let fleet = three_masters("cp2");
        run(&fleet, "cp3").await.unwrap();

        let journal = fleet.journal();
        assert!(!journal.iter().any(|c| matches!(c, Call::MoveLeader { .. })));
        assert_eq!(journal[0], Call::RemoveMember("cp3".into()));
        assert_eq!(fleet.leader().as_deref(), Some("cp2"));
    }

    #[tokio::test(start_paused = true)]
    async fn sole_member_cannot_hand_off() {
        let fleet = SimFleet::new().with_control_plane("cp1", day(), true);
        let err = run(&fleet, "cp1").await.unwrap_err();
        assert!(matches!(
            err,
            RolloutError::Handoff {
                step: HandoffStep::NoTransferCandidate,
                ..
            }
        ));
        assert!(fleet.journal().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deregister_failure_stops_before_reconnect() {
        let fleet = three_masters("cp1").with_faults(|f| f.deregister = true);
        let err = run(&fleet, "cp2").await.unwrap_err();
        assert!(matches!(
            err,
            RolloutError::Handoff {
                step: HandoffStep::Deregister,
                ..
            }
        ));
        assert!(!fleet.journal().contains(&Call::ResetConnection));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_connection_to_recover() {
        let fleet = three_masters("cp1").with_unhealthy_connection_polls(3);
        run(&fleet, "cp2").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_timeout_is_fatal() {
        let fleet = three_masters("cp1").with_faults(|f| f.connection_never_healthy = true);
        let err = run(&fleet, "cp2").await.unwrap_err();
        assert!(matches!(
            err,
            RolloutError::Handoff {
                step: HandoffStep::Reconnect,
                ..
            }
        ));
    }

    fn failed_step(result: RolloutResult<()>) -> HandoffStep {
        match result {
            Err(RolloutError::Handoff { step, .. }) => step,
            other => panic!("expected hand-off error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_member_fails_before_any_change() {
        let fleet = three_masters("cp1").with_faults(|f| {
            f.etcd_unreachable.insert("cp2".into());
        });
        let step = failed_step(run(&fleet, "cp2").await);
        assert_eq!(step, HandoffStep::ConnectMember);
        assert!(fleet.journal().is_empty());
        assert_eq!(fleet.members().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn member_list_failure_stops_transfer() {
        let fleet = three_masters("cp1").with_faults(|f| f.list_members = true);
        let step = failed_step(run(&fleet, "cp1").await);
        assert_eq!(step, HandoffStep::ListMembers);
        assert!(fleet.journal().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transfer_keeps_leader_member() {
        let fleet = three_masters("cp1").with_faults(|f| f.move_leader = true);
        let step = failed_step(run(&fleet, "cp1").await);
        assert_eq!(step, HandoffStep::MoveLeader);
        assert!(fleet.journal().is_empty());
        assert_eq!(fleet.leader().as_deref(), Some("cp1"));
        assert!(fleet.members().iter().any(|m| m.name == "cp1"));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_leader_fails_before_removal() {
        let fleet = three_masters("cp1").with_faults(|f| f.leader_unreachable = true);
        let step = failed_step(run(&fleet, "cp3").await);
        assert_eq!(step, HandoffStep::ConnectLeader);
        assert!(fleet.journal().is_empty());
        assert_eq!(fleet.registry().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_removal_stops_before_deregister() {
        let fleet = three_masters("cp1").with_faults(|f| f.remove_member = true);
        let step = failed_step(run(&fleet, "cp1").await);
        assert_eq!(step, HandoffStep::RemoveMember);

        // Leadership already moved; nothing after the removal ran.
        assert_eq!(
            fleet.journal(),
            vec![Call::MoveLeader {
                from: "cp1".into(),
                to: "cp2".into()
            }]
        );
        assert!(fleet.members().iter().any(|m| m.name == "cp1"));
        assert!(fleet.registry().contains(&"cp1".to_string()));
    }

    #[test]
    fn next_leader_is_first_other_member() {
        let members = vec![
            EtcdMember { id: 7, name: "a".into(), is_leader: true },
            EtcdMember { id: 3, name: "b".into(), is_leader: false },
            EtcdMember { id: 9, name: "c".into(), is_leader: false },
        ];
        assert_eq!(next_leader(&members, 7).unwrap().name, "b");
        assert_eq!(next_leader(&members, 3).unwrap().name, "a");
        assert!(next_leader(&members[..1], 7).is_none());
    }
}
