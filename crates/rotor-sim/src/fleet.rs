//! The simulated fleet and its collaborator implementations.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tracing::debug;

use rotor_core::{
    ClusterApi, ClusterConnection, EtcdClient, EtcdClientFactory, EtcdMember, FleetDirectory,
    Machine, MachineProvisioner, MemberId, Node, Readiness,
};
use rotor_health::{HealthAggregator, HealthSnapshot};

use crate::journal::Call;

/// Pods each ready node contributes to the computed health snapshot.
const PODS_PER_NODE: u32 = 10;

/// Template recorded for machines that do not name one.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Injected failures. Sets are keyed by node name.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub list_nodes: bool,
    /// Nodes the provisioner has no machine for.
    pub missing_machines: BTreeSet<String>,
    pub cordon: BTreeSet<String>,
    pub uncordon: BTreeSet<String>,
    pub drain: BTreeSet<String>,
    /// The command errors, but a reboot is still scheduled.
    pub execute: BTreeSet<String>,
    pub terminate: BTreeSet<String>,
    /// Reboot commands have no effect; the node stays ready.
    pub never_shuts_down: BTreeSet<String>,
    /// The node goes down on reboot and never becomes ready again.
    pub never_comes_back: BTreeSet<String>,
    pub provision: bool,
    pub replacements_never_ready: bool,
    pub deregister: bool,
    pub connection_never_healthy: bool,
    /// Nodes whose etcd member cannot be reached directly.
    pub etcd_unreachable: BTreeSet<String>,
    pub list_members: bool,
    pub move_leader: bool,
    /// No client can be resolved for the current leader.
    pub leader_unreachable: bool,
    pub remove_member: bool,
}

struct SimNode {
    node: Node,
    /// Readiness values handed out by successive polls; the last one sticks.
    pending: VecDeque<Readiness>,
}

struct FleetState {
    nodes: BTreeMap<String, SimNode>,
    machines: BTreeMap<String, Machine>,
    members: Vec<EtcdMember>,
    registry: BTreeSet<String>,
    health: VecDeque<HealthSnapshot>,
    journal: Vec<Call>,
    faults: Faults,
    boot_polls: u32,
    reboot_polls: u32,
    replacements: u32,
    next_member_id: MemberId,
    unhealthy_connection_polls: u32,
    connection_unhealthy_remaining: u32,
}

impl FleetState {
    fn add_member(&mut self, name: &str, leader: bool) {
        if leader {
            for m in &mut self.members {
                m.is_leader = false;
            }
        }
        self.members.push(EtcdMember {
            id: self.next_member_id,
            name: name.to_string(),
            is_leader: leader,
        });
        self.next_member_id += 1;
        self.registry.insert(name.to_string());
    }

    fn node_mut(&mut self, name: &str) -> anyhow::Result<&mut SimNode> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| anyhow!("node {name} not found"))
    }

    /// Register a freshly provisioned node that is not ready yet.
    fn provision(&mut self, node: Node, template: &str) -> Machine {
        let mut pending: VecDeque<Readiness> =
            std::iter::repeat_n(Readiness::False, self.boot_polls as usize).collect();
        if !self.faults.replacements_never_ready {
            pending.push_back(Readiness::True);
        }
        let name = node.name.clone();
        let machine = Machine::new(&name, Duration::ZERO, template);
        self.nodes.insert(
            name.clone(),
            SimNode {
                node: Node {
                    readiness: Readiness::False,
                    ..node
                },
                pending,
            },
        );
        self.machines.insert(name, machine.clone());
        machine
    }

    fn computed_health(&self) -> HealthSnapshot {
        let ready = self
            .nodes
            .values()
            .filter(|n| n.node.readiness == Readiness::True)
            .count() as u32;
        let unready = self.nodes.len() as u32 - ready;
        HealthSnapshot {
            ready_nodes: ready,
            unready_nodes: unready,
            running_pods: ready * PODS_PER_NODE,
            pending_pods: unready * PODS_PER_NODE,
            ..Default::default()
        }
    }
}

/// An in-memory cluster. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SimFleet {
    state: Arc<Mutex<FleetState>>,
}

impl Default for SimFleet {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFleet {
    /// An empty fleet: no nodes, healthy, nothing failing.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FleetState {
                nodes: BTreeMap::new(),
                machines: BTreeMap::new(),
                members: Vec::new(),
                registry: BTreeSet::new(),
                health: VecDeque::new(),
                journal: Vec::new(),
                faults: Faults::default(),
                boot_polls: 1,
                reboot_polls: 1,
                replacements: 0,
                next_member_id: 1,
                unhealthy_connection_polls: 0,
                connection_unhealthy_remaining: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().expect("sim fleet lock poisoned")
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Add a node. `machine` of `None` leaves the node without a backing
    /// machine.
    pub fn with_node(self, node: Node, machine: Option<Machine>) -> Self {
        {
            let mut st = self.lock();
            if let Some(m) = machine {
                st.machines.insert(node.name.clone(), m);
            }
            st.nodes.insert(
                node.name.clone(),
                SimNode {
                    node,
                    pending: VecDeque::new(),
                },
            );
        }
        self
    }

    pub fn with_worker(self, name: &str, age: Duration) -> Self {
        let machine = Machine::new(name, age, DEFAULT_TEMPLATE);
        self.with_node(Node::new(name), Some(machine))
    }

    /// Add a control-plane node with an etcd member and a registry entry.
    pub fn with_control_plane(self, name: &str, age: Duration, leader: bool) -> Self {
        let machine = Machine::new(name, age, DEFAULT_TEMPLATE);
        self.with_node(Node::control_plane(name), Some(machine))
            .with_etcd_member(name, leader)
    }

    /// Add an etcd member and registry entry for `name`.
    pub fn with_etcd_member(self, name: &str, leader: bool) -> Self {
        self.lock().add_member(name, leader);
        self
    }

    pub fn with_faults(self, f: impl FnOnce(&mut Faults)) -> Self {
        f(&mut self.lock().faults);
        self
    }

    /// Script health snapshots. Each call to `snapshot` takes the next
    /// one; the last repeats. Without a script health is computed from
    /// node readiness.
    pub fn with_health(self, script: Vec<HealthSnapshot>) -> Self {
        self.lock().health = script.into();
        self
    }

    /// Readiness polls a new node reports `False` before becoming ready.
    pub fn with_boot_polls(self, polls: u32) -> Self {
        self.lock().boot_polls = polls;
        self
    }

    /// Readiness polls a rebooted node reports `False` before returning.
    pub fn with_reboot_polls(self, polls: u32) -> Self {
        self.lock().reboot_polls = polls;
        self
    }

    /// Health probes that fail after each connection reset.
    pub fn with_unhealthy_connection_polls(self, polls: u32) -> Self {
        self.lock().unhealthy_connection_polls = polls;
        self
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn journal(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.lock().nodes.values().map(|n| n.node.clone()).collect()
    }

    pub fn node(&self, name: &str) -> Option<Node> {
        self.lock().nodes.get(name).map(|n| n.node.clone())
    }

    pub fn machines(&self) -> Vec<Machine> {
        self.lock().machines.values().cloned().collect()
    }

    pub fn members(&self) -> Vec<EtcdMember> {
        self.lock().members.clone()
    }

    pub fn leader(&self) -> Option<String> {
        self.lock()
            .members
            .iter()
            .find(|m| m.is_leader)
            .map(|m| m.name.clone())
    }

    pub fn registry(&self) -> Vec<String> {
        self.lock().registry.iter().cloned().collect()
    }

    /// A handle implementing the orchestrator's cluster connection.
    pub fn connection(&self) -> SimConnection {
        SimConnection {
            fleet: self.clone(),
        }
    }
}

// ── Scheduler API ──────────────────────────────────────────────────

#[async_trait]
impl ClusterApi for SimFleet {
    async fn list_nodes(&self) -> anyhow::Result<Vec<Node>> {
        let st = self.lock();
        if st.faults.list_nodes {
            bail!("[SIM] api server unavailable");
        }
        Ok(st.nodes.values().map(|n| n.node.clone()).collect())
    }

    async fn cordon(&self, node: &str) -> anyhow::Result<()> {
        let mut st = self.lock();
        st.journal.push(Call::Cordon(node.to_string()));
        if st.faults.cordon.contains(node) {
            bail!("[SIM] cordon rejected");
        }
        st.node_mut(node)?.node.unschedulable = true;
        debug!(node, "[SIM] cordoned");
        Ok(())
    }

    async fn uncordon(&self, node: &str) -> anyhow::Result<()> {
        let mut st = self.lock();
        st.journal.push(Call::Uncordon(node.to_string()));
        if st.faults.uncordon.contains(node) {
            bail!("[SIM] uncordon rejected");
        }
        st.node_mut(node)?.node.unschedulable = false;
        debug!(node, "[SIM] uncordoned");
        Ok(())
    }

    async fn drain(&self, node: &str, timeout: Duration) -> anyhow::Result<()> {
        let mut st = self.lock();
        st.journal.push(Call::Drain(node.to_string()));
        if st.faults.drain.contains(node) {
            bail!("[SIM] eviction blocked by disruption budget after {timeout:?}");
        }
        st.node_mut(node)?.node.unschedulable = true;
        debug!(node, "[SIM] drained");
        Ok(())
    }

    async fn readiness(&self, node: &str) -> anyhow::Result<Readiness> {
        let mut st = self.lock();
        let sim = st.node_mut(node)?;
        if let Some(next) = sim.pending.pop_front() {
            sim.node.readiness = next;
        }
        Ok(sim.node.readiness)
    }

    async fn execute(
        &self,
        node: &str,
        _timeout: Duration,
        command: &str,
    ) -> anyhow::Result<String> {
        let mut st = self.lock();
        st.journal.push(Call::Execute {
            node: node.to_string(),
            command: command.to_string(),
        });
        if command.contains("shutdown -r") && !st.faults.never_shuts_down.contains(node) {
            let comes_back = !st.faults.never_comes_back.contains(node);
            let down = st.reboot_polls.max(1) as usize;
            let sim = st.node_mut(node)?;
            sim.pending = std::iter::repeat_n(Readiness::False, down).collect();
            if comes_back {
                sim.pending.push_back(Readiness::True);
            }
            debug!(node, "[SIM] reboot scheduled");
        }
        if st.faults.execute.contains(node) {
            bail!("[SIM] ssh session to {node} dropped");
        }
        Ok(String::new())
    }
}

// ── Provisioner ────────────────────────────────────────────────────

#[async_trait]
impl MachineProvisioner for SimFleet {
    async fn get_machine(&self, node: &str) -> anyhow::Result<Machine> {
        let st = self.lock();
        if st.faults.missing_machines.contains(node) {
            bail!("[SIM] no machine found for {node}");
        }
        st.machines
            .get(node)
            .cloned()
            .ok_or_else(|| anyhow!("[SIM] no machine found for {node}"))
    }

    async fn create_control_plane_node(&self) -> anyhow::Result<Machine> {
        let mut st = self.lock();
        st.replacements += 1;
        let name = format!("control-plane-r{}", st.replacements);
        st.journal.push(Call::CreateControlPlane(name.clone()));
        if st.faults.provision {
            bail!("[SIM] out of capacity");
        }
        let machine = st.provision(Node::control_plane(&name), DEFAULT_TEMPLATE);
        st.add_member(&name, false);
        debug!(node = %name, "[SIM] control-plane node provisioned");
        Ok(machine)
    }

    async fn create_worker_node(&self, template: Option<&str>) -> anyhow::Result<Machine> {
        let mut st = self.lock();
        st.replacements += 1;
        let name = format!("worker-r{}", st.replacements);
        st.journal.push(Call::CreateWorker(name.clone()));
        if st.faults.provision {
            bail!("[SIM] out of capacity");
        }
        let machine = st.provision(Node::new(&name), template.unwrap_or(DEFAULT_TEMPLATE));
        debug!(node = %name, "[SIM] worker provisioned");
        Ok(machine)
    }

    async fn terminate(&self, machine: &Machine) -> anyhow::Result<()> {
        let mut st = self.lock();
        st.journal.push(Call::Terminate(machine.name.clone()));
        if st.faults.terminate.contains(&machine.name) {
            bail!("[SIM] hypervisor refused to power off {}", machine.name);
        }
        st.machines.remove(&machine.name);
        st.nodes.remove(&machine.name);
        debug!(node = %machine.name, "[SIM] terminated");
        Ok(())
    }
}

// ── Etcd ───────────────────────────────────────────────────────────

struct SimEtcdClient {
    fleet: SimFleet,
    member: EtcdMember,
}

#[async_trait]
impl EtcdClient for SimEtcdClient {
    fn is_leader(&self) -> bool {
        self.member.is_leader
    }

    fn member_id(&self) -> MemberId {
        self.member.id
    }

    fn name(&self) -> &str {
        &self.member.name
    }

    async fn members(&self) -> anyhow::Result<Vec<EtcdMember>> {
        let st = self.fleet.lock();
        if st.faults.list_members {
            bail!("[SIM] member list timed out");
        }
        Ok(st.members.clone())
    }

    async fn move_leader(&self, target: MemberId) -> anyhow::Result<()> {
        let mut st = self.fleet.lock();
        if st.faults.move_leader {
            bail!("[SIM] leader transfer to {target:x} timed out");
        }
        let is_leader = st
            .members
            .iter()
            .any(|m| m.id == self.member.id && m.is_leader);
        if !is_leader {
            bail!("[SIM] {} is not the leader", self.member.name);
        }
        let Some(to) = st.members.iter().find(|m| m.id == target).map(|m| m.name.clone()) else {
            bail!("[SIM] member {target:x} not found");
        };
        for m in &mut st.members {
            m.is_leader = m.id == target;
        }
        st.journal.push(Call::MoveLeader {
            from: self.member.name.clone(),
            to,
        });
        Ok(())
    }

    async fn remove_member(&self, member: MemberId) -> anyhow::Result<()> {
        let mut st = self.fleet.lock();
        if st.faults.remove_member {
            bail!("[SIM] member {member:x} removal rejected");
        }
        let Some(pos) = st.members.iter().position(|m| m.id == member) else {
            bail!("[SIM] member {member:x} not found");
        };
        let removed = st.members.remove(pos);
        st.journal.push(Call::RemoveMember(removed.name));
        Ok(())
    }
}

#[async_trait]
impl EtcdClientFactory for SimFleet {
    async fn client_for_node(&self, node: &str) -> anyhow::Result<Box<dyn EtcdClient>> {
        let st = self.lock();
        if st.faults.etcd_unreachable.contains(node) {
            bail!("[SIM] etcd on {node} refused connection");
        }
        let member = st
            .members
            .iter()
            .find(|m| m.name == node)
            .cloned()
            .ok_or_else(|| anyhow!("[SIM] no etcd member on {node}"))?;
        drop(st);
        Ok(Box::new(SimEtcdClient {
            fleet: self.clone(),
            member,
        }))
    }

    async fn client_for_leader(&self, _nodes: &[Node]) -> anyhow::Result<Box<dyn EtcdClient>> {
        let st = self.lock();
        if st.faults.leader_unreachable {
            bail!("[SIM] no reachable etcd endpoint");
        }
        let member = st
            .members
            .iter()
            .find(|m| m.is_leader)
            .cloned()
            .ok_or_else(|| anyhow!("[SIM] etcd has no leader"))?;
        drop(st);
        Ok(Box::new(SimEtcdClient {
            fleet: self.clone(),
            member,
        }))
    }
}

// ── Registry, health, connection ───────────────────────────────────

#[async_trait]
impl FleetDirectory for SimFleet {
    async fn remove_member(&self, node: &str) -> anyhow::Result<()> {
        let mut st = self.lock();
        st.journal.push(Call::Deregister(node.to_string()));
        if st.faults.deregister {
            bail!("[SIM] registry unreachable");
        }
        st.registry.remove(node);
        Ok(())
    }
}

#[async_trait]
impl HealthAggregator for SimFleet {
    async fn snapshot(&self) -> HealthSnapshot {
        let mut st = self.lock();
        match st.health.len() {
            0 => st.computed_health(),
            1 => st.health[0],
            _ => st.health.pop_front().unwrap_or_default(),
        }
    }
}

/// The orchestrator's connection into a [`SimFleet`].
pub struct SimConnection {
    fleet: SimFleet,
}

#[async_trait]
impl ClusterConnection for SimConnection {
    fn reset(&mut self) {
        let mut st = self.fleet.lock();
        st.journal.push(Call::ResetConnection);
        st.connection_unhealthy_remaining = if st.faults.connection_never_healthy {
            u32::MAX
        } else {
            st.unhealthy_connection_polls
        };
    }

    async fn is_healthy(&self) -> bool {
        let mut st = self.fleet.lock();
        if st.connection_unhealthy_remaining > 0 {
            st.connection_unhealthy_remaining -= 1;
            false
        } else {
            true
        }
    }
}
