//! Node ordering for rollouts.
//!
//! Rolling updates join every node to its machine and replace the oldest
//! machines first. Rolling restarts ignore machines and go by node name,
//! in reverse alphabetical order.

use rotor_core::{Machine, MachineProvisioner, Node};

use crate::error::{RolloutError, RolloutResult};

/// A node joined to the machine backing it. Lives for one rollout.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMachine {
    pub node: Node,
    pub machine: Machine,
}

/// Resolve the machine for every node and order the pairs oldest first.
///
/// Fails on the first node without a machine; there is no partial result.
pub async fn pair_nodes(
    provisioner: &dyn MachineProvisioner,
    nodes: &[Node],
) -> RolloutResult<Vec<NodeMachine>> {
    let mut pairs = Vec::with_capacity(nodes.len());
    for node in nodes {
        let machine = provisioner
            .get_machine(&node.name)
            .await
            .map_err(|source| RolloutError::MachineLookup {
                node: node.name.clone(),
                source,
            })?;
        pairs.push(NodeMachine {
            node: node.clone(),
            machine,
        });
    }
    sort_oldest_first(&mut pairs);
    Ok(pairs)
}

/// Sort by descending machine age.
pub fn sort_oldest_first(pairs: &mut [NodeMachine]) {
    pairs.sort_by(|a, b| b.machine.age.cmp(&a.machine.age));
}

/// Nodes in reverse alphabetical order of name.
pub fn restart_order(nodes: &[Node]) -> Vec<&Node> {
    let mut ordered: Vec<&Node> = nodes.iter().collect();
    ordered.sort_by(|a, b| b.name.cmp(&a.name));
    ordered
}
