//! Record of every mutating call made against a simulated fleet.

/// One call observed by the simulated fleet, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Cordon(String),
    Uncordon(String),
    Drain(String),
    Execute { node: String, command: String },
    CreateControlPlane(String),
    CreateWorker(String),
    Terminate(String),
    MoveLeader { from: String, to: String },
    RemoveMember(String),
    Deregister(String),
    ResetConnection,
}

impl Call {
    /// The node this call targeted, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            Call::Cordon(n)
            | Call::Uncordon(n)
            | Call::Drain(n)
            | Call::CreateControlPlane(n)
            | Call::CreateWorker(n)
            | Call::Terminate(n)
            | Call::RemoveMember(n)
            | Call::Deregister(n) => Some(n),
            Call::Execute { node, .. } => Some(node),
            Call::MoveLeader { from, .. } => Some(from),
            Call::ResetConnection => None,
        }
    }

    /// True for calls that change a node or machine (as opposed to etcd,
    /// the registry, or the connection).
    pub fn touches_node(&self) -> bool {
        matches!(
            self,
            Call::Cordon(_)
                | Call::Uncordon(_)
                | Call::Drain(_)
                | Call::Execute { .. }
                | Call::CreateControlPlane(_)
                | Call::CreateWorker(_)
                | Call::Terminate(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_of_call() {
        assert_eq!(Call::Cordon("a".into()).node(), Some("a"));
        assert_eq!(
            Call::MoveLeader {
                from: "cp1".into(),
                to: "cp2".into()
            }
            .node(),
            Some("cp1")
        );
        assert_eq!(Call::ResetConnection.node(), None);
    }

    #[test]
    fn etcd_calls_do_not_touch_nodes() {
        assert!(Call::Terminate("a".into()).touches_node());
        assert!(!Call::RemoveMember("a".into()).touches_node());
        assert!(!Call::ResetConnection.touches_node());
    }
}
