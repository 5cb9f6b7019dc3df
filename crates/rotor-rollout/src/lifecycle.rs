//! Per-node lifecycle: replace (rolling update) and restart (rolling restart).

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use rotor_core::{ClusterApi, MachineProvisioner, Node, Poller, Readiness, RollingOptions};

use crate::error::{describe, RolloutError, RolloutResult};
use crate::ordering::NodeMachine;
use crate::report::Replacement;

/// Reboot one minute out, so the command returns before the node goes down.
pub const REBOOT_COMMAND: &str = "/sbin/shutdown -r +1";

/// Poll a node's `Ready` condition until `accept` approves it.
///
/// Errors while querying count as "not yet": a freshly provisioned node
/// may not be registered with the scheduler for a while. Returns the last
/// status seen on timeout, or `None` if the node could never be queried.
pub async fn wait_for_readiness<A>(
    cluster: &dyn ClusterApi,
    poller: &Poller,
    node: &str,
    timeout: Duration,
    accept: A,
) -> Result<Readiness, Option<Readiness>>
where
    A: Fn(Readiness) -> bool,
{
    let result = poller
        .until_accepted(
            timeout,
            move || async move {
                match cluster.readiness(node).await {
                    Ok(status) => Some(status),
                    Err(e) => {
                        debug!(node, error = %e, "readiness unavailable");
                        None
                    }
                }
            },
            |status| status.is_some_and(&accept),
        )
        .await;

    match result {
        Ok(Some(status)) => Ok(status),
        Ok(None) => Err(None),
        Err(last) => Err(last),
    }
}

/// Drives a single node through replace or restart.
pub struct Lifecycle<'a> {
    pub cluster: &'a dyn ClusterApi,
    pub provisioner: &'a dyn MachineProvisioner,
    pub poller: Poller,
    pub opts: &'a RollingOptions,
}

impl Lifecycle<'_> {
    /// Cordon, provision a replacement of the same role, wait for it to be
    /// ready, then terminate the old machine.
    ///
    /// Termination failures are logged only: by then the replacement is
    /// already serving.
    pub async fn replace(&self, pair: &NodeMachine) -> RolloutResult<Replacement> {
        let node = &pair.node;
        let timer = Instant::now();

        self.cluster
            .cordon(&node.name)
            .await
            .map_err(|source| RolloutError::Cordon {
                node: node.name.clone(),
                source,
            })?;

        let role = node.role();
        let created = if node.is_control_plane() {
            self.provisioner.create_control_plane_node().await
        } else {
            self.provisioner.create_worker_node(None).await
        };
        let replacement = created.map_err(|source| RolloutError::Provision {
            node: node.name.clone(),
            role,
            source,
        })?;

        info!(node = %node.name, replacement = %replacement.name, "waiting for replacement to become ready");
        if let Err(status) = wait_for_readiness(
            self.cluster,
            &self.poller,
            &replacement.name,
            self.opts.timeout,
            |r| r == Readiness::True,
        )
        .await
        {
            return Err(RolloutError::ReplacementNotReady {
                node: node.name.clone(),
                replacement: replacement.name,
                status,
            });
        }

        if let Err(e) = self.provisioner.terminate(&pair.machine).await {
            error!(node = %node.name, error = %e, "failed to terminate old machine");
        }

        let elapsed = timer.elapsed();
        info!(node = %node.name, replacement = %replacement.name, ?elapsed, "replaced node");
        Ok(Replacement {
            node: node.name.clone(),
            replacement: replacement.name,
            elapsed,
        })
    }

    /// Drain, reboot, wait for the node to drop out and come back, then
    /// uncordon. Returns how long the restart took.
    pub async fn restart(&self, node: &Node) -> RolloutResult<Duration> {
        let name = node.name.as_str();
        let timer = Instant::now();
        let force = self.opts.force;

        if let Err(source) = self.cluster.drain(name, self.opts.timeout).await {
            if !force {
                return Err(RolloutError::Drain {
                    node: name.to_string(),
                    source,
                });
            }
            error!(node = name, error = %source, "failed to drain, force restarting");
        }

        // The node may still reboot even if the command reports an error.
        if let Err(e) = self
            .cluster
            .execute(name, self.opts.timeout, REBOOT_COMMAND)
            .await
        {
            warn!(node = name, error = %e, "error issuing restart command");
        }

        info!(node = name, "waiting for node to shut down (become NotReady)");
        match wait_for_readiness(
            self.cluster,
            &self.poller,
            name,
            self.opts.timeout,
            Readiness::is_down,
        )
        .await
        {
            Ok(status) => info!(node = name, %status, "node is down"),
            Err(status) if force => {
                error!(node = name, status = %describe(&status), "did not detect node becoming unready")
            }
            Err(status) => {
                return Err(RolloutError::ShutdownNotDetected {
                    node: name.to_string(),
                    status,
                });
            }
        }

        info!(node = name, "waiting for node to finish restarting (become Ready)");
        wait_for_readiness(
            self.cluster,
            &self.poller,
            name,
            self.opts.timeout,
            |r| r == Readiness::True,
        )
        .await
        .map_err(|status| RolloutError::NotRecovered {
            node: name.to_string(),
            status,
        })?;

        self.cluster
            .uncordon(name)
            .await
            .map_err(|source| RolloutError::Uncordon {
                node: name.to_string(),
                source,
            })?;

        let elapsed = timer.elapsed();
        info!(node = name, ?elapsed, "restarted node");
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use rotor_sim::{Call, SimFleet};

    use super::*;

    fn day() -> Duration {
        Duration::from_secs(24 * 3600)
    }

    fn opts() -> RollingOptions {
        RollingOptions::default().with_timeout(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn replace_worker_in_order() {
        let fleet = SimFleet::new().with_worker("w1", day());
        let opts = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &opts,
        };
        let pair = NodeMachine {
            node: fleet.node("w1").unwrap(),
            machine: fleet.machines()[0].clone(),
        };

        let replaced = lc.replace(&pair).await.unwrap();
        assert_eq!(replaced.replacement, "worker-r1");
        assert_eq!(
            fleet.journal(),
            vec![
                Call::Cordon("w1".into()),
                Call::CreateWorker("worker-r1".into()),
                Call::Terminate("w1".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replace_control_plane_creates_control_plane() {
        let fleet = SimFleet::new()
            .with_control_plane("cp1", day(), false)
            .with_control_plane("cp2", day(), true);
        let opts = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &opts,
        };
        let pair = NodeMachine {
            node: fleet.node("cp1").unwrap(),
            machine: fleet.machines()[0].clone(),
        };
        lc.replace(&pair).await.unwrap();
        assert!(fleet
            .journal()
            .contains(&Call::CreateControlPlane("control-plane-r1".into())));
        assert!(fleet.node("control-plane-r1").unwrap().is_control_plane());
    }

    #[tokio::test(start_paused = true)]
    async fn replacement_that_never_readies_keeps_old_machine() {
        let fleet = SimFleet::new()
            .with_worker("w1", day())
            .with_faults(|f| f.replacements_never_ready = true);
        let opts = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &opts,
        };
        let pair = NodeMachine {
            node: fleet.node("w1").unwrap(),
            machine: fleet.machines()[0].clone(),
        };
        let err = lc.replace(&pair).await.unwrap_err();
        assert!(matches!(
            err,
            RolloutError::ReplacementNotReady {
                status: Some(Readiness::False),
                ..
            }
        ));
        assert!(!fleet.journal().contains(&Call::Terminate("w1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn terminate_failure_is_not_fatal() {
        let fleet = SimFleet::new()
            .with_worker("w1", day())
            .with_faults(|f| {
                f.terminate.insert("w1".into());
            });
        let opts = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &opts,
        };
        let pair = NodeMachine {
            node: fleet.node("w1").unwrap(),
            machine: fleet.machines()[0].clone(),
        };
        assert!(lc.replace(&pair).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cordon_failure_stops_before_provisioning() {
        let fleet = SimFleet::new()
            .with_worker("w1", day())
            .with_faults(|f| {
                f.cordon.insert("w1".into());
            });
        let opts = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &opts,
        };
        let pair = NodeMachine {
            node: fleet.node("w1").unwrap(),
            machine: fleet.machines()[0].clone(),
        };
        let err = lc.replace(&pair).await.unwrap_err();
        assert!(matches!(err, RolloutError::Cordon { ref node, .. } if node == "w1"));
        assert_eq!(fleet.journal(), vec![Call::Cordon("w1".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn uncordon_failure_is_fatal_after_reboot() {
        let fleet = SimFleet::new()
            .with_worker("w1", day())
            .with_faults(|f| {
                f.uncordon.insert("w1".into());
            });
        let forced = opts().with_force(true);
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &forced,
        };
        let err = lc.restart(&fleet.node("w1").unwrap()).await.unwrap_err();
        assert!(matches!(err, RolloutError::Uncordon { ref node, .. } if node == "w1"));
        assert_eq!(fleet.journal().last(), Some(&Call::Uncordon("w1".into())));
        assert!(fleet.node("w1").unwrap().unschedulable);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_runs_drain_reboot_uncordon() {
        let fleet = SimFleet::new().with_worker("w1", day()).with_reboot_polls(2);
        let opts = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &opts,
        };
        lc.restart(&fleet.node("w1").unwrap()).await.unwrap();

        assert_eq!(
            fleet.journal(),
            vec![
                Call::Drain("w1".into()),
                Call::Execute {
                    node: "w1".into(),
                    command: REBOOT_COMMAND.into()
                },
                Call::Uncordon("w1".into()),
            ]
        );
        let node = fleet.node("w1").unwrap();
        assert_eq!(node.readiness, Readiness::True);
        assert!(!node.unschedulable);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_tolerates_reboot_command_error() {
        let fleet = SimFleet::new()
            .with_worker("w1", day())
            .with_faults(|f| {
                f.execute.insert("w1".into());
            });
        let opts = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &opts,
        };
        assert!(lc.restart(&fleet.node("w1").unwrap()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn undetected_shutdown_depends_on_force() {
        let fleet = SimFleet::new()
            .with_worker("w1", day())
            .with_faults(|f| {
                f.never_shuts_down.insert("w1".into());
            });
        let strict = opts();
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &strict,
        };
        let err = lc.restart(&fleet.node("w1").unwrap()).await.unwrap_err();
        assert!(matches!(
            err,
            RolloutError::ShutdownNotDetected {
                status: Some(Readiness::True),
                ..
            }
        ));

        let forced = opts().with_force(true);
        let lc = Lifecycle {
            opts: &forced,
            ..lc
        };
        assert!(lc.restart(&fleet.node("w1").unwrap()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn node_that_never_returns_is_fatal_even_with_force() {
        let fleet = SimFleet::new()
            .with_worker("w1", day())
            .with_faults(|f| {
                f.never_comes_back.insert("w1".into());
            });
        let forced = opts().with_force(true);
        let lc = Lifecycle {
            cluster: &fleet,
            provisioner: &fleet,
            poller: Poller::new(),
            opts: &forced,
        };
        let err = lc.restart(&fleet.node("w1").unwrap()).await.unwrap_err();
        assert!(matches!(err, RolloutError::NotRecovered { .. }));
        assert!(!fleet.journal().contains(&Call::Uncordon("w1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_errors_count_as_not_yet() {
        let fleet = SimFleet::new();
        let result = wait_for_readiness(
            &fleet,
            &Poller::new(),
            "ghost",
            Duration::from_secs(10),
            |r| r == Readiness::True,
        )
        .await;
        assert_eq!(result, Err(None));
    }
}
