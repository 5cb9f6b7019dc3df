//! Rollout controller: drives rolling updates and rolling restarts.
//!
//! Both loops take the node list once at the start and then work through
//! it one node at a time. Health is snapshotted before each node and must
//! come back to that level afterwards. On the update path a node that
//! leaves the cluster degraded aborts the rollout; on the restart path it
//! is only a warning.

use std::sync::Arc;

use tracing::{error, info, warn};

use rotor_core::{
    ClusterApi, ClusterConnection, EtcdClientFactory, FleetDirectory, MachineProvisioner, Poller,
    RollingOptions,
};
use rotor_health::{HealthAggregator, HealthGate};

use crate::error::{interrupted, RolloutError, RolloutResult};
use crate::handoff::ConsensusHandoff;
use crate::lifecycle::Lifecycle;
use crate::ordering::{pair_nodes, restart_order};
use crate::report::{
    PlanAction, PlanStep, Restart, RestartReport, UpdatePlan, UpdateReport,
};

/// The external systems a rollout coordinates.
#[derive(Clone)]
pub struct Collaborators {
    pub cluster: Arc<dyn ClusterApi>,
    pub provisioner: Arc<dyn MachineProvisioner>,
    pub etcd: Arc<dyn EtcdClientFactory>,
    pub directory: Arc<dyn FleetDirectory>,
    pub health: Arc<dyn HealthAggregator>,
}

impl Collaborators {
    /// Use one object for every collaborator.
    pub fn from_shared<T>(shared: Arc<T>) -> Self
    where
        T: ClusterApi
            + MachineProvisioner
            + EtcdClientFactory
            + FleetDirectory
            + HealthAggregator
            + 'static,
    {
        Self {
            cluster: shared.clone(),
            provisioner: shared.clone(),
            etcd: shared.clone(),
            directory: shared.clone(),
            health: shared,
        }
    }
}

/// Runs rollouts against one cluster.
///
/// Owns the orchestrator's cluster connection; it is only mutated during
/// a control-plane hand-off.
pub struct RolloutController {
    cluster: Arc<dyn ClusterApi>,
    provisioner: Arc<dyn MachineProvisioner>,
    etcd: Arc<dyn EtcdClientFactory>,
    directory: Arc<dyn FleetDirectory>,
    health: HealthGate,
    connection: Box<dyn ClusterConnection>,
    poller: Poller,
    opts: RollingOptions,
}

impl RolloutController {
    pub fn new(
        collaborators: Collaborators,
        connection: Box<dyn ClusterConnection>,
        opts: RollingOptions,
    ) -> Self {
        Self {
            cluster: collaborators.cluster,
            provisioner: collaborators.provisioner,
            etcd: collaborators.etcd,
            directory: collaborators.directory,
            health: HealthGate::new(collaborators.health),
            connection,
            poller: Poller::default(),
            opts,
        }
    }

    /// Override the poller for every wait (readiness, health, reconnect).
    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self.health = self.health.with_poller(poller);
        self
    }

    pub fn options(&self) -> &RollingOptions {
        &self.opts
    }

    fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle {
            cluster: self.cluster.as_ref(),
            provisioner: self.provisioner.as_ref(),
            poller: self.poller,
            opts: &self.opts,
        }
    }

    fn note_deferred_options(&self) {
        if self.opts.scale_single_deployments {
            warn!("scale_single_deployments is not supported yet, ignoring");
        }
        if self.opts.migrate_local_volumes {
            warn!("migrate_local_volumes is not supported yet, ignoring");
        }
    }

    /// What [`rolling_update`](Self::rolling_update) would do right now.
    ///
    /// Reads the node list and machines but changes nothing.
    pub async fn plan_update(&self) -> RolloutResult<UpdatePlan> {
        let nodes = self
            .cluster
            .list_nodes()
            .await
            .map_err(RolloutError::ListNodes)?;
        let pairs = pair_nodes(self.provisioner.as_ref(), &nodes).await?;

        let mut planned = 0u32;
        let steps = pairs
            .into_iter()
            .map(|pair| {
                let action = if pair.machine.age <= self.opts.min_age {
                    PlanAction::TooYoung
                } else if planned >= self.opts.max {
                    PlanAction::OverMax
                } else {
                    planned += 1;
                    PlanAction::Replace
                };
                PlanStep {
                    role: pair.node.role(),
                    node: pair.node.name,
                    age: pair.machine.age,
                    template: pair.machine.template,
                    action,
                }
            })
            .collect();
        Ok(UpdatePlan { steps })
    }

    /// Replace nodes oldest first.
    ///
    /// Machines no older than `min_age` are skipped. Control-plane nodes
    /// leave etcd before they are touched. Stops after `max` replacements,
    /// and aborts if cluster health does not recover after a replacement.
    /// A failure while processing a node comes back as
    /// [`RolloutError::Interrupted`] with the number already replaced.
    pub async fn rolling_update(&mut self) -> RolloutResult<UpdateReport> {
        self.note_deferred_options();

        let nodes = self
            .cluster
            .list_nodes()
            .await
            .map_err(RolloutError::ListNodes)?;
        let pairs = pair_nodes(self.provisioner.as_ref(), &nodes).await?;

        let total = pairs.len();
        let mut report = UpdateReport {
            total,
            ..Default::default()
        };

        for pair in &pairs {
            if report.rolled >= self.opts.max {
                info!(max = self.opts.max, "reached maximum replacements");
                break;
            }

            let name = pair.node.name.as_str();
            let age = pair.machine.age;
            let template = pair.machine.template.as_str();
            if age <= self.opts.min_age {
                info!(node = name, ?age, template, "skipping node");
                report.skipped.push(name.to_string());
                continue;
            }
            info!(node = name, ?age, template, "replacing node");

            if pair.node.is_control_plane() {
                let handoff = ConsensusHandoff::new(
                    self.etcd.as_ref(),
                    self.directory.as_ref(),
                    self.poller,
                    self.opts.timeout,
                );
                handoff
                    .run(self.connection.as_mut(), &pair.node, &nodes)
                    .await
                    .map_err(interrupted(report.rolled, total))?;
            }

            let before = self.health.snapshot().await;
            info!(health = %before, "health before");

            let replaced = self
                .lifecycle()
                .replace(pair)
                .await
                .map_err(interrupted(report.rolled, total))?;
            report.rolled += 1;
            report.replaced.push(replaced);

            if let Err(current) = self
                .health
                .wait_for_recovery(&before, self.opts.timeout)
                .await
            {
                error!(health = %current, timeout = ?self.opts.timeout, "health degraded after waiting");
            }
            let after = self.health.snapshot().await;
            if after.is_degraded_compared_to(&before) {
                return Err(RolloutError::HealthDegraded {
                    rolled: report.rolled,
                    total,
                    health: after,
                });
            }
        }

        info!(rolled = report.rolled, total, "rollout finished");
        Ok(report)
    }

    /// Restart worker nodes in reverse name order. Control-plane nodes are
    /// always skipped.
    pub async fn rolling_restart(&self) -> RolloutResult<RestartReport> {
        self.note_deferred_options();

        let nodes = self
            .cluster
            .list_nodes()
            .await
            .map_err(RolloutError::ListNodes)?;

        let mut report = RestartReport {
            total: nodes.len(),
            ..Default::default()
        };

        for node in restart_order(&nodes) {
            if node.is_control_plane() {
                info!(node = %node.name, "skipping control-plane node");
                report.skipped.push(node.name.clone());
                continue;
            }

            let before = self.health.snapshot().await;
            info!(health = %before, "health before");

            let elapsed = self.lifecycle().restart(node).await?;
            report.restarted.push(Restart {
                node: node.name.clone(),
                elapsed,
            });

            if let Err(current) = self
                .health
                .wait_for_recovery(&before, self.opts.timeout)
                .await
            {
                warn!(node = %node.name, health = %current, timeout = ?self.opts.timeout, "current health not recovered after timeout");
                report.health_warnings.push(node.name.clone());
            }
        }

        info!(
            restarted = report.restarted.len(),
            total = report.total,
            "rolling restart finished"
        );
        Ok(report)
    }
}
