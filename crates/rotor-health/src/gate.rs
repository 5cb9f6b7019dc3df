//! Health gate: snapshot before, poll until recovered after.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use rotor_core::Poller;

use crate::snapshot::{HealthAggregator, HealthSnapshot};

/// Wraps a [`HealthAggregator`] with the compare-and-wait logic used
/// around each node operation.
#[derive(Clone)]
pub struct HealthGate {
    aggregator: Arc<dyn HealthAggregator>,
    poller: Poller,
}

impl HealthGate {
    pub fn new(aggregator: Arc<dyn HealthAggregator>) -> Self {
        Self {
            aggregator,
            poller: Poller::default(),
        }
    }

    /// Set the poller used while waiting for recovery.
    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// Current cluster health.
    pub async fn snapshot(&self) -> HealthSnapshot {
        self.aggregator.snapshot().await
    }

    /// True if `current` is worse than `baseline`.
    pub fn is_degraded(current: &HealthSnapshot, baseline: &HealthSnapshot) -> bool {
        current.is_degraded_compared_to(baseline)
    }

    /// Poll until a fresh snapshot is no worse than `baseline`.
    ///
    /// Returns `Ok` with the recovered snapshot, or `Err` with the last
    /// degraded one once `timeout` has elapsed.
    pub async fn wait_for_recovery(
        &self,
        baseline: &HealthSnapshot,
        timeout: Duration,
    ) -> Result<HealthSnapshot, HealthSnapshot> {
        let result = self
            .poller
            .until_accepted(
                timeout,
                move || async move {
                    let current = self.snapshot().await;
                    info!(health = %current, "current health");
                    current
                },
                |current| !Self::is_degraded(current, baseline),
            )
            .await;

        match &result {
            Ok(current) => debug!(health = %current, "health recovered"),
            Err(current) => debug!(health = %current, before = %baseline, "health still degraded"),
        }
        result
    }
}
