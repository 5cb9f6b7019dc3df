//! Rollout options and the `[rollout]` configuration table.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Options for one rolling update or rolling restart invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingOptions {
    /// Bound on each per-node wait (readiness, drain, health recovery).
    pub timeout: Duration,
    /// Machines this young or younger are left alone.
    pub min_age: Duration,
    /// Maximum number of nodes replaced in one rolling update.
    pub max: u32,
    /// Tolerate drain failures and undetected shutdowns on restart.
    pub force: bool,
    /// Scale single-replica deployments up before draining. Not yet acted on.
    pub scale_single_deployments: bool,
    /// Migrate pods with local volumes off the node. Not yet acted on.
    pub migrate_local_volumes: bool,
}

impl Default for RollingOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            min_age: Duration::ZERO,
            max: 100,
            force: false,
            scale_single_deployments: false,
            migrate_local_volumes: false,
        }
    }
}

impl RollingOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_age(mut self, min_age: Duration) -> Self {
        self.min_age = min_age;
        self
    }

    pub fn with_max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// The `[rollout]` table of a fleet file. Durations are strings such as
/// `"500ms"`, `"30s"`, `"5m"` or `"12h"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    pub timeout: Option<String>,
    pub min_age: Option<String>,
    pub max: Option<u32>,
    pub force: Option<bool>,
    pub poll_interval: Option<String>,
    pub scale_single_deployments: Option<bool>,
    pub migrate_local_volumes: Option<bool>,
}

impl RolloutConfig {
    /// Resolve the table into options, filling gaps from the defaults.
    pub fn to_options(&self) -> ConfigResult<RollingOptions> {
        let defaults = RollingOptions::default();
        Ok(RollingOptions {
            timeout: duration_field("timeout", self.timeout.as_deref())?
                .unwrap_or(defaults.timeout),
            min_age: duration_field("min_age", self.min_age.as_deref())?
                .unwrap_or(defaults.min_age),
            max: self.max.unwrap_or(defaults.max),
            force: self.force.unwrap_or(defaults.force),
            scale_single_deployments: self
                .scale_single_deployments
                .unwrap_or(defaults.scale_single_deployments),
            migrate_local_volumes: self
                .migrate_local_volumes
                .unwrap_or(defaults.migrate_local_volumes),
        })
    }

    /// Poll interval override, if one is configured.
    pub fn poll_interval(&self) -> ConfigResult<Option<Duration>> {
        duration_field("poll_interval", self.poll_interval.as_deref())
    }
}

fn duration_field(field: &'static str, value: Option<&str>) -> ConfigResult<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(v) => parse_duration(v)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidDuration {
                field,
                value: v.to_string(),
            }),
    }
}

/// Parse a duration string like "500ms", "5s", "10m", "48h".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
