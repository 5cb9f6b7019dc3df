pub mod plan;
pub mod restart;
pub mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use rotor_core::{Poller, RolloutConfig};
use rotor_rollout::{Collaborators, RolloutController};
use rotor_sim::{FleetConfig, SimFleet};

/// Fleet file plus overrides for its `[rollout]` table.
#[derive(Args, Debug, Clone, Default)]
pub struct RolloutArgs {
    /// Fleet description (TOML)
    #[arg(long)]
    pub fleet: PathBuf,
    /// Per-step timeout, e.g. "10m"
    #[arg(long)]
    pub timeout: Option<String>,
    /// Skip machines no older than this, e.g. "720h"
    #[arg(long)]
    pub min_age: Option<String>,
    /// Maximum number of nodes to replace
    #[arg(long)]
    pub max: Option<u32>,
    /// Keep restarting through drain and shutdown-detection failures
    #[arg(long)]
    pub force: bool,
    /// Sleep between two polls, e.g. "5s"
    #[arg(long)]
    pub poll_interval: Option<String>,
    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

impl RolloutArgs {
    /// The fleet file's `[rollout]` table with command-line overrides applied.
    fn rollout_config(&self, file: &RolloutConfig) -> RolloutConfig {
        let mut config = file.clone();
        if let Some(timeout) = &self.timeout {
            config.timeout = Some(timeout.clone());
        }
        if let Some(min_age) = &self.min_age {
            config.min_age = Some(min_age.clone());
        }
        if let Some(max) = self.max {
            config.max = Some(max);
        }
        if self.force {
            config.force = Some(true);
        }
        if let Some(interval) = &self.poll_interval {
            config.poll_interval = Some(interval.clone());
        }
        config
    }
}

/// Load the fleet and build a controller for it.
pub(crate) fn load(args: &RolloutArgs) -> Result<(SimFleet, RolloutController)> {
    let file = FleetConfig::from_file(&args.fleet)
        .with_context(|| format!("failed to load fleet file {}", args.fleet.display()))?;
    let rollout = args.rollout_config(&file.rollout);
    let opts = rollout.to_options()?;
    let fleet = file.build()?;

    info!(
        fleet = %args.fleet.display(),
        nodes = file.nodes.len(),
        timeout = ?opts.timeout,
        min_age = ?opts.min_age,
        max = opts.max,
        force = opts.force,
        "loaded fleet"
    );

    let mut controller = RolloutController::new(
        Collaborators::from_shared(Arc::new(fleet.clone())),
        Box::new(fleet.connection()),
        opts,
    );
    if let Some(interval) = rollout.poll_interval()? {
        controller = controller.with_poller(Poller::new().with_interval(interval));
    }
    Ok((fleet, controller))
}

/// Render `value` as pretty JSON or with its `Display` impl.
pub(crate) fn render<T>(value: &T, format: &str) -> Result<String>
where
    T: Serialize + std::fmt::Display,
{
    match format {
        "json" => Ok(serde_json::to_string_pretty(value)?),
        _ => Ok(value.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs;
    use std::path::Path;

    use super::RolloutArgs;

    pub const FLEET: &str = r#"
[rollout]
timeout = "2m"
min_age = "100h"
poll_interval = "1s"

[[nodes]]
name = "cp-1"
role = "control-plane"
age = "2000h"
etcd_leader = true

[[nodes]]
name = "cp-2"
role = "control-plane"
age = "1500h"

[[nodes]]
name = "worker-a"
age = "900h"
template = "ubuntu-22.04"

[[nodes]]
name = "worker-b"
age = "10h"
"#;

    pub fn write_fleet(dir: &Path) -> RolloutArgs {
        let path = dir.join("fleet.toml");
        fs::write(&path, FLEET).unwrap();
        RolloutArgs {
            fleet: path,
            format: "text".into(),
            ..Default::default()
        }
    }
}
