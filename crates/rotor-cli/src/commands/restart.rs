//! `rotor restart`: rolling restart of worker nodes.

use anyhow::Result;

use super::{load, render, RolloutArgs};

pub async fn restart(args: &RolloutArgs) -> Result<String> {
    let (_, controller) = load(args)?;
    let report = controller.rolling_restart().await?;
    render(&report, &args.format)
}
