//! `rotor update`: rolling update against the fleet.

use anyhow::Result;

use super::{load, render, RolloutArgs};

pub async fn update(args: &RolloutArgs) -> Result<String> {
    let (_, mut controller) = load(args)?;
    let report = controller.rolling_update().await?;
    render(&report, &args.format)
}
