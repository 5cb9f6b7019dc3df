//! `rotor plan`: dry run of a rolling update.

use anyhow::Result;

use super::{load, render, RolloutArgs};

pub async fn plan(args: &RolloutArgs) -> Result<String> {
    let (_, controller) = load(args)?;
    let plan = controller.plan_update().await?;
    render(&plan, &args.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::write_fleet;

    #[tokio::test]
    async fn text_plan_lists_decisions_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let args = write_fleet(dir.path());

        let out = plan(&args).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("replace") && lines[0].contains("cp-1"));
        assert!(lines[1].contains("cp-2"));
        assert!(lines[2].contains("worker-a") && lines[2].contains("template=ubuntu-22.04"));
        assert!(lines[3].starts_with("skip (too young)") && lines[3].contains("worker-b"));
        assert_eq!(lines[4], "3 of 4 nodes would be replaced");
    }

    #[tokio::test]
    async fn json_plan_respects_max_override() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = write_fleet(dir.path());
        args.max = Some(1);
        args.format = "json".into();

        let out = plan(&args).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        let actions: Vec<&str> = json["steps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, vec!["replace", "over_max", "over_max", "too_young"]);
    }
}
