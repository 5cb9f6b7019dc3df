//! What a rollout did, or would do.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use rotor_core::NodeRole;

/// One node replaced during a rolling update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replacement {
    pub node: String,
    pub replacement: String,
    pub elapsed: Duration,
}

/// Outcome of a successful rolling update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateReport {
    pub total: usize,
    pub rolled: u32,
    /// Nodes left alone because their machine was too young.
    pub skipped: Vec<String>,
    pub replaced: Vec<Replacement>,
}

impl fmt::Display for UpdateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rolled {} of {}", self.rolled, self.total)?;
        for r in &self.replaced {
            writeln!(f, "  replaced {} with {} in {:?}", r.node, r.replacement, r.elapsed)?;
        }
        for s in &self.skipped {
            writeln!(f, "  skipped {s}")?;
        }
        Ok(())
    }
}

/// One node restarted during a rolling restart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Restart {
    pub node: String,
    pub elapsed: Duration,
}

/// Outcome of a successful rolling restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestartReport {
    pub total: usize,
    pub restarted: Vec<Restart>,
    /// Control-plane nodes, which are never restarted.
    pub skipped: Vec<String>,
    /// Nodes after which health did not recover within the timeout.
    pub health_warnings: Vec<String>,
}

impl fmt::Display for RestartReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "restarted {} of {}", self.restarted.len(), self.total)?;
        for r in &self.restarted {
            let warning = if self.health_warnings.contains(&r.node) {
                " (health not recovered)"
            } else {
                ""
            };
            writeln!(f, "  restarted {} in {:?}{warning}", r.node, r.elapsed)?;
        }
        for s in &self.skipped {
            writeln!(f, "  skipped {s}")?;
        }
        Ok(())
    }
}

/// Decision for one node in a dry-run plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Replace,
    /// Machine age is at or below the minimum age.
    TooYoung,
    /// Old enough, but the `max` cap is already used up.
    OverMax,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub node: String,
    pub role: NodeRole,
    pub age: Duration,
    pub template: String,
    pub action: PlanAction,
}

/// Ordered decisions a rolling update would make, without side effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdatePlan {
    pub steps: Vec<PlanStep>,
}

impl UpdatePlan {
    pub fn replacements(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.action == PlanAction::Replace)
            .count()
    }
}

impl fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            let action = match step.action {
                PlanAction::Replace => "replace",
                PlanAction::TooYoung => "skip (too young)",
                PlanAction::OverMax => "skip (max reached)",
            };
            writeln!(
                f,
                "{:<18} {:<32} {:<14} age={:?} template={}",
                action, step.node, step.role, step.age, step.template
            )?;
        }
        write!(f, "{} of {} nodes would be replaced", self.replacements(), self.steps.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_report_summary_line() {
        let report = UpdateReport {
            total: 3,
            rolled: 1,
            skipped: vec!["w3".into()],
            replaced: vec![Replacement {
                node: "w1".into(),
                replacement: "worker-r1".into(),
                elapsed: Duration::from_secs(12),
            }],
        };
        let text = report.to_string();
        assert!(text.starts_with("rolled 1 of 3\n"));
        assert!(text.contains("replaced w1 with worker-r1 in 12s"));
        assert!(text.contains("skipped w3"));
    }

    #[test]
    fn restart_report_flags_health_warnings() {
        let report = RestartReport {
            total: 2,
            restarted: vec![Restart {
                node: "w1".into(),
                elapsed: Duration::from_secs(30),
            }],
            skipped: vec!["cp1".into()],
            health_warnings: vec!["w1".into()],
        };
        assert!(report.to_string().contains("w1 in 30s (health not recovered)"));
    }

    #[test]
    fn plan_serializes_actions_in_snake_case() {
        let plan = UpdatePlan {
            steps: vec![PlanStep {
                node: "w1".into(),
                role: NodeRole::Worker,
                age: Duration::from_secs(1),
                template: "t".into(),
                action: PlanAction::TooYoung,
            }],
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["steps"][0]["action"], "too_young");
        assert_eq!(plan.replacements(), 0);
    }
}
