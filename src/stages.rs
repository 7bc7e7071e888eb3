//! The five fixed phases every project passes through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProjectHubError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initiation,
    Planning,
    Execution,
    Monitoring,
    Closure,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Initiation,
        Stage::Planning,
        Stage::Execution,
        Stage::Monitoring,
        Stage::Closure,
    ];

    /// Identifier stored in `project_stage_approvals.stage_id`.
    pub fn id(self) -> &'static str {
        match self {
            Stage::Initiation => "initiation",
            Stage::Planning => "planning",
            Stage::Execution => "execution",
            Stage::Monitoring => "monitoring",
            Stage::Closure => "closure",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Initiation => "Initiation",
            Stage::Planning => "Planning",
            Stage::Execution => "Execution",
            Stage::Monitoring => "Monitoring & Control",
            Stage::Closure => "Closure",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Stage {
    type Err = ProjectHubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let stage = match normalized.as_str() {
            "initiation" => Stage::Initiation,
            "planning" => Stage::Planning,
            "execution" => Stage::Execution,
            "monitoring" | "monitoring-control" | "monitoring_control" | "monitoring & control" => {
                Stage::Monitoring
            }
            "closure" => Stage::Closure,
            _ => {
                return Err(ProjectHubError::Validation(format!(
                    "unknown stage id: {}",
                    value.trim()
                )))
            }
        };
        Ok(stage)
    }
}

/// True once every fixed stage id appears among `approved_stage_ids`.
pub fn all_stages_approved<'a, I>(approved_stage_ids: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let approved: Vec<Stage> = approved_stage_ids
        .into_iter()
        .filter_map(|id| id.parse::<Stage>().ok())
        .collect();
    Stage::ALL.iter().all(|stage| approved.contains(stage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_and_labels() {
        assert_eq!("planning".parse::<Stage>().unwrap(), Stage::Planning);
        assert_eq!(" Closure ".parse::<Stage>().unwrap(), Stage::Closure);
        assert_eq!(
            "Monitoring & Control".parse::<Stage>().unwrap(),
            Stage::Monitoring
        );
        assert!("design".parse::<Stage>().is_err());
    }

    #[test]
    fn completion_requires_all_five() {
        let four = ["initiation", "planning", "execution", "monitoring"];
        assert!(!all_stages_approved(four));

        let five = ["closure", "initiation", "planning", "execution", "monitoring"];
        assert!(all_stages_approved(five));
    }

    #[test]
    fn duplicates_and_unknown_ids_do_not_count() {
        let ids = [
            "initiation",
            "initiation",
            "planning",
            "execution",
            "monitoring",
            "review",
        ];
        assert!(!all_stages_approved(ids));
    }
}
