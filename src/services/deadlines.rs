use std::time::Duration;

use chrono::NaiveDate;

use crate::approvals::{ApprovalStatus, ApprovalStore, StageApproval};
use crate::error::Result;
use crate::interfaces::scheduler::ScheduledJob;
use crate::notifications::{NotificationKind, NotificationStore, Outgoing};
use crate::projects::{Project, ProjectStore};
use crate::stages::Stage;

/// Stages whose deadline falls within `warn_days` of `today` (or has
/// passed) and that are not approved yet.
pub fn due_stage_deadlines(
    project: &Project,
    approvals: &[StageApproval],
    today: NaiveDate,
    warn_days: i64,
) -> Vec<(Stage, NaiveDate)> {
    project
        .stage_deadline_dates()
        .into_iter()
        .filter(|(stage, deadline)| {
            let approved = approvals
                .iter()
                .any(|row| row.stage_id == stage.id() && row.status == ApprovalStatus::Approved);
            !approved && (*deadline - today).num_days() <= warn_days
        })
        .collect()
}

fn deadline_link(project_id: &str, stage: Stage) -> String {
    format!("/projects/{project_id}?stage={}", stage.id())
}

fn deadline_title(deadline: NaiveDate, today: NaiveDate) -> &'static str {
    if deadline < today {
        "Stage deadline overdue"
    } else {
        "Stage deadline approaching"
    }
}

fn deadline_message(project: &Project, stage: Stage, deadline: NaiveDate, today: NaiveDate) -> String {
    let date = deadline.format("%Y-%m-%d");
    if deadline < today {
        format!(
            "The {} stage of \"{}\" is overdue (deadline {date}) and not yet approved.",
            stage.label(),
            project.name
        )
    } else {
        format!(
            "The {} stage of \"{}\" is due on {date} and not yet approved.",
            stage.label(),
            project.name
        )
    }
}

pub struct StageDeadlineJob {
    projects: ProjectStore,
    approvals: ApprovalStore,
    notifications: NotificationStore,
    interval: Duration,
    warn_days: i64,
}

impl StageDeadlineJob {
    pub fn new(
        projects: ProjectStore,
        approvals: ApprovalStore,
        notifications: NotificationStore,
        interval: Duration,
        warn_days: i64,
    ) -> Self {
        Self {
            projects,
            approvals,
            notifications,
            interval,
            warn_days,
        }
    }

    /// One pass over active projects. Returns the number of reminders
    /// inserted; a reminder already sent for the same stage is not repeated.
    pub async fn run_once(&self, today: NaiveDate) -> Result<usize> {
        let mut outgoing = Vec::new();
        for project in self.projects.list_active().await? {
            if project.stage_deadlines.is_empty() {
                continue;
            }
            let approvals = self.approvals.list_for_project(&project.id).await?;
            for (stage, deadline) in due_stage_deadlines(&project, &approvals, today, self.warn_days)
            {
                let link = deadline_link(&project.id, stage);
                if self
                    .notifications
                    .exists(&project.owner_id, NotificationKind::StageDeadline, &link)
                    .await?
                {
                    continue;
                }
                outgoing.push(
                    Outgoing::new(
                        project.owner_id.clone(),
                        NotificationKind::StageDeadline,
                        deadline_title(deadline, today),
                        deadline_message(&project, stage, deadline, today),
                    )
                    .with_link(link),
                );
            }
        }
        self.notifications.insert_many(outgoing).await
    }
}

#[async_trait::async_trait]
impl ScheduledJob for StageDeadlineJob {
    fn name(&self) -> &str {
        "stage_deadlines"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        let today = chrono::Utc::now().date_naive();
        let sent = self.run_once(today).await?;
        if sent > 0 {
            tracing::info!(sent, "Sent stage deadline reminders");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::projects::ProjectStatus;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn project_with(deadlines: &[(&str, &str)]) -> Project {
        Project {
            id: "p1".to_string(),
            name: "Depot".to_string(),
            description: None,
            status: ProjectStatus::InProgress,
            progress: 10,
            owner_id: "owner".to_string(),
            stage_deadlines: deadlines
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn approved(stage: &str) -> StageApproval {
        StageApproval {
            id: format!("a-{stage}"),
            project_id: "p1".to_string(),
            stage_id: stage.to_string(),
            status: ApprovalStatus::Approved,
            requested_by: None,
            approved_by: None,
            approved_at: None,
            comment: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn picks_near_and_overdue_unapproved_stages() {
        let project = project_with(&[
            ("initiation", "2026-10-01"),
            ("planning", "2026-10-20"),
            ("execution", "2026-12-01"),
        ]);
        let due = due_stage_deadlines(&project, &[], date("2026-10-19"), 3);
        let stages: Vec<Stage> = due.iter().map(|(stage, _)| *stage).collect();
        assert_eq!(stages, vec![Stage::Initiation, Stage::Planning]);
    }

    #[test]
    fn approved_stages_are_skipped() {
        let project = project_with(&[("initiation", "2026-10-01")]);
        let due = due_stage_deadlines(&project, &[approved("initiation")], date("2026-10-19"), 3);
        assert!(due.is_empty());
    }

    #[test]
    fn overdue_message_mentions_overdue() {
        let project = project_with(&[]);
        let msg = deadline_message(
            &project,
            Stage::Closure,
            date("2026-10-01"),
            date("2026-10-19"),
        );
        assert!(msg.contains("overdue"));
    }

    #[test]
    fn title_follows_overdue_state() {
        let today = date("2026-10-19");
        assert_eq!(
            deadline_title(date("2026-10-01"), today),
            "Stage deadline overdue"
        );
        assert_eq!(deadline_title(today, today), "Stage deadline approaching");
        assert_eq!(
            deadline_title(date("2026-10-21"), today),
            "Stage deadline approaching"
        );
    }
}
