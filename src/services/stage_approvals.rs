//! Stage approval workflow.
//!
//! A (project, stage) approval moves between Pending, Approved and Rejected.
//! Approving notifies the requester and may complete the project once all
//! five fixed stages are approved; rejecting notifies every project member
//! except the actor. Writes are sequential and unguarded: a failure after
//! the approval upsert leaves the upsert in place.

use serde::Serialize;

use crate::approvals::{ApprovalStatus, ApprovalStore, ApprovalWrite, StageApproval};
use crate::db::now_ts;
use crate::error::Result;
use crate::notifications::{send_best_effort, NotificationKind, NotificationStore, Outgoing};
use crate::projects::{Project, ProjectStatus, ProjectStore};
use crate::stages::{all_stages_approved, Stage};

#[derive(Debug, Clone)]
pub struct StageTransition {
    pub project_id: String,
    pub stage: Stage,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub actor_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub approval: StageApproval,
    pub notified: usize,
    pub project_completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSummary {
    pub stage_id: &'static str,
    pub label: &'static str,
    pub status: Option<ApprovalStatus>,
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectApprovals {
    pub project_id: String,
    pub approvals: Vec<StageApproval>,
    pub stages: Vec<StageSummary>,
    pub completed: bool,
}

#[derive(Clone)]
pub struct StageApprovalService {
    projects: ProjectStore,
    approvals: ApprovalStore,
    notifications: NotificationStore,
}

impl StageApprovalService {
    pub fn new(
        projects: ProjectStore,
        approvals: ApprovalStore,
        notifications: NotificationStore,
    ) -> Self {
        Self {
            projects,
            approvals,
            notifications,
        }
    }

    /// Opens (or re-opens) an approval request. A decision status is routed
    /// through [`Self::transition`] so completion and fan-out still apply.
    pub async fn request(
        &self,
        project_id: &str,
        stage: Stage,
        status: Option<ApprovalStatus>,
        actor_id: &str,
    ) -> Result<TransitionOutcome> {
        let status = status.unwrap_or(ApprovalStatus::Pending);
        if status.is_decision() {
            return self
                .transition(StageTransition {
                    project_id: project_id.to_string(),
                    stage,
                    status,
                    comment: None,
                    actor_id: actor_id.to_string(),
                })
                .await;
        }

        let project = self.projects.get(project_id).await?;
        let approval = self
            .approvals
            .upsert(&ApprovalWrite {
                project_id,
                stage,
                status,
                requested_by: Some(actor_id),
                approved_by: None,
                approved_at: None,
                comment: None,
            })
            .await?;
        tracing::info!(project_id, stage = %stage, actor_id, "Stage approval requested");

        let mut outgoing = Vec::new();
        if project.owner_id != actor_id {
            outgoing.push(
                Outgoing::new(
                    project.owner_id.clone(),
                    NotificationKind::StageApprovalRequested,
                    "Stage approval requested",
                    format!(
                        "Approval was requested for the {} stage of \"{}\".",
                        stage.label(),
                        project.name
                    ),
                )
                .with_link(project_link(&project.id)),
            );
        }
        let notified = send_best_effort(&self.notifications, outgoing).await;

        Ok(TransitionOutcome {
            approval,
            notified,
            project_completed: false,
        })
    }

    pub async fn transition(&self, request: StageTransition) -> Result<TransitionOutcome> {
        let project = self.projects.get(&request.project_id).await?;
        let existing = self
            .approvals
            .find(&request.project_id, request.stage)
            .await?;

        let requested_by = existing
            .as_ref()
            .and_then(|row| row.requested_by.clone())
            .unwrap_or_else(|| request.actor_id.clone());
        let (approved_by, approved_at) = if request.status.is_decision() {
            (Some(request.actor_id.as_str()), Some(now_ts()))
        } else {
            (None, None)
        };
        let comment = request
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|comment| !comment.is_empty());

        let approval = self
            .approvals
            .upsert(&ApprovalWrite {
                project_id: &request.project_id,
                stage: request.stage,
                status: request.status,
                requested_by: Some(requested_by.as_str()),
                approved_by,
                approved_at,
                comment,
            })
            .await?;
        tracing::info!(
            project_id = %request.project_id,
            stage = %request.stage,
            status = %request.status,
            actor_id = %request.actor_id,
            "Stage approval updated"
        );

        let mut notified = 0;
        let mut project_completed = false;
        match request.status {
            ApprovalStatus::Approved => {
                let outgoing = vec![approved_notification(
                    &project,
                    request.stage,
                    &requested_by,
                )];
                notified = send_best_effort(&self.notifications, outgoing).await;
                project_completed = self.complete_if_all_approved(&project).await?;
            }
            ApprovalStatus::Rejected => {
                // The requester is only reached here when they are a member.
                let members = self.projects.member_ids(&project.id).await?;
                let outgoing = rejected_notifications(
                    &project,
                    request.stage,
                    &members,
                    &request.actor_id,
                    comment,
                );
                notified = send_best_effort(&self.notifications, outgoing).await;
            }
            ApprovalStatus::Pending => {}
        }

        Ok(TransitionOutcome {
            approval,
            notified,
            project_completed,
        })
    }

    pub async fn list_for_project(&self, project_id: &str) -> Result<ProjectApprovals> {
        let project = self.projects.get(project_id).await?;
        let approvals = self.approvals.list_for_project(project_id).await?;
        let stages = Stage::ALL
            .iter()
            .map(|stage| StageSummary {
                stage_id: stage.id(),
                label: stage.label(),
                status: approvals
                    .iter()
                    .find(|row| row.stage_id == stage.id())
                    .map(|row| row.status),
                deadline: project.stage_deadlines.get(stage.id()).cloned(),
            })
            .collect();
        let completed = all_stages_approved(approved_stage_ids(&approvals));
        Ok(ProjectApprovals {
            project_id: project.id,
            approvals,
            stages,
            completed,
        })
    }

    async fn complete_if_all_approved(&self, project: &Project) -> Result<bool> {
        let approvals = self.approvals.list_for_project(&project.id).await?;
        if !all_stages_approved(approved_stage_ids(&approvals)) {
            return Ok(false);
        }
        if project.status != ProjectStatus::Completed || project.progress != 100 {
            self.projects.mark_completed(&project.id).await?;
            tracing::info!(project_id = %project.id, "All stages approved; project completed");
        }
        Ok(true)
    }
}

fn approved_stage_ids(approvals: &[StageApproval]) -> impl Iterator<Item = &str> {
    approvals
        .iter()
        .filter(|row| row.status == ApprovalStatus::Approved)
        .map(|row| row.stage_id.as_str())
}

pub fn project_link(project_id: &str) -> String {
    format!("/projects/{project_id}")
}

fn approved_notification(project: &Project, stage: Stage, requested_by: &str) -> Outgoing {
    Outgoing::new(
        requested_by,
        NotificationKind::StageApproved,
        "Stage approved",
        format!(
            "The {} stage of \"{}\" was approved.",
            stage.label(),
            project.name
        ),
    )
    .with_link(project_link(&project.id))
}

fn rejected_notifications(
    project: &Project,
    stage: Stage,
    member_ids: &[String],
    actor_id: &str,
    comment: Option<&str>,
) -> Vec<Outgoing> {
    let mut message = format!(
        "The {} stage of \"{}\" was rejected.",
        stage.label(),
        project.name
    );
    if let Some(comment) = comment {
        message.push_str(&format!(" Reason: {comment}"));
    }

    member_ids
        .iter()
        .map(String::as_str)
        .filter(|member| *member != actor_id)
        .map(|member| {
            Outgoing::new(
                member,
                NotificationKind::StageRejected,
                "Stage rejected",
                message.clone(),
            )
            .with_link(project_link(&project.id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn project() -> Project {
        Project {
            id: "p1".to_string(),
            name: "Bridge".to_string(),
            description: None,
            status: ProjectStatus::InProgress,
            progress: 40,
            owner_id: "owner".to_string(),
            stage_deadlines: BTreeMap::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn rejection_skips_actor_and_embeds_comment() {
        let members = vec![
            "owner".to_string(),
            "alice".to_string(),
            "bob".to_string(),
        ];
        let out = rejected_notifications(
            &project(),
            Stage::Planning,
            &members,
            "alice",
            Some("budget missing"),
        );
        let recipients: Vec<&str> = out.iter().map(|n| n.user_id.as_str()).collect();
        assert_eq!(recipients, vec!["owner", "bob"]);
        assert!(out
            .iter()
            .all(|n| n.message.contains("Reason: budget missing")));
        assert!(out.iter().all(|n| n.kind == NotificationKind::StageRejected));
    }

    #[test]
    fn rejection_without_comment_has_plain_message() {
        let members = vec!["owner".to_string()];
        let out = rejected_notifications(&project(), Stage::Closure, &members, "x", None);
        assert_eq!(out.len(), 1);
        assert!(!out[0].message.contains("Reason"));
        assert_eq!(out[0].link.as_deref(), Some("/projects/p1"));
    }

    #[test]
    fn approval_notifies_requester() {
        let out = approved_notification(&project(), Stage::Execution, "req");
        assert_eq!(out.user_id, "req");
        assert_eq!(out.kind, NotificationKind::StageApproved);
        assert!(out.message.contains("Execution"));
    }
}
