//! Blocker lifecycle and its one-shot notifications.

use crate::blocker_fsm::{self, BlockerStatus};
use crate::blockers::{Blocker, BlockerStore, BlockerUpdate, NewBlockerInput};
use crate::db::now_ts;
use crate::error::{ProjectHubError, Result};
use crate::notifications::{send_best_effort, NotificationKind, NotificationStore, Outgoing};
use crate::projects::ProjectStore;
use crate::tasks::{Task, TaskStore};

#[derive(Debug, Clone, Default)]
pub struct BlockerPatch {
    /// `Some("")` unassigns.
    pub assignee_id: Option<String>,
    pub status: Option<BlockerStatus>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct BlockerService {
    blockers: BlockerStore,
    tasks: TaskStore,
    projects: ProjectStore,
    notifications: NotificationStore,
}

impl BlockerService {
    pub fn new(
        blockers: BlockerStore,
        tasks: TaskStore,
        projects: ProjectStore,
        notifications: NotificationStore,
    ) -> Self {
        Self {
            blockers,
            tasks,
            projects,
            notifications,
        }
    }

    pub async fn report(
        &self,
        task_id: &str,
        reason: Option<&str>,
        notes: Option<&str>,
        actor_id: &str,
    ) -> Result<Blocker> {
        let task = self.tasks.get(task_id).await?;
        let blocker = self
            .blockers
            .create(&NewBlockerInput {
                task_id: &task.id,
                project_id: &task.project_id,
                reporter_id: actor_id,
                reason: reason.map(str::trim).filter(|value| !value.is_empty()),
                notes,
            })
            .await?;
        tracing::info!(blocker_id = %blocker.id, task_id, actor_id, "Blocker reported");

        let project = self.projects.get(&task.project_id).await?;
        if project.owner_id != actor_id {
            let mut message = format!("A blocker was reported on task \"{}\".", task.title);
            if let Some(reason) = &blocker.reason {
                message.push_str(&format!(" Reason: {reason}"));
            }
            let outgoing = vec![Outgoing::new(
                project.owner_id,
                NotificationKind::BlockerReported,
                "Blocker reported",
                message,
            )
            .with_link(blocker_link(&blocker))];
            send_best_effort(&self.notifications, outgoing).await;
        }
        Ok(blocker)
    }

    pub async fn update(&self, id: &str, patch: &BlockerPatch, actor_id: &str) -> Result<Blocker> {
        let current = self.blockers.get(id).await?;

        let assignee_id = match patch.assignee_id.as_deref().map(str::trim) {
            Some("") => None,
            Some(assignee) => Some(assignee.to_string()),
            None => current.assignee_id.clone(),
        };
        let target = next_status(current.status, patch.status, assignee_id.as_deref());
        let status = blocker_fsm::transition(current.status, target).ok_or_else(|| {
            ProjectHubError::Conflict(format!(
                "cannot move blocker from {} to {}",
                current.status, target
            ))
        })?;

        let resolved_at = if status.is_terminal() {
            if current.status.is_terminal() {
                current.resolved_at
            } else {
                Some(now_ts())
            }
        } else {
            None
        };
        let notes = patch.notes.as_deref().or(current.notes.as_deref());

        let updated = self
            .blockers
            .update(
                id,
                &BlockerUpdate {
                    assignee_id: assignee_id.as_deref(),
                    notes,
                    status,
                    resolved_at,
                },
            )
            .await?;
        tracing::info!(
            blocker_id = id,
            from = %current.status,
            to = %updated.status,
            actor_id,
            "Blocker updated"
        );

        let task = self.tasks.get(&updated.task_id).await.ok();
        let outgoing = transition_notifications(&current, &updated, task.as_ref(), actor_id);
        send_best_effort(&self.notifications, outgoing).await;
        Ok(updated)
    }

    pub async fn list(
        &self,
        project_id: Option<&str>,
        task_id: Option<&str>,
        status: Option<BlockerStatus>,
    ) -> Result<Vec<Blocker>> {
        self.blockers.list(project_id, task_id, status).await
    }
}

/// An explicit status wins; otherwise assigning an Open blocker moves it to
/// Assigned and unassigning an Assigned one moves it back to Open.
fn next_status(
    current: BlockerStatus,
    requested: Option<BlockerStatus>,
    assignee_id: Option<&str>,
) -> BlockerStatus {
    match requested {
        Some(status) => status,
        None if current == BlockerStatus::Open && assignee_id.is_some() => BlockerStatus::Assigned,
        None if current == BlockerStatus::Assigned && assignee_id.is_none() => BlockerStatus::Open,
        None => current,
    }
}

fn transition_notifications(
    before: &Blocker,
    after: &Blocker,
    task: Option<&Task>,
    actor_id: &str,
) -> Vec<Outgoing> {
    let task_title = task.map(|task| task.title.as_str()).unwrap_or("a task");
    let mut outgoing = Vec::new();

    if let Some(assignee) = after.assignee_id.as_deref() {
        if before.assignee_id.as_deref() != Some(assignee) && assignee != actor_id {
            outgoing.push(
                Outgoing::new(
                    assignee,
                    NotificationKind::BlockerAssigned,
                    "Blocker assigned to you",
                    format!("You were assigned a blocker on \"{task_title}\"."),
                )
                .with_link(blocker_link(after)),
            );
        }
    }

    if after.status.is_terminal() && after.status != before.status && after.reporter_id != actor_id
    {
        let (kind, title, verb) = match after.status {
            BlockerStatus::Closed => (NotificationKind::BlockerClosed, "Blocker closed", "closed"),
            _ => (
                NotificationKind::BlockerResolved,
                "Blocker resolved",
                "resolved",
            ),
        };
        outgoing.push(
            Outgoing::new(
                after.reporter_id.clone(),
                kind,
                title,
                format!("The blocker you reported on \"{task_title}\" was {verb}."),
            )
            .with_link(blocker_link(after)),
        );
    }

    outgoing
}

fn blocker_link(blocker: &Blocker) -> String {
    format!("/projects/{}/blockers/{}", blocker.project_id, blocker.id)
}
