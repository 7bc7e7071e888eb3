use crate::error::Result;
use crate::notifications::{send_best_effort, NotificationKind, NotificationStore, Outgoing};
use crate::projects::ProjectStore;
use crate::tasks::{NewTaskInput, Task, TaskChanges, TaskStore};

/// Task writes plus the assignment notification.
#[derive(Clone)]
pub struct TaskService {
    tasks: TaskStore,
    projects: ProjectStore,
    notifications: NotificationStore,
}

impl TaskService {
    pub fn new(tasks: TaskStore, projects: ProjectStore, notifications: NotificationStore) -> Self {
        Self {
            tasks,
            projects,
            notifications,
        }
    }

    pub async fn create(&self, input: &NewTaskInput, actor_id: &str) -> Result<Task> {
        let project = self.projects.get(&input.project_id).await?;
        let task = self.tasks.create(input).await?;
        tracing::debug!(task_id = %task.id, project_id = %project.id, "Created task");
        self.notify_assignee(None, &task, &project.name, actor_id).await;
        Ok(task)
    }

    pub async fn update(&self, id: &str, changes: &TaskChanges, actor_id: &str) -> Result<Task> {
        let before = self.tasks.get(id).await?;
        let task = self.tasks.update(id, changes).await?;
        let project_name = self
            .projects
            .get(&task.project_id)
            .await
            .map(|project| project.name)
            .unwrap_or_default();
        self.notify_assignee(before.assignee.as_deref(), &task, &project_name, actor_id).await;
        Ok(task)
    }

    async fn notify_assignee(
        &self,
        previous: Option<&str>,
        task: &Task,
        project_name: &str,
        actor_id: &str,
    ) {
        let Some(assignee) = task.assignee.as_deref() else {
            return;
        };
        if previous == Some(assignee) || assignee == actor_id {
            return;
        }
        let outgoing = vec![Outgoing::new(
            assignee,
            NotificationKind::TaskAssigned,
            "Task assigned to you",
            format!("You were assigned \"{}\" in \"{}\".", task.title, project_name),
        )
        .with_link(format!("/projects/{}/tasks/{}", task.project_id, task.id))];
        send_best_effort(&self.notifications, outgoing).await;
    }
}
