use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::db::{new_id, now_ts, parse_stored, Database};
use crate::error::{ProjectHubError, Result};
use crate::stages::Stage;

mod schema;
use schema::tasks;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "To Do")]
    Todo,
    #[serde(rename = "In Progress")]
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Review => "Review",
            TaskStatus::Done => "Done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ProjectHubError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "to do" | "todo" => Ok(TaskStatus::Todo),
            "in progress" => Ok(TaskStatus::InProgress),
            "review" | "in review" => Ok(TaskStatus::Review),
            "done" | "completed" => Ok(TaskStatus::Done),
            _ => Err(ProjectHubError::Validation(format!(
                "unknown task status: {}",
                value.trim()
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
            TaskPriority::Urgent => "Urgent",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = ProjectHubError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            _ => Err(ProjectHubError::Validation(format!(
                "unknown task priority: {}",
                value.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub stage: Option<Stage>,
    pub due_date: Option<String>,
    pub assignee: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewTaskInput {
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub stage: Option<Stage>,
    pub due_date: Option<String>,
    pub assignee: Option<String>,
}

/// `Some(None)` on the nullable fields clears them.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub stage: Option<Option<Stage>>,
    pub due_date: Option<Option<String>>,
    pub assignee: Option<Option<String>>,
}

#[derive(Queryable)]
struct TaskRow {
    id: String,
    project_id: String,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    stage: Option<String>,
    due_date: Option<String>,
    assignee: Option<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
struct NewTask<'a> {
    id: &'a str,
    project_id: &'a str,
    title: &'a str,
    description: Option<&'a str>,
    status: &'a str,
    priority: &'a str,
    stage: Option<&'a str>,
    due_date: Option<&'a str>,
    assignee: Option<&'a str>,
    created_at: i64,
    updated_at: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = tasks)]
struct TaskChangeset<'a> {
    title: Option<&'a str>,
    description: Option<&'a str>,
    status: Option<&'a str>,
    priority: Option<&'a str>,
    stage: Option<Option<&'a str>>,
    due_date: Option<Option<String>>,
    assignee: Option<Option<&'a str>>,
    updated_at: i64,
}

#[derive(Clone)]
pub struct TaskStore {
    db: Database,
}

impl TaskStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: &NewTaskInput) -> Result<Task> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ProjectHubError::Validation(
                "task title is required".to_string(),
            ));
        }
        let due_date = input.due_date.as_deref().map(normalize_due_date).transpose()?;
        let assignee = input
            .assignee
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        let id = new_id();
        let now = now_ts();
        let new = NewTask {
            id: &id,
            project_id: &input.project_id,
            title,
            description: input.description.as_deref(),
            status: input.status.unwrap_or(TaskStatus::Todo).as_str(),
            priority: input.priority.unwrap_or(TaskPriority::Medium).as_str(),
            stage: input.stage.map(Stage::id),
            due_date: due_date.as_deref(),
            assignee,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(tasks::table)
            .values(&new)
            .execute(&mut conn)
            .await?;
        let row: TaskRow = tasks::table
            .filter(tasks::id.eq(&id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn get(&self, id: &str) -> Result<Task> {
        let mut conn = self.db.conn().await?;
        let row: Option<TaskRow> = tasks::table
            .filter(tasks::id.eq(id))
            .first(&mut conn)
            .await
            .optional()?;
        row.map(map_row)
            .ok_or_else(|| ProjectHubError::NotFound(format!("task {id}")))
    }

    pub async fn list_for_project(
        &self,
        project_id: &str,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        let mut conn = self.db.conn().await?;
        let mut query = tasks::table
            .filter(tasks::project_id.eq(project_id))
            .into_boxed();
        if let Some(status) = status {
            query = query.filter(tasks::status.eq(status.as_str()));
        }
        let rows: Vec<TaskRow> = query
            .order((tasks::due_date.asc(), tasks::created_at.asc()))
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn update(&self, id: &str, changes: &TaskChanges) -> Result<Task> {
        if let Some(title) = &changes.title {
            if title.trim().is_empty() {
                return Err(ProjectHubError::Validation(
                    "task title must not be empty".to_string(),
                ));
            }
        }
        let due_date = match &changes.due_date {
            Some(Some(date)) => Some(Some(normalize_due_date(date)?)),
            Some(None) => Some(None),
            None => None,
        };

        let changeset = TaskChangeset {
            title: changes.title.as_deref().map(str::trim),
            description: changes.description.as_deref(),
            status: changes.status.map(TaskStatus::as_str),
            priority: changes.priority.map(TaskPriority::as_str),
            stage: changes.stage.map(|stage| stage.map(Stage::id)),
            due_date,
            assignee: changes.assignee.as_ref().map(|value| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
            }),
            updated_at: now_ts(),
        };

        let mut conn = self.db.conn().await?;
        let updated = diesel::update(tasks::table.filter(tasks::id.eq(id)))
            .set(&changeset)
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(ProjectHubError::NotFound(format!("task {id}")));
        }
        let row: TaskRow = tasks::table
            .filter(tasks::id.eq(id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let count = diesel::delete(tasks::table.filter(tasks::id.eq(id)))
            .execute(&mut conn)
            .await?;
        Ok(count > 0)
    }
}

fn normalize_due_date(value: &str) -> Result<String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| {
            ProjectHubError::Validation(format!("dueDate must be YYYY-MM-DD, got {value}"))
        })
}

fn map_row(row: TaskRow) -> Task {
    Task {
        id: row.id,
        project_id: row.project_id,
        title: row.title,
        description: row.description,
        status: parse_stored(&row.status, "tasks.status", TaskStatus::Todo),
        priority: parse_stored(&row.priority, "tasks.priority", TaskPriority::Medium),
        stage: row.stage.and_then(|value| value.parse().ok()),
        due_date: row.due_date,
        assignee: row.assignee,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_accepts_board_column_spellings() {
        assert_eq!("todo".parse::<TaskStatus>().unwrap(), TaskStatus::Todo);
        assert_eq!("To Do".parse::<TaskStatus>().unwrap(), TaskStatus::Todo);
        assert_eq!(
            "in-progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
        assert!("archived".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn due_dates_must_be_iso() {
        assert_eq!(normalize_due_date(" 2026-01-05 ").unwrap(), "2026-01-05");
        assert!(normalize_due_date("05/01/2026").is_err());
    }
}
