use std::collections::BTreeMap;
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
use schema::{project_members, projects};

pub const OWNER_ROLE: &str = "owner";
pub const MEMBER_ROLE: &str = "member";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Pending,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::NotStarted => "Not Started",
            ProjectStatus::InProgress => "In Progress",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::Pending => "Pending",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ProjectHubError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "not started" => Ok(ProjectStatus::NotStarted),
            "in progress" => Ok(ProjectStatus::InProgress),
            "completed" => Ok(ProjectStatus::Completed),
            "pending" => Ok(ProjectStatus::Pending),
            _ => Err(ProjectHubError::Validation(format!(
                "unknown project status: {}",
                value.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub progress: i32,
    pub owner_id: String,
    pub stage_deadlines: BTreeMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    /// Deadlines keyed by stage; entries that no longer parse are skipped.
    pub fn stage_deadline_dates(&self) -> Vec<(Stage, NaiveDate)> {
        self.stage_deadlines
            .iter()
            .filter_map(|(stage, date)| {
                let stage = stage.parse::<Stage>().ok()?;
                let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
                Some((stage, date))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub role: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewProjectInput {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub stage_deadlines: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub progress: Option<i32>,
    pub stage_deadlines: Option<BTreeMap<String, String>>,
}

#[derive(Queryable)]
struct ProjectRow {
    id: String,
    name: String,
    description: Option<String>,
    status: String,
    progress: i32,
    owner_id: String,
    stage_deadlines_json: Option<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = projects)]
struct NewProject<'a> {
    id: &'a str,
    name: &'a str,
    description: Option<&'a str>,
    status: &'a str,
    progress: i32,
    owner_id: &'a str,
    stage_deadlines_json: Option<&'a str>,
    created_at: i64,
    updated_at: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = projects)]
struct ProjectChangeset<'a> {
    name: Option<&'a str>,
    description: Option<&'a str>,
    status: Option<&'a str>,
    progress: Option<i32>,
    stage_deadlines_json: Option<String>,
    updated_at: i64,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = project_members)]
struct MemberRow {
    project_id: String,
    user_id: String,
    role: String,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = project_members)]
struct NewMember<'a> {
    project_id: &'a str,
    user_id: &'a str,
    role: &'a str,
    created_at: i64,
}

#[derive(Clone)]
pub struct ProjectStore {
    db: Database,
}

impl ProjectStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, owner_id: &str, input: &NewProjectInput) -> Result<Project> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ProjectHubError::Validation(
                "project name is required".to_string(),
            ));
        }
        let deadlines_json = match &input.stage_deadlines {
            Some(deadlines) => Some(encode_deadlines(&normalize_stage_deadlines(deadlines)?)?),
            None => None,
        };

        let id = new_id();
        let now = now_ts();
        let status = input.status.unwrap_or(ProjectStatus::NotStarted);
        let new = NewProject {
            id: &id,
            name,
            description: input.description.as_deref(),
            status: status.as_str(),
            progress: 0,
            owner_id,
            stage_deadlines_json: deadlines_json.as_deref(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(projects::table)
            .values(&new)
            .execute(&mut conn)
            .await?;
        diesel::insert_into(project_members::table)
            .values(&NewMember {
                project_id: &id,
                user_id: owner_id,
                role: OWNER_ROLE,
                created_at: now,
            })
            .execute(&mut conn)
            .await?;

        tracing::debug!(project_id = %id, owner_id, "Created project");
        let row: ProjectRow = projects::table
            .filter(projects::id.eq(&id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn get(&self, id: &str) -> Result<Project> {
        let mut conn = self.db.conn().await?;
        let row: Option<ProjectRow> = projects::table
            .filter(projects::id.eq(id))
            .first(&mut conn)
            .await
            .optional()?;
        row.map(map_row)
            .ok_or_else(|| ProjectHubError::NotFound(format!("project {id}")))
    }

    /// Projects the user owns or is a member of, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Project>> {
        let mut conn = self.db.conn().await?;
        let member_of: Vec<String> = project_members::table
            .filter(project_members::user_id.eq(user_id))
            .select(project_members::project_id)
            .load(&mut conn)
            .await?;
        let rows: Vec<ProjectRow> = projects::table
            .filter(
                projects::owner_id
                    .eq(user_id)
                    .or(projects::id.eq_any(&member_of)),
            )
            .order(projects::created_at.desc())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    /// Projects that are not yet Completed.
    pub async fn list_active(&self) -> Result<Vec<Project>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<ProjectRow> = projects::table
            .filter(projects::status.ne(ProjectStatus::Completed.as_str()))
            .order(projects::created_at.asc())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn update(&self, id: &str, changes: &ProjectChanges) -> Result<Project> {
        if let Some(progress) = changes.progress {
            if !(0..=100).contains(&progress) {
                return Err(ProjectHubError::Validation(
                    "progress must be between 0 and 100".to_string(),
                ));
            }
        }
        if let Some(name) = &changes.name {
            if name.trim().is_empty() {
                return Err(ProjectHubError::Validation(
                    "project name must not be empty".to_string(),
                ));
            }
        }
        let deadlines_json = match &changes.stage_deadlines {
            Some(deadlines) => Some(encode_deadlines(&normalize_stage_deadlines(deadlines)?)?),
            None => None,
        };

        let changeset = ProjectChangeset {
            name: changes.name.as_deref().map(str::trim),
            description: changes.description.as_deref(),
            status: changes.status.map(ProjectStatus::as_str),
            progress: changes.progress,
            stage_deadlines_json: deadlines_json,
            updated_at: now_ts(),
        };

        let mut conn = self.db.conn().await?;
        let updated = diesel::update(projects::table.filter(projects::id.eq(id)))
            .set(&changeset)
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(ProjectHubError::NotFound(format!("project {id}")));
        }
        let row: ProjectRow = projects::table
            .filter(projects::id.eq(id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn mark_completed(&self, id: &str) -> Result<Project> {
        self.update(
            id,
            &ProjectChanges {
                status: Some(ProjectStatus::Completed),
                progress: Some(100),
                ..ProjectChanges::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let count = diesel::delete(projects::table.filter(projects::id.eq(id)))
            .execute(&mut conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn add_member(
        &self,
        project_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<ProjectMember> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ProjectHubError::Validation("userId is required".to_string()));
        }
        let role = match role.trim() {
            "" => MEMBER_ROLE,
            other => other,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(project_members::table)
            .values(&NewMember {
                project_id,
                user_id,
                role,
                created_at: now_ts(),
            })
            .on_conflict((project_members::project_id, project_members::user_id))
            .do_update()
            .set(project_members::role.eq(role))
            .execute(&mut conn)
            .await?;

        let row: MemberRow = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .filter(project_members::user_id.eq(user_id))
            .select(MemberRow::as_select())
            .first(&mut conn)
            .await?;
        Ok(map_member(row))
    }

    pub async fn remove_member(&self, project_id: &str, user_id: &str) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let count = diesel::delete(
            project_members::table
                .filter(project_members::project_id.eq(project_id))
                .filter(project_members::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        Ok(count > 0)
    }

    pub async fn list_members(&self, project_id: &str) -> Result<Vec<ProjectMember>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<MemberRow> = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .order(project_members::id.asc())
            .select(MemberRow::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_member).collect())
    }

    pub async fn member_ids(&self, project_id: &str) -> Result<Vec<String>> {
        let mut conn = self.db.conn().await?;
        let ids: Vec<String> = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .order(project_members::id.asc())
            .select(project_members::user_id)
            .load(&mut conn)
            .await?;
        Ok(ids)
    }
}

/// Rewrites keys to canonical stage ids and checks every value is an ISO
/// date.
pub fn normalize_stage_deadlines(
    deadlines: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (key, value) in deadlines {
        let stage: Stage = key.parse()?;
        let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
            ProjectHubError::Validation(format!(
                "deadline for stage {stage} must be YYYY-MM-DD, got {value}"
            ))
        })?;
        out.insert(stage.id().to_string(), date.format("%Y-%m-%d").to_string());
    }
    Ok(out)
}

fn encode_deadlines(deadlines: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(deadlines).map_err(|e| ProjectHubError::Runtime(e.to_string()))
}

fn map_row(row: ProjectRow) -> Project {
    Project {
        id: row.id,
        name: row.name,
        description: row.description,
        status: parse_stored(&row.status, "projects.status", ProjectStatus::NotStarted),
        progress: row.progress,
        owner_id: row.owner_id,
        stage_deadlines: row
            .stage_deadlines_json
            .and_then(|value| serde_json::from_str(&value).ok())
            .unwrap_or_default(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn map_member(row: MemberRow) -> ProjectMember {
    ProjectMember {
        project_id: row.project_id,
        user_id: row.user_id,
        role: row.role,
        created_at: row.created_at,
    }
}
