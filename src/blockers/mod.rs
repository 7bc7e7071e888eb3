use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::blocker_fsm::BlockerStatus;
use crate::db::{new_id, now_ts, parse_stored, Database};
use crate::error::{ProjectHubError, Result};

mod schema;
use schema::blockers;

#[derive(Debug, Clone, Serialize)]
pub struct Blocker {
    pub id: String,
    pub task_id: String,
    pub project_id: String,
    pub reporter_id: String,
    pub assignee_id: Option<String>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: BlockerStatus,
    pub resolved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewBlockerInput<'a> {
    pub task_id: &'a str,
    pub project_id: &'a str,
    pub reporter_id: &'a str,
    pub reason: Option<&'a str>,
    pub notes: Option<&'a str>,
}

/// Full replacement of the mutable blocker fields.
#[derive(Debug, Clone)]
pub struct BlockerUpdate<'a> {
    pub assignee_id: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub status: BlockerStatus,
    pub resolved_at: Option<i64>,
}

#[derive(Queryable)]
struct BlockerRow {
    id: String,
    task_id: String,
    project_id: String,
    reporter_id: String,
    assignee_id: Option<String>,
    reason: Option<String>,
    notes: Option<String>,
    status: String,
    resolved_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = blockers)]
struct NewBlocker<'a> {
    id: &'a str,
    task_id: &'a str,
    project_id: &'a str,
    reporter_id: &'a str,
    assignee_id: Option<&'a str>,
    reason: Option<&'a str>,
    notes: Option<&'a str>,
    status: &'a str,
    resolved_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = blockers, treat_none_as_null = true)]
struct BlockerChangeset<'a> {
    assignee_id: Option<&'a str>,
    notes: Option<&'a str>,
    status: &'a str,
    resolved_at: Option<i64>,
    updated_at: i64,
}

#[derive(Clone)]
pub struct BlockerStore {
    db: Database,
}

impl BlockerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: &NewBlockerInput<'_>) -> Result<Blocker> {
        let id = new_id();
        let now = now_ts();
        let new = NewBlocker {
            id: &id,
            task_id: input.task_id,
            project_id: input.project_id,
            reporter_id: input.reporter_id,
            assignee_id: None,
            reason: input.reason,
            notes: input.notes,
            status: BlockerStatus::Open.as_str(),
            resolved_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(blockers::table)
            .values(&new)
            .execute(&mut conn)
            .await?;
        let row: BlockerRow = blockers::table
            .filter(blockers::id.eq(&id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn get(&self, id: &str) -> Result<Blocker> {
        let mut conn = self.db.conn().await?;
        let row: Option<BlockerRow> = blockers::table
            .filter(blockers::id.eq(id))
            .first(&mut conn)
            .await
            .optional()?;
        row.map(map_row)
            .ok_or_else(|| ProjectHubError::NotFound(format!("blocker {id}")))
    }

    pub async fn update(&self, id: &str, update: &BlockerUpdate<'_>) -> Result<Blocker> {
        let changes = BlockerChangeset {
            assignee_id: update.assignee_id,
            notes: update.notes,
            status: update.status.as_str(),
            resolved_at: update.resolved_at,
            updated_at: now_ts(),
        };
        let mut conn = self.db.conn().await?;
        let updated = diesel::update(blockers::table.filter(blockers::id.eq(id)))
            .set(&changes)
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(ProjectHubError::NotFound(format!("blocker {id}")));
        }
        let row: BlockerRow = blockers::table
            .filter(blockers::id.eq(id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn list(
        &self,
        project_id: Option<&str>,
        task_id: Option<&str>,
        status: Option<BlockerStatus>,
    ) -> Result<Vec<Blocker>> {
        let mut conn = self.db.conn().await?;
        let mut query = blockers::table.into_boxed();
        if let Some(project_id) = project_id {
            query = query.filter(blockers::project_id.eq(project_id));
        }
        if let Some(task_id) = task_id {
            query = query.filter(blockers::task_id.eq(task_id));
        }
        if let Some(status) = status {
            query = query.filter(blockers::status.eq(status.as_str()));
        }
        let rows: Vec<BlockerRow> = query
            .order(blockers::created_at.desc())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }
}

fn map_row(row: BlockerRow) -> Blocker {
    Blocker {
        id: row.id,
        task_id: row.task_id,
        project_id: row.project_id,
        reporter_id: row.reporter_id,
        assignee_id: row.assignee_id,
        reason: row.reason,
        notes: row.notes,
        status: parse_stored(&row.status, "blockers.status", BlockerStatus::Open),
        resolved_at: row.resolved_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
