use std::fmt;
use std::str::FromStr;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::db::{new_id, now_ts, parse_stored, Database};
use crate::error::{ProjectHubError, Result};
use crate::stages::Stage;

mod schema;
use schema::project_stage_approvals as approvals;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "Pending",
            ApprovalStatus::Approved => "Approved",
            ApprovalStatus::Rejected => "Rejected",
        }
    }

    /// Approved and Rejected carry an approver and a decision time.
    pub fn is_decision(self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::Rejected)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = ProjectHubError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(ProjectHubError::Validation(format!(
                "unknown approval status: {}",
                value.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageApproval {
    pub id: String,
    pub project_id: String,
    pub stage_id: String,
    pub status: ApprovalStatus,
    pub requested_by: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,
    pub comment: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Values written by [`ApprovalStore::upsert`]; the row is keyed by
/// (project, stage).
#[derive(Debug, Clone)]
pub struct ApprovalWrite<'a> {
    pub project_id: &'a str,
    pub stage: Stage,
    pub status: ApprovalStatus,
    pub requested_by: Option<&'a str>,
    pub approved_by: Option<&'a str>,
    pub approved_at: Option<i64>,
    pub comment: Option<&'a str>,
}

#[derive(Queryable)]
struct ApprovalRow {
    id: String,
    project_id: String,
    stage_id: String,
    status: String,
    requested_by: Option<String>,
    approved_by: Option<String>,
    approved_at: Option<i64>,
    comment: Option<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = approvals)]
struct NewApproval<'a> {
    id: &'a str,
    project_id: &'a str,
    stage_id: &'a str,
    status: &'a str,
    requested_by: Option<&'a str>,
    approved_by: Option<&'a str>,
    approved_at: Option<i64>,
    comment: Option<&'a str>,
    created_at: i64,
    updated_at: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = approvals, treat_none_as_null = true)]
struct ApprovalChangeset<'a> {
    status: &'a str,
    requested_by: Option<&'a str>,
    approved_by: Option<&'a str>,
    approved_at: Option<i64>,
    comment: Option<&'a str>,
    updated_at: i64,
}

#[derive(Clone)]
pub struct ApprovalStore {
    db: Database,
}

impl ApprovalStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn find(&self, project_id: &str, stage: Stage) -> Result<Option<StageApproval>> {
        let mut conn = self.db.conn().await?;
        let row: Option<ApprovalRow> = approvals::table
            .filter(approvals::project_id.eq(project_id))
            .filter(approvals::stage_id.eq(stage.id()))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(map_row))
    }

    /// Inserts or overwrites the (project, stage) row. Concurrent writers
    /// are not serialized; the last write wins.
    pub async fn upsert(&self, write: &ApprovalWrite<'_>) -> Result<StageApproval> {
        let now = now_ts();
        let id = new_id();
        let new = NewApproval {
            id: &id,
            project_id: write.project_id,
            stage_id: write.stage.id(),
            status: write.status.as_str(),
            requested_by: write.requested_by,
            approved_by: write.approved_by,
            approved_at: write.approved_at,
            comment: write.comment,
            created_at: now,
            updated_at: now,
        };
        let changes = ApprovalChangeset {
            status: write.status.as_str(),
            requested_by: write.requested_by,
            approved_by: write.approved_by,
            approved_at: write.approved_at,
            comment: write.comment,
            updated_at: now,
        };

        let mut conn = self.db.conn().await?;
        diesel::insert_into(approvals::table)
            .values(&new)
            .on_conflict((approvals::project_id, approvals::stage_id))
            .do_update()
            .set(&changes)
            .execute(&mut conn)
            .await?;

        let row: ApprovalRow = approvals::table
            .filter(approvals::project_id.eq(write.project_id))
            .filter(approvals::stage_id.eq(write.stage.id()))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn list_for_project(&self, project_id: &str) -> Result<Vec<StageApproval>> {
        let mut conn = self.db.conn().await?;
        let rows: Vec<ApprovalRow> = approvals::table
            .filter(approvals::project_id.eq(project_id))
            .order(approvals::created_at.asc())
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    /// Number of rows for the pair; the unique index keeps this at 0 or 1.
    pub async fn count_for_stage(&self, project_id: &str, stage: Stage) -> Result<i64> {
        let mut conn = self.db.conn().await?;
        let count: i64 = approvals::table
            .filter(approvals::project_id.eq(project_id))
            .filter(approvals::stage_id.eq(stage.id()))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }
}

fn map_row(row: ApprovalRow) -> StageApproval {
    StageApproval {
        id: row.id,
        project_id: row.project_id,
        stage_id: row.stage_id,
        status: parse_stored(
            &row.status,
            "project_stage_approvals.status",
            ApprovalStatus::Pending,
        ),
        requested_by: row.requested_by,
        approved_by: row.approved_by,
        approved_at: row.approved_at,
        comment: row.comment,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_status_parsing() {
        assert_eq!(
            "approved".parse::<ApprovalStatus>().unwrap(),
            ApprovalStatus::Approved
        );
        assert_eq!(
            " Rejected ".parse::<ApprovalStatus>().unwrap(),
            ApprovalStatus::Rejected
        );
        assert!("maybe".parse::<ApprovalStatus>().is_err());
        assert!(ApprovalStatus::Rejected.is_decision());
        assert!(!ApprovalStatus::Pending.is_decision());
    }
}
