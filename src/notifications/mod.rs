use std::fmt;
use std::str::FromStr;

use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::db::{new_id, now_ts, Database};
use crate::error::{ProjectHubError, Result};

mod schema;
use schema::notifications;

const MAX_LIST_LIMIT: i64 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StageApprovalRequested,
    StageApproved,
    StageRejected,
    StageDeadline,
    BlockerReported,
    BlockerAssigned,
    BlockerResolved,
    BlockerClosed,
    TaskAssigned,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::StageApprovalRequested => "stage_approval_requested",
            NotificationKind::StageApproved => "stage_approved",
            NotificationKind::StageRejected => "stage_rejected",
            NotificationKind::StageDeadline => "stage_deadline",
            NotificationKind::BlockerReported => "blocker_reported",
            NotificationKind::BlockerAssigned => "blocker_assigned",
            NotificationKind::BlockerResolved => "blocker_resolved",
            NotificationKind::BlockerClosed => "blocker_closed",
            NotificationKind::TaskAssigned => "task_assigned",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ProjectHubError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match value.trim() {
            "stage_approval_requested" => NotificationKind::StageApprovalRequested,
            "stage_approved" => NotificationKind::StageApproved,
            "stage_rejected" => NotificationKind::StageRejected,
            "stage_deadline" => NotificationKind::StageDeadline,
            "blocker_reported" => NotificationKind::BlockerReported,
            "blocker_assigned" => NotificationKind::BlockerAssigned,
            "blocker_resolved" => NotificationKind::BlockerResolved,
            "blocker_closed" => NotificationKind::BlockerClosed,
            "task_assigned" => NotificationKind::TaskAssigned,
            other => {
                return Err(ProjectHubError::Validation(format!(
                    "unknown notification type: {other}"
                )))
            }
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: Option<String>,
    pub created_at: i64,
    pub is_read: bool,
}

/// A notification waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub link: Option<String>,
}

impl Outgoing {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            kind,
            link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[derive(Queryable)]
struct NotificationRow {
    id: String,
    user_id: String,
    title: String,
    message: String,
    kind: String,
    link: Option<String>,
    created_at: i64,
    is_read: bool,
}

#[derive(Insertable)]
#[diesel(table_name = notifications)]
struct NewNotification {
    id: String,
    user_id: String,
    title: String,
    message: String,
    kind: String,
    link: Option<String>,
    created_at: i64,
    is_read: bool,
}

#[derive(Clone)]
pub struct NotificationStore {
    db: Database,
}

impl NotificationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Plain insert-many: no delivery, ordering or retry guarantees.
    /// Returns the number of rows inserted.
    pub async fn insert_many(&self, outgoing: Vec<Outgoing>) -> Result<usize> {
        if outgoing.is_empty() {
            return Ok(0);
        }
        let now = now_ts();
        let rows: Vec<NewNotification> = outgoing
            .into_iter()
            .map(|item| NewNotification {
                id: new_id(),
                user_id: item.user_id,
                title: item.title,
                message: item.message,
                kind: item.kind.as_str().to_string(),
                link: item.link,
                created_at: now,
                is_read: false,
            })
            .collect();

        // One statement per row: SQLite has no DEFAULT keyword for
        // multi-row inserts with nullable columns.
        let mut conn = self.db.conn().await?;
        let inserted = conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                async move {
                    let mut inserted = 0;
                    for row in &rows {
                        inserted += diesel::insert_into(notifications::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                    Ok(inserted)
                }
                .scope_boxed()
            })
            .await?;
        Ok(inserted)
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let mut conn = self.db.conn().await?;
        let mut query = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .into_boxed();
        if unread_only {
            query = query.filter(notifications::is_read.eq(false));
        }
        let rows: Vec<NotificationRow> = query
            .order((notifications::created_at.desc(), notifications::id.asc()))
            .limit((limit as i64).clamp(1, MAX_LIST_LIMIT))
            .load(&mut conn)
            .await?;
        Ok(rows.into_iter().map(map_row).collect())
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let mut conn = self.db.conn().await?;
        let count: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    /// Marks one of the user's notifications read. Returns false when the
    /// id does not belong to the user.
    pub async fn mark_read(&self, id: &str, user_id: &str) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::id.eq(id))
                .filter(notifications::user_id.eq(user_id)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)
        .await?;
        Ok(updated > 0)
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<usize> {
        let mut conn = self.db.conn().await?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set(notifications::is_read.eq(true))
        .execute(&mut conn)
        .await?;
        Ok(updated)
    }

    pub async fn exists(&self, user_id: &str, kind: NotificationKind, link: &str) -> Result<bool> {
        let mut conn = self.db.conn().await?;
        let count: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::kind.eq(kind.as_str()))
            .filter(notifications::link.eq(link))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }
}

/// Inserts `outgoing`, logging instead of failing. Callers use this after
/// the primary write has already succeeded.
pub async fn send_best_effort(store: &NotificationStore, outgoing: Vec<Outgoing>) -> usize {
    let expected = outgoing.len();
    match store.insert_many(outgoing).await {
        Ok(inserted) => inserted,
        Err(err) => {
            tracing::warn!(expected, "Notification insert failed: {}", err);
            0
        }
    }
}

fn map_row(row: NotificationRow) -> Notification {
    Notification {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        message: row.message,
        kind: row.kind,
        link: row.link,
        created_at: row.created_at,
        is_read: row.is_read,
    }
}
