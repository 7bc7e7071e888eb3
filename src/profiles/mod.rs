use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use crate::db::{now_ts, Database};
use crate::error::{ProjectHubError, Result};

mod schema;
use schema::profiles;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Queryable)]
struct ProfileRow {
    id: String,
    full_name: String,
    email: Option<String>,
    role: Option<String>,
    avatar_url: Option<String>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = profiles)]
struct NewProfile<'a> {
    id: &'a str,
    full_name: &'a str,
    email: Option<&'a str>,
    role: Option<&'a str>,
    avatar_url: Option<&'a str>,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct ProfileStore {
    db: Database,
}

impl ProfileStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the profile on first write; later writes only touch the
    /// fields that are provided.
    pub async fn upsert(&self, id: &str, fields: &ProfileFields) -> Result<Profile> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ProjectHubError::Validation(
                "profile id is required".to_string(),
            ));
        }
        let now = now_ts();
        let mut conn = self.db.conn().await?;
        let existing: Option<ProfileRow> = profiles::table
            .filter(profiles::id.eq(id))
            .first(&mut conn)
            .await
            .optional()?;

        match existing {
            None => {
                let full_name = fields
                    .full_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        ProjectHubError::Validation("fullName is required".to_string())
                    })?;
                let new = NewProfile {
                    id,
                    full_name,
                    email: fields.email.as_deref(),
                    role: fields.role.as_deref(),
                    avatar_url: fields.avatar_url.as_deref(),
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(profiles::table)
                    .values(&new)
                    .execute(&mut conn)
                    .await?;
            }
            Some(row) => {
                let full_name = fields
                    .full_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .unwrap_or(row.full_name);
                diesel::update(profiles::table.filter(profiles::id.eq(id)))
                    .set((
                        profiles::full_name.eq(full_name),
                        profiles::email.eq(fields.email.clone().or(row.email)),
                        profiles::role.eq(fields.role.clone().or(row.role)),
                        profiles::avatar_url.eq(fields.avatar_url.clone().or(row.avatar_url)),
                        profiles::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
        }

        let row: ProfileRow = profiles::table
            .filter(profiles::id.eq(id))
            .first(&mut conn)
            .await?;
        Ok(map_row(row))
    }

    pub async fn get(&self, id: &str) -> Result<Profile> {
        let mut conn = self.db.conn().await?;
        let row: Option<ProfileRow> = profiles::table
            .filter(profiles::id.eq(id))
            .first(&mut conn)
            .await
            .optional()?;
        row.map(map_row)
            .ok_or_else(|| ProjectHubError::NotFound(format!("profile {id}")))
    }
}

fn map_row(row: ProfileRow) -> Profile {
    Profile {
        id: row.id,
        full_name: row.full_name,
        email: row.email,
        role: row.role,
        avatar_url: row.avatar_url,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
