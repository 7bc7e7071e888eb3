use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{ProjectHubError, Result};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
const CONNECTION_PRAGMAS: &str = "PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;";
const DEFAULT_MAX_CONNECTIONS: u32 = 8;

pub type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
pub type SqlitePool = Pool<SqliteAsyncConn>;
pub type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

/// Shared handle to the SQLite database. Cloning shares the pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open(sqlite_path: impl AsRef<str>) -> Result<Self> {
        Self::open_with_pool_size(sqlite_path, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn open_with_pool_size(
        sqlite_path: impl AsRef<str>,
        max_connections: u32,
    ) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .max_size(max_connections.max(1))
            .build(manager)
            .await
            .map_err(|e| ProjectHubError::Database(e.to_string()))?;
        tracing::debug!(path = sqlite_path, max_connections, "Opened database pool");
        Ok(Self { pool })
    }

    pub async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| ProjectHubError::Database(e.to_string()))?;
        apply_pragmas_async(&mut conn).await?;
        Ok(conn)
    }
}

pub fn open_connection_sync(database_url: &str) -> Result<SqliteConnection> {
    let mut conn = SqliteConnection::establish(database_url)
        .map_err(|e| ProjectHubError::Database(e.to_string()))?;
    conn.batch_execute(CONNECTION_PRAGMAS)?;
    Ok(conn)
}

async fn apply_pragmas_async(conn: &mut SqliteAsyncConn) -> Result<()> {
    // Pragmas are per-connection, so every checkout re-applies them.
    diesel_async::SimpleAsyncConnection::batch_execute(conn, CONNECTION_PRAGMAS).await?;
    Ok(())
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProjectHubError::Runtime(e.to_string()))?;
        }
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = open_connection_sync(&database_url)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| ProjectHubError::Database(e.to_string()))?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "Applied pending migrations");
        }
        Ok::<_, ProjectHubError>(())
    })
    .await
    .map_err(|e| ProjectHubError::Runtime(e.to_string()))??;
    Ok(())
}

pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Parses an enum stored as text, falling back to `fallback` (with a
/// warning) when the column holds an unknown value.
pub fn parse_stored<T: FromStr>(value: &str, column: &'static str, fallback: T) -> T {
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!(column, value, "Unknown stored value; using fallback");
            fallback
        }
    }
}
