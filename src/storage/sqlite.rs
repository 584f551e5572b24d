use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, warn};

use super::{
    EventRecord, ReflectionRecord, SessionRecord, SessionStatus, SnapshotRecord, Storage,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory database, mainly for tests.
    ///
    /// The pool is capped at one connection because every SQLite memory
    /// connection opens its own database.
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json_string(value: &serde_json::Value) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization {
        message: e.to_string(),
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(raw = %raw, error = %e, "Unparseable timestamp in database");
            Utc::now()
        })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let metadata = session.metadata.as_ref().map(to_json_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, question, status, created_at, updated_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.question)
        .bind(session.status.to_string())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, question, status, created_at, updated_at, metadata
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn update_session_status(&self, id: &str, status: SessionStatus) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &SnapshotRecord) -> StorageResult<()> {
        let data = to_json_string(&snapshot.data)?;

        sqlx::query(
            r#"
            INSERT INTO snapshots (id, session_id, data, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.id)
        .bind(&snapshot.session_id)
        .bind(&data)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_latest_snapshot(&self, session_id: &str) -> StorageResult<Option<SnapshotRecord>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, data, created_at
            FROM snapshots
            WHERE session_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SnapshotRecord::try_from).transpose()
    }

    async fn log_event(&self, event: &EventRecord) -> StorageResult<()> {
        let payload = to_json_string(&event.payload)?;

        sqlx::query(
            r#"
            INSERT INTO events (id, session_id, event_type, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.session_id)
        .bind(&event.event_type)
        .bind(&payload)
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session_events(&self, session_id: &str) -> StorageResult<Vec<EventRecord>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, event_type, payload, created_at
            FROM events
            WHERE session_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn add_reflection(&self, reflection: &ReflectionRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reflections (id, session_id, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&reflection.id)
        .bind(&reflection.session_id)
        .bind(&reflection.content)
        .bind(reflection.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_recent_reflections(&self, limit: u32) -> StorageResult<Vec<ReflectionRecord>> {
        let rows: Vec<ReflectionRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, content, created_at
            FROM reflections
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    question: String,
    status: String,
    created_at: String,
    updated_at: String,
    metadata: Option<String>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            question: row.question,
            status: row.status.parse().unwrap_or(SessionStatus::Failed),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            metadata: row.metadata.and_then(|s| serde_json::from_str(&s).ok()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    session_id: String,
    data: String,
    created_at: String,
}

impl TryFrom<SnapshotRow> for SnapshotRecord {
    type Error = StorageError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let data = serde_json::from_str(&row.data).map_err(|e| StorageError::Serialization {
            message: format!("Corrupt snapshot {}: {}", row.id, e),
        })?;
        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            data,
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    session_id: Option<String>,
    event_type: String,
    payload: String,
    created_at: String,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            event_type: row.event_type,
            payload: serde_json::from_str(&row.payload).unwrap_or(serde_json::Value::Null),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReflectionRow {
    id: String,
    session_id: String,
    content: String,
    created_at: String,
}

impl From<ReflectionRow> for ReflectionRecord {
    fn from(row: ReflectionRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            content: row.content,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
