//! services/reader_api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! persistence and collaborator ports from the core crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reading_session_core::domain::{BookActivity, Ebook, EbookId, Location, ReadingProgress};
use reading_session_core::ports::{
    ActivityLog, AuthSessionLookup, LibraryCatalog, PortError, PortResult, ProgressRepository,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter implementing the progress, activity, catalog and auth ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProgressRecord {
    user_id: Uuid,
    ebook_id: i64,
    location: String,
    progress_percentage: f64,
    last_read_at: DateTime<Utc>,
}
impl ProgressRecord {
    fn to_domain(self) -> ReadingProgress {
        ReadingProgress {
            user_id: self.user_id,
            ebook_id: self.ebook_id,
            location: Location::new(self.location),
            progress_percentage: self.progress_percentage,
            last_read_at: self.last_read_at,
        }
    }
}

#[derive(FromRow)]
struct EbookRecord {
    id: i64,
    title: String,
    download_url: Option<String>,
}
impl EbookRecord {
    fn to_domain(self) -> Ebook {
        Ebook {
            id: self.id,
            title: self.title,
            download_url: self.download_url.filter(|url| !url.trim().is_empty()),
        }
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl ProgressRepository for DbAdapter {
    async fn fetch(&self, user_id: Uuid, ebook_id: EbookId) -> PortResult<Option<ReadingProgress>> {
        let record = sqlx::query_as::<_, ProgressRecord>(
            "SELECT user_id, ebook_id, location, progress_percentage, last_read_at \
             FROM reading_progress WHERE user_id = $1 AND ebook_id = $2",
        )
        .bind(user_id)
        .bind(ebook_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ProgressRecord::to_domain))
    }

    async fn upsert(&self, progress: &ReadingProgress) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO reading_progress (user_id, ebook_id, location, progress_percentage, last_read_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, ebook_id) DO UPDATE SET \
                 location = EXCLUDED.location, \
                 progress_percentage = EXCLUDED.progress_percentage, \
                 last_read_at = EXCLUDED.last_read_at",
        )
        .bind(progress.user_id)
        .bind(progress.ebook_id)
        .bind(progress.location.as_str())
        .bind(progress.progress_percentage)
        .bind(progress.last_read_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}

#[async_trait]
impl ActivityLog for DbAdapter {
    async fn record(&self, activity: &BookActivity) -> PortResult<()> {
        sqlx::query("INSERT INTO book_activity (ebook_id, user_id, activity_type) VALUES ($1, $2, $3)")
            .bind(activity.ebook_id)
            .bind(activity.user_id)
            .bind(activity.activity_type.as_str())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

#[async_trait]
impl LibraryCatalog for DbAdapter {
    async fn get_ebook(&self, ebook_id: EbookId) -> PortResult<Ebook> {
        let record = sqlx::query_as::<_, EbookRecord>(
            "SELECT id, title, download_url FROM ebooks WHERE id = $1",
        )
        .bind(ebook_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Ebook {} not found", ebook_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl AuthSessionLookup for DbAdapter {
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }
}
