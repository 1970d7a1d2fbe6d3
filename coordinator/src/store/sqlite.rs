use async_trait::async_trait;
use shared_types::StudyRecord;
use sqlx::SqlitePool;

use super::{DocumentStore, Snapshot, StoreError};

/// SQLite-backed study documents using the coordinator's SqlitePool.
///
/// Schema (see `migrations/`):
/// ```sql
/// CREATE TABLE studies (
///     id          TEXT    PRIMARY KEY,
///     version     INTEGER NOT NULL,
///     document    TEXT    NOT NULL,   -- StudyRecord as JSON
///     updated_at  TEXT    NOT NULL
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStudyStore {
    pool: SqlitePool,
}

impl SqliteStudyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for SqliteStudyStore {
    async fn begin(&self, study_id: &str) -> Result<Snapshot, StoreError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT document, version FROM studies WHERE id = ?")
                .bind(study_id)
                .fetch_optional(&self.pool)
                .await?;

        let (document, version) = row.ok_or_else(|| StoreError::NotFound(study_id.to_string()))?;
        Ok(Snapshot {
            version,
            record: serde_json::from_str(&document)?,
        })
    }

    async fn commit(
        &self,
        study_id: &str,
        expected_version: i64,
        record: &StudyRecord,
    ) -> Result<i64, StoreError> {
        let document = serde_json::to_string(record)?;
        let now = chrono::Utc::now().to_rfc3339();

        // Compare-and-swap on the version column; the single UPDATE is atomic.
        let rows = sqlx::query(
            "UPDATE studies SET document = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&document)
        .bind(&now)
        .bind(study_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            // Records are never deleted, so a miss means another writer won.
            return Err(StoreError::Conflict(study_id.to_string()));
        }
        Ok(expected_version + 1)
    }

    async fn insert(&self, study_id: &str, record: &StudyRecord) -> Result<(), StoreError> {
        let document = serde_json::to_string(record)?;
        let now = chrono::Utc::now().to_rfc3339();

        let rows = sqlx::query(
            "INSERT OR IGNORE INTO studies (id, version, document, updated_at) VALUES (?, 1, ?, ?)",
        )
        .bind(study_id)
        .bind(&document)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(StoreError::AlreadyExists(study_id.to_string()));
        }
        Ok(())
    }
}
