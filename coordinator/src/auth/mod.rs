//! Authorization collaborator.
//!
//! Each participant agent is issued an opaque key bound to one study. The
//! key arrives verbatim in the `Authorization` header; whatever it resolves
//! to is trusted by the engine without further checks.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedParticipant {
    pub participant: String,
    pub study_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no authorization header")]
    Missing,

    #[error("invalid authorization key")]
    Unknown,

    #[error("auth backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, key: &str) -> Result<AuthorizedParticipant, AuthError>;
}

/// Keys stored in the coordinator database.
#[derive(Debug, Clone)]
pub struct SqliteAuthorizer {
    pool: SqlitePool,
}

impl SqliteAuthorizer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Issue (or re-bind) a key for a participant of a study.
    pub async fn register(
        &self,
        key: &str,
        study_id: &str,
        participant: &str,
    ) -> Result<(), AuthError> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO auth_keys (key, study_id, participant, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET study_id = excluded.study_id, participant = excluded.participant",
        )
        .bind(key)
        .bind(study_id)
        .bind(participant)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Authorizer for SqliteAuthorizer {
    async fn authorize(&self, key: &str) -> Result<AuthorizedParticipant, AuthError> {
        if key.is_empty() {
            return Err(AuthError::Missing);
        }

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT participant, study_id FROM auth_keys WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AuthError::Backend(e.to_string()))?;

        row.map(|(participant, study_id)| AuthorizedParticipant {
            participant,
            study_id,
        })
        .ok_or(AuthError::Unknown)
    }
}

/// Fixed key table, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    keys: HashMap<String, AuthorizedParticipant>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: &str, study_id: &str, participant: &str) -> Self {
        self.keys.insert(
            key.to_string(),
            AuthorizedParticipant {
                participant: participant.to_string(),
                study_id: study_id.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authorize(&self, key: &str) -> Result<AuthorizedParticipant, AuthError> {
        if key.is_empty() {
            return Err(AuthError::Missing);
        }
        self.keys.get(key).cloned().ok_or(AuthError::Unknown)
    }
}
