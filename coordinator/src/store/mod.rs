//! Document Store Adapter
//!
//! One JSON document per study. Writers never issue blind field updates:
//! every mutation goes through [`run_transaction`], which reads a versioned
//! snapshot of the whole record, applies a pure mutation to it and commits
//! only if nobody else committed in between. A lost race is reported as
//! [`StoreError::Conflict`] and retried according to a [`RetryPolicy`].

use async_trait::async_trait;
use shared_types::StudyRecord;

pub mod memory;
pub mod sqlite;
pub mod transaction;

pub use memory::InMemoryStudyStore;
pub use sqlite::SqliteStudyStore;
pub use transaction::{run_transaction, Committed, RetryPolicy, TransactionError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("study {0} not found")]
    NotFound(String),

    #[error("study {0} was modified concurrently")]
    Conflict(String),

    #[error("study {0} already exists")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// A record as read at a specific version.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: i64,
    pub record: StudyRecord,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Plain read of the current record.
    async fn get(&self, study_id: &str) -> Result<StudyRecord, StoreError> {
        Ok(self.begin(study_id).await?.record)
    }

    /// Read the record together with the version a commit must match.
    async fn begin(&self, study_id: &str) -> Result<Snapshot, StoreError>;

    /// Replace the whole record if it is still at `expected_version`.
    /// Returns the new version, or [`StoreError::Conflict`].
    async fn commit(
        &self,
        study_id: &str,
        expected_version: i64,
        record: &StudyRecord,
    ) -> Result<i64, StoreError>;

    /// Create a study. Study creation belongs to setup tooling; the engine
    /// itself never creates or deletes records.
    async fn insert(&self, study_id: &str, record: &StudyRecord) -> Result<(), StoreError>;
}
