use std::collections::HashMap;

use async_trait::async_trait;
use shared_types::StudyRecord;
use tokio::sync::Mutex;

use super::{DocumentStore, Snapshot, StoreError};

/// Process-local store with the same versioning contract as the SQLite store.
///
/// Used for dry runs and tests. [`InMemoryStudyStore::inject_conflicts`]
/// makes the next N commits fail as if another writer had won the race.
#[derive(Debug, Default)]
pub struct InMemoryStudyStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    studies: HashMap<String, (i64, StudyRecord)>,
    pending_conflicts: u32,
    commits: u64,
}

impl InMemoryStudyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` commits with [`StoreError::Conflict`].
    pub async fn inject_conflicts(&self, count: u32) {
        self.inner.lock().await.pending_conflicts = count;
    }

    /// Number of successful commits so far.
    pub async fn commit_count(&self) -> u64 {
        self.inner.lock().await.commits
    }
}

#[async_trait]
impl DocumentStore for InMemoryStudyStore {
    async fn begin(&self, study_id: &str) -> Result<Snapshot, StoreError> {
        let inner = self.inner.lock().await;
        let (version, record) = inner
            .studies
            .get(study_id)
            .ok_or_else(|| StoreError::NotFound(study_id.to_string()))?;
        Ok(Snapshot {
            version: *version,
            record: record.clone(),
        })
    }

    async fn commit(
        &self,
        study_id: &str,
        expected_version: i64,
        record: &StudyRecord,
    ) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.pending_conflicts > 0 {
            inner.pending_conflicts -= 1;
            return Err(StoreError::Conflict(study_id.to_string()));
        }

        let entry = inner
            .studies
            .get_mut(study_id)
            .ok_or_else(|| StoreError::NotFound(study_id.to_string()))?;
        if entry.0 != expected_version {
            return Err(StoreError::Conflict(study_id.to_string()));
        }
        entry.0 += 1;
        entry.1 = record.clone();
        let version = entry.0;
        inner.commits += 1;
        Ok(version)
    }

    async fn insert(&self, study_id: &str, record: &StudyRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.studies.contains_key(study_id) {
            return Err(StoreError::AlreadyExists(study_id.to_string()));
        }
        inner
            .studies
            .insert(study_id.to_string(), (1, record.clone()));
        Ok(())
    }
}
