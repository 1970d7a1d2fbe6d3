use std::time::Duration;

use shared_types::StudyRecord;
use tracing::{debug, warn};

use super::{DocumentStore, Snapshot, StoreError};

/// How often a transaction is re-run after losing a commit race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts (no exponential growth).
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Task log writes: a lost append is never acceptable, so keep trying for ~10s.
    pub const fn task_default() -> Self {
        Self::fixed(10, Duration::from_secs(1))
    }

    /// Last-writer-wins writes (status, parameters).
    pub const fn write_default() -> Self {
        Self::fixed(5, Duration::ZERO)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Result of a committed transaction.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    /// Whatever the mutation returned on the attempt that committed.
    pub value: T,
    /// The record exactly as written.
    pub record: StudyRecord,
    pub version: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError<E> {
    /// The mutation refused to apply; nothing was written.
    #[error("transaction aborted: {0}")]
    Aborted(E),

    #[error("transaction conflicted on all {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Store(StoreError),
}

/// Run `mutate` against a fresh snapshot of the study until a commit succeeds.
///
/// `mutate` must be a pure function of the record it is given: it is called
/// once per attempt, each time on a freshly read copy, and only the copy from
/// the winning attempt is persisted. Only [`StoreError::Conflict`] is retried.
pub async fn run_transaction<T, E, F>(
    store: &dyn DocumentStore,
    study_id: &str,
    policy: RetryPolicy,
    mut mutate: F,
) -> Result<Committed<T>, TransactionError<E>>
where
    F: FnMut(&mut StudyRecord) -> Result<T, E> + Send,
    T: Send,
    E: Send,
{
    let attempts = policy.attempts();
    for attempt in 1..=attempts {
        let Snapshot {
            version,
            mut record,
        } = store.begin(study_id).await.map_err(TransactionError::Store)?;

        let value = mutate(&mut record).map_err(TransactionError::Aborted)?;

        match store.commit(study_id, version, &record).await {
            Ok(version) => {
                debug!(study_id, attempt, version, "transaction committed");
                return Ok(Committed {
                    value,
                    record,
                    version,
                });
            }
            Err(StoreError::Conflict(_)) => {
                warn!(study_id, attempt, attempts, "transaction conflict");
                if attempt < attempts && !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
            Err(e) => return Err(TransactionError::Store(e)),
        }
    }

    Err(TransactionError::Exhausted { attempts })
}
