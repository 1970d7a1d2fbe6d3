use crate::store::{StoreError, TransactionError};

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("{participant} is not a participant of study {study_id}")]
    UnknownParticipant {
        study_id: String,
        participant: String,
    },

    #[error("study {0} not found")]
    StudyNotFound(String),

    #[error("parameter {name} not found in {study_id}")]
    UnknownParameter { study_id: String, name: String },

    #[error("{key} is not configured for {participant}")]
    MissingConfiguration {
        participant: String,
        key: &'static str,
    },

    #[error("Failed to update task after {attempts} attempts")]
    TaskUpdateFailed { attempts: u32 },

    #[error("study {study_id} kept changing underneath the update ({attempts} attempts)")]
    TransactionConflict { study_id: String, attempts: u32 },

    #[error("document store error: {0}")]
    Store(StoreError),
}

impl CoordinationError {
    /// Whether the caller sent something the engine cannot act on, as
    /// opposed to the backend failing.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CoordinationError::Store(_))
    }

    /// Flatten a transaction failure for last-writer-wins writes.
    pub(crate) fn from_transaction(
        study_id: &str,
        e: TransactionError<CoordinationError>,
    ) -> Self {
        match e {
            TransactionError::Aborted(inner) => inner,
            TransactionError::Exhausted { attempts } => CoordinationError::TransactionConflict {
                study_id: study_id.to_string(),
                attempts,
            },
            TransactionError::Store(store) => store.into(),
        }
    }
}

impl From<StoreError> for CoordinationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(study_id) => CoordinationError::StudyNotFound(study_id),
            other => CoordinationError::Store(other),
        }
    }
}
