//! Study Coordination Engine
//!
//! [`Coordinator::handle_update`] is the single entry point for participant
//! updates. It parses the message, resolves the participant against a fresh
//! read of the study, and routes the update:
//!
//! - `status` → last-writer-wins status map, then possibly an instance teardown
//! - `task` → append-only phase log, retried on contention
//! - anything else → named parameter write
//!
//! Every write is a whole-record transaction (see [`crate::store`]), so
//! concurrent participants never lose each other's updates. The engine keeps
//! no per-study state between calls.

use std::sync::Arc;

use shared_types::StudyRecord;
use tracing::{debug, info, warn};

pub mod error;
pub mod lifecycle;
pub mod message;
pub mod resolver;
pub mod status;
pub mod tasks;

pub use error::CoordinationError;
pub use lifecycle::{LifecycleTrigger, TeardownAction, TeardownRequest};
pub use message::Update;
pub use resolver::{GcpContext, ParameterScope, ParticipantContext, Role};
pub use tasks::TaskTransition;

use crate::store::{run_transaction, DocumentStore, RetryPolicy, TransactionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Status and parameter writes.
    pub write_retry: RetryPolicy,
    /// Task log writes.
    pub task_retry: RetryPolicy,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            write_retry: RetryPolicy::write_default(),
            task_retry: RetryPolicy::task_default(),
        }
    }
}

/// What an accepted update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Status { teardown: Option<TeardownAction> },
    Task(TaskTransition),
    Parameter(ParameterScope),
}

pub struct Coordinator {
    store: Arc<dyn DocumentStore>,
    lifecycle: LifecycleTrigger,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        lifecycle: LifecycleTrigger,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            lifecycle,
            settings,
        }
    }

    pub fn lifecycle(&self) -> &LifecycleTrigger {
        &self.lifecycle
    }

    /// Apply one `"<tag>::<key>=<value>"` message from `participant`.
    pub async fn handle_update(
        &self,
        study_id: &str,
        participant: &str,
        message: &str,
    ) -> Result<UpdateOutcome, CoordinationError> {
        let update = Update::parse(message)?;
        let snapshot = self.store.get(study_id).await?;
        let context = ParticipantContext::resolve(&snapshot, study_id, participant)?;

        debug!(
            study_id,
            participant,
            role = %context.role,
            kind = update.kind(),
            "handling update"
        );

        match update {
            Update::Status(status) => {
                let teardown = self
                    .apply_status(study_id, &snapshot, &context, &status)
                    .await?;
                Ok(UpdateOutcome::Status { teardown })
            }
            Update::Task(task) => {
                let transition = self.apply_task(study_id, participant, &task).await?;
                Ok(UpdateOutcome::Task(transition))
            }
            Update::Parameter { name, value } => {
                let scope = self
                    .set_parameter(study_id, participant, &name, &value)
                    .await?;
                Ok(UpdateOutcome::Parameter(scope))
            }
        }
    }

    /// Overwrite the participant's status; tear the instance down if the
    /// status ends the protocol in website mode.
    pub async fn record_status(
        &self,
        study_id: &str,
        participant: &str,
        status: &str,
    ) -> Result<Option<TeardownAction>, CoordinationError> {
        let snapshot = self.store.get(study_id).await?;
        let context = ParticipantContext::resolve(&snapshot, study_id, participant)?;
        self.apply_status(study_id, &snapshot, &context, status)
            .await
    }

    /// Advance the participant's phase log.
    pub async fn record_task(
        &self,
        study_id: &str,
        participant: &str,
        task: &str,
    ) -> Result<TaskTransition, CoordinationError> {
        let snapshot = self.store.get(study_id).await?;
        ParticipantContext::resolve(&snapshot, study_id, participant)?;
        self.apply_task(study_id, participant, task).await
    }

    /// Write a named parameter, personal keys first, then shared ones.
    pub async fn set_parameter(
        &self,
        study_id: &str,
        participant: &str,
        name: &str,
        value: &str,
    ) -> Result<ParameterScope, CoordinationError> {
        let committed = run_transaction(
            self.store.as_ref(),
            study_id,
            self.settings.write_retry,
            |record| resolver::apply_parameter(record, study_id, participant, name, value),
        )
        .await
        .map_err(|e| CoordinationError::from_transaction(study_id, e))?;

        info!(study_id, participant, name, scope = ?committed.value, "parameter updated");
        Ok(committed.value)
    }

    /// Role and GCP project of a participant, read fresh from the store.
    pub async fn gcp_context(
        &self,
        study_id: &str,
        participant: &str,
    ) -> Result<GcpContext, CoordinationError> {
        let snapshot = self.store.get(study_id).await?;
        ParticipantContext::resolve(&snapshot, study_id, participant)?.gcp()
    }

    async fn apply_status(
        &self,
        study_id: &str,
        snapshot: &StudyRecord,
        context: &ParticipantContext,
        status: &str,
    ) -> Result<Option<TeardownAction>, CoordinationError> {
        let participant = context.participant.as_str();

        // A teardown we could not address must be refused before anything
        // is written.
        let gcp = if status::authorizes_teardown(snapshot, status) {
            Some(context.gcp()?)
        } else {
            None
        };

        let committed = run_transaction(
            self.store.as_ref(),
            study_id,
            self.settings.write_retry,
            |record| {
                status::record_status(record, participant, status);
                Ok::<_, CoordinationError>(())
            },
        )
        .await
        .map_err(|e| CoordinationError::from_transaction(study_id, e))?;

        info!(study_id, participant, status, "status recorded");

        let Some(gcp) = gcp else {
            return Ok(None);
        };
        if !status::authorizes_teardown(&committed.record, status) {
            warn!(study_id, participant, "study left website mode; skipping teardown");
            return Ok(None);
        }

        let request = TeardownRequest::new(study_id, participant, &committed.record.title, &gcp);
        let action = request.action;
        self.lifecycle.on_protocol_finished(request);
        Ok(Some(action))
    }

    async fn apply_task(
        &self,
        study_id: &str,
        participant: &str,
        task: &str,
    ) -> Result<TaskTransition, CoordinationError> {
        let result = run_transaction(
            self.store.as_ref(),
            study_id,
            self.settings.task_retry,
            |record| Ok::<_, CoordinationError>(tasks::record_task(record, participant, task)),
        )
        .await;

        match result {
            Ok(committed) => {
                info!(study_id, participant, task, transition = ?committed.value, "task recorded");
                Ok(committed.value)
            }
            Err(TransactionError::Exhausted { attempts }) => {
                warn!(study_id, participant, task, attempts, "giving up on task update");
                Err(CoordinationError::TaskUpdateFailed { attempts })
            }
            Err(e) => Err(CoordinationError::from_transaction(study_id, e)),
        }
    }
}
