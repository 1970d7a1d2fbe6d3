//! Lifecycle Trigger: stops or deletes a participant's instance once its
//! protocol run is over.
//!
//! Teardowns run off the request path on a bounded pool. They are never
//! cancelled, never retried, and their failures are only logged: the status
//! write that triggered them has already been acknowledged.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use super::resolver::{GcpContext, Role};
use crate::compute::ComputeProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownAction {
    Stop,
    Delete,
}

impl TeardownAction {
    pub fn for_request(delete_requested: bool) -> Self {
        if delete_requested {
            TeardownAction::Delete
        } else {
            TeardownAction::Stop
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownRequest {
    pub study_id: String,
    pub participant: String,
    pub gcp_project: String,
    pub instance_name: String,
    pub action: TeardownAction,
}

impl TeardownRequest {
    pub fn new(study_id: &str, participant: &str, study_title: &str, gcp: &GcpContext) -> Self {
        Self {
            study_id: study_id.to_string(),
            participant: participant.to_string(),
            gcp_project: gcp.project.clone(),
            instance_name: instance_name(study_title, gcp.role),
            action: TeardownAction::for_request(gcp.delete_on_finish),
        }
    }
}

/// Participant instance name: the study title, without spaces and
/// lower-cased, followed by the role index.
pub fn instance_name(study_title: &str, role: Role) -> String {
    let mut name: String = study_title
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    name.push_str(&role.to_string());
    name
}

pub struct LifecycleTrigger {
    compute: Arc<dyn ComputeProvider>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    /// Held across close/wait/reopen so overlapping waiters cannot reopen
    /// the tracker under each other.
    idle: Mutex<()>,
}

impl LifecycleTrigger {
    pub fn new(compute: Arc<dyn ComputeProvider>, max_concurrency: usize) -> Self {
        Self {
            compute,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tracker: TaskTracker::new(),
            idle: Mutex::new(()),
        }
    }

    /// Fire-and-forget: schedule the teardown and return immediately.
    pub fn on_protocol_finished(&self, request: TeardownRequest) {
        let compute = Arc::clone(&self.compute);
        let permits = Arc::clone(&self.permits);

        info!(
            study_id = %request.study_id,
            participant = %request.participant,
            instance = %request.instance_name,
            action = ?request.action,
            "scheduling instance teardown"
        );

        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let result = match request.action {
                TeardownAction::Stop => {
                    compute
                        .stop_instance(&request.gcp_project, &request.instance_name)
                        .await
                }
                TeardownAction::Delete => {
                    compute
                        .delete_instance(&request.gcp_project, &request.instance_name)
                        .await
                }
            };

            match result {
                Ok(()) => info!(
                    study_id = %request.study_id,
                    instance = %request.instance_name,
                    action = ?request.action,
                    "instance teardown finished"
                ),
                Err(e) => error!(
                    study_id = %request.study_id,
                    instance = %request.instance_name,
                    action = ?request.action,
                    "instance teardown failed: {e}"
                ),
            }
        });
    }

    /// Teardowns scheduled but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every scheduled teardown has run to completion.
    ///
    /// Concurrent callers take turns. New teardowns may still be scheduled
    /// while a caller waits; the tracker stays open for them afterwards.
    pub async fn wait_idle(&self) {
        let _guard = self.idle.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
