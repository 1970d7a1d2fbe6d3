use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::{ComputeError, ComputeProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Stopped,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCall {
    Stop { project: String, name: String },
    Delete { project: String, name: String },
}

/// Simulated provider: tracks instance states in memory and logs every call.
///
/// Backs the `dry-run` compute backend and the tests. Repeated or unknown
/// stop/delete calls succeed without changing anything, like the real API.
#[derive(Debug, Default)]
pub struct InMemoryCompute {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// (project, name) → state
    instances: HashMap<(String, String), InstanceState>,
    calls: Vec<ComputeCall>,
    effective: usize,
    unavailable: bool,
}

impl InMemoryCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_running(&self, project: &str, name: &str) {
        self.inner
            .lock()
            .await
            .instances
            .insert((project.to_string(), name.to_string()), InstanceState::Running);
    }

    /// Make every subsequent call fail with a 503.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    pub async fn state_of(&self, project: &str, name: &str) -> Option<InstanceState> {
        self.inner
            .lock()
            .await
            .instances
            .get(&(project.to_string(), name.to_string()))
            .copied()
    }

    /// Every call received, including failed and no-op ones.
    pub async fn calls(&self) -> Vec<ComputeCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Calls that actually changed an instance's state.
    pub async fn effective_calls(&self) -> usize {
        self.inner.lock().await.effective
    }

    async fn transition(
        &self,
        call: ComputeCall,
        project: &str,
        name: &str,
        target: InstanceState,
    ) -> Result<(), ComputeError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(call);
        if inner.unavailable {
            return Err(ComputeError::Api {
                status: 503,
                body: "compute provider unavailable".to_string(),
            });
        }

        let key = (project.to_string(), name.to_string());
        let changed = match inner.instances.get_mut(&key) {
            Some(state) if *state == InstanceState::Deleted => false,
            Some(state) if *state != target => {
                *state = target;
                true
            }
            _ => false,
        };
        if changed {
            inner.effective += 1;
        }
        info!(project, name, ?target, changed, "simulated instance transition");
        Ok(())
    }
}

#[async_trait]
impl ComputeProvider for InMemoryCompute {
    async fn stop_instance(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        let call = ComputeCall::Stop {
            project: project.to_string(),
            name: name.to_string(),
        };
        self.transition(call, project, name, InstanceState::Stopped)
            .await
    }

    async fn delete_instance(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        let call = ComputeCall::Delete {
            project: project.to_string(),
            name: name.to_string(),
        };
        self.transition(call, project, name, InstanceState::Deleted)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_stop_is_a_successful_noop() {
        let compute = InMemoryCompute::new();
        compute.add_running("proj", "demo1").await;

        compute.stop_instance("proj", "demo1").await.unwrap();
        compute.stop_instance("proj", "demo1").await.unwrap();

        assert_eq!(compute.calls().await.len(), 2);
        assert_eq!(compute.effective_calls().await, 1);
        assert_eq!(
            compute.state_of("proj", "demo1").await,
            Some(InstanceState::Stopped)
        );
    }

    #[tokio::test]
    async fn test_unknown_and_deleted_instances_succeed() {
        let compute = InMemoryCompute::new();
        compute.delete_instance("proj", "ghost").await.unwrap();

        compute.add_running("proj", "demo0").await;
        compute.delete_instance("proj", "demo0").await.unwrap();
        compute.stop_instance("proj", "demo0").await.unwrap();

        assert_eq!(compute.effective_calls().await, 1);
        assert_eq!(
            compute.state_of("proj", "demo0").await,
            Some(InstanceState::Deleted)
        );
    }

    #[tokio::test]
    async fn test_unavailable_provider_errors() {
        let compute = InMemoryCompute::new();
        compute.set_unavailable(true).await;
        let err = compute.stop_instance("proj", "demo1").await.unwrap_err();
        assert!(matches!(err, ComputeError::Api { status: 503, .. }));
    }
}
