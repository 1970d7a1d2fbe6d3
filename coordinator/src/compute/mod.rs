//! Compute provider collaborator
//!
//! The coordinator only ever stops or deletes a participant's instance.
//! Both operations must succeed on an instance that is already stopped or
//! gone, because completion signals are delivered at least once.

use async_trait::async_trait;

pub mod gce;
pub mod memory;

pub use gce::GceCompute;
pub use memory::InMemoryCompute;

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("compute request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("compute API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("could not obtain access token: {0}")]
    Token(String),
}

#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn stop_instance(&self, project: &str, name: &str) -> Result<(), ComputeError>;

    async fn delete_instance(&self, project: &str, name: &str) -> Result<(), ComputeError>;
}
