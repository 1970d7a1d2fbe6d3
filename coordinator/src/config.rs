use std::time::Duration;

use crate::engine::CoordinatorSettings;
use crate::store::RetryPolicy;

/// Which compute provider receives stop/delete calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeBackend {
    /// Google Compute Engine REST API.
    Gce,
    /// Log and simulate; never touches real instances.
    DryRun,
}

impl ComputeBackend {
    fn from_env(value: &str) -> anyhow::Result<Self> {
        match value {
            "gce" => Ok(Self::Gce),
            "dry-run" => Ok(Self::DryRun),
            other => Err(anyhow::anyhow!(
                "Invalid COMPUTE_BACKEND '{other}'. Expected 'gce' or 'dry-run'"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the coordinator listens on
    pub port: u16,
    /// Path to the coordinator SQLite database
    pub database_url: String,
    pub compute_backend: ComputeBackend,
    /// Zone of the participant instances
    pub gcp_zone: String,
    /// Static bearer token for the compute API. When unset, tokens come from
    /// the metadata server.
    pub gcp_access_token: Option<String>,
    /// Upper bound on teardowns running at once
    pub lifecycle_max_concurrency: usize,
    pub task_retry_attempts: u32,
    pub task_retry_backoff: Duration,
    pub write_retry_attempts: u32,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: env_parse("COORDINATOR_PORT", 8080)?,
            database_url: env_str("COORDINATOR_DATABASE_URL", "sqlite:./data/coordinator.db"),
            compute_backend: ComputeBackend::from_env(&env_str("COMPUTE_BACKEND", "dry-run"))?,
            gcp_zone: env_str("GCP_ZONE", "us-central1-a"),
            gcp_access_token: std::env::var("GCP_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            lifecycle_max_concurrency: env_parse("LIFECYCLE_MAX_CONCURRENCY", 4)?,
            task_retry_attempts: env_parse("TASK_RETRY_ATTEMPTS", 10)?,
            task_retry_backoff: Duration::from_millis(env_parse("TASK_RETRY_BACKOFF_MS", 1000)?),
            write_retry_attempts: env_parse("WRITE_RETRY_ATTEMPTS", 5)?,
            cors_origins: env_csv("CORS_ORIGINS", &[]),
        })
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            write_retry: RetryPolicy::fixed(self.write_retry_attempts, Duration::ZERO),
            task_retry: RetryPolicy::fixed(self.task_retry_attempts, self.task_retry_backoff),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}

fn env_csv(key: &str, default: &[&str]) -> Vec<String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Err(_) => default.iter().map(|s| (*s).to_string()).collect(),
    }
}
