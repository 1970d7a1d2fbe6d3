use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ComputeError, ComputeProvider};

const COMPUTE_API_BASE: &str = "https://compute.googleapis.com/compute/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh metadata tokens this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Google Compute Engine REST client limited to stop and delete.
pub struct GceCompute {
    client: reqwest::Client,
    api_base: String,
    zone: String,
    token: TokenSource,
}

enum TokenSource {
    Static(String),
    /// Service-account token from the metadata server, cached until near expiry.
    Metadata {
        url: String,
        cached: Mutex<Option<CachedToken>>,
    },
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(serde::Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl GceCompute {
    /// Without `access_token`, tokens are fetched from the metadata server.
    pub fn new(client: reqwest::Client, zone: String, access_token: Option<String>) -> Self {
        let token = match access_token {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::Metadata {
                url: METADATA_TOKEN_URL.to_string(),
                cached: Mutex::new(None),
            },
        };
        Self {
            client,
            api_base: COMPUTE_API_BASE.to_string(),
            zone,
            token,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        if let TokenSource::Metadata { url: current, .. } = &mut self.token {
            *current = url.into();
        }
        self
    }

    fn instance_url(&self, project: &str, name: &str) -> String {
        format!(
            "{}/projects/{project}/zones/{}/instances/{name}",
            self.api_base, self.zone
        )
    }

    async fn access_token(&self) -> Result<String, ComputeError> {
        match &self.token {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { url, cached } => {
                let mut cached = cached.lock().await;
                if let Some(token) = cached.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(token.value.clone());
                    }
                }

                let resp = self
                    .client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| ComputeError::Token(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(ComputeError::Token(format!(
                        "metadata server returned {}",
                        resp.status()
                    )));
                }
                let token: MetadataToken = resp
                    .json()
                    .await
                    .map_err(|e| ComputeError::Token(e.to_string()))?;

                let lifetime = Duration::from_secs(token.expires_in);
                *cached = Some(CachedToken {
                    value: token.access_token.clone(),
                    refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
                });
                debug!(expires_in = token.expires_in, "refreshed compute access token");
                Ok(token.access_token)
            }
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: &'static str,
        project: &str,
        name: &str,
    ) -> Result<(), ComputeError> {
        let token = self.access_token().await?;
        let resp = request.bearer_auth(token).send().await?;
        let status = resp.status();

        if status.is_success() {
            info!(project, name, operation, "instance operation accepted");
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            info!(project, name, operation, "instance already gone");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(ComputeError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ComputeProvider for GceCompute {
    async fn stop_instance(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        let url = format!("{}/stop", self.instance_url(project, name));
        self.send(self.client.post(url), "stop", project, name)
            .await
    }

    async fn delete_instance(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        let url = self.instance_url(project, name);
        self.send(self.client.delete(url), "delete", project, name)
            .await
    }
}
