//! # Snapshot Pull
//!
//! One-shot HTTP fetch of the station's current values from
//! `GET {base_url}/api/current`, used by manual refresh.
//!
//! A failed pull is reported once and never retried here.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{LinkError, Result};
use crate::stream::protocol::StationSnapshot;

/// Path of the current-values endpoint, relative to the API base URL.
pub const CURRENT_DATA_PATH: &str = "api/current";

/// Source of station snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current snapshot
    async fn fetch(&self) -> Result<StationSnapshot>;
}

/// `reqwest` client for the backend REST API
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    client: Client,
    endpoint: Url,
}

impl SnapshotClient {
    /// Create a client for the API at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `http://localhost:8000`
    /// * `timeout` - Upper bound on a whole request
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Pull`] if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint_for(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LinkError::Pull(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl SnapshotSource for SnapshotClient {
    async fn fetch(&self) -> Result<StationSnapshot> {
        debug!("Fetching snapshot from {}", self.endpoint);

        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| LinkError::Pull(format!("Request to {} failed: {}", self.endpoint, e)))?
            .error_for_status()
            .map_err(|e| LinkError::Pull(e.to_string()))?;

        response
            .json::<StationSnapshot>()
            .await
            .map_err(|e| LinkError::Pull(format!("Invalid snapshot body: {}", e)))
    }
}

fn endpoint_for(base_url: &str) -> Result<Url> {
    let base = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|url| url.join(CURRENT_DATA_PATH))
        .map_err(|e| LinkError::Pull(format!("Invalid API base URL '{}': {}", base_url, e)))
}
