//! Google Cloud Storage access over the JSON API.
//!
//! Bearer tokens are resolved at transfer time: an explicit token from the
//! environment wins, then the GCE/Cloud Run metadata server, then anonymous
//! (public buckets). The endpoint is overridable for emulator tests.

use crate::models::{ProspectorError, Result, StorageConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Production JSON API endpoint.
const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Metadata server token endpoint for workload identity.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Token response from the metadata server.
#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// GCS client for object download and upload.
pub struct GcsClient {
    client: reqwest::Client,
    endpoint: String,
    token_env: String,
}

impl GcsClient {
    /// Create a client from storage configuration.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(ProspectorError::Network)?;

        Ok(Self {
            client,
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            token_env: config.token_env.clone(),
        })
    }

    /// Resolve a bearer token, if any source provides one.
    async fn token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(&self.token_env) {
            if !token.trim().is_empty() {
                return Some(token);
            }
        }

        // Metadata server is only reachable on GCP; keep the probe short
        let probe = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .ok()?;

        let response = probe
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let token: MetadataToken = response.json().await.ok()?;
        debug!("Using metadata server token");
        Some(token.access_token)
    }

    fn object_url(&self, bucket: &str, object: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ProspectorError::storage("parsing GCS endpoint", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ProspectorError::storage("building GCS URL", "endpoint is not a base"))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        Ok(url)
    }

    /// Download an object to a local file.
    pub async fn download(&self, bucket: &str, object: &str, dest: &Path) -> Result<()> {
        let mut url = self.object_url(bucket, object)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let mut request = self.client.get(url);
        if let Some(token) = self.token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(ProspectorError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProspectorError::storage(
                format!("downloading gs://{bucket}/{object}"),
                format!("status {status}: {body}"),
            ));
        }

        let bytes = response.bytes().await.map_err(ProspectorError::Network)?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ProspectorError::io(format!("writing {}", dest.display()), e))?;

        info!(
            source = %format!("gs://{bucket}/{object}"),
            dest = %dest.display(),
            bytes = bytes.len(),
            "Downloaded object"
        );
        Ok(())
    }

    /// Upload a local file to an object.
    pub async fn upload(&self, src: &Path, bucket: &str, object: &str) -> Result<()> {
        let bytes = tokio::fs::read(src)
            .await
            .map_err(|e| ProspectorError::io(format!("reading {}", src.display()), e))?;
        let len = bytes.len();

        let mut url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| ProspectorError::storage("parsing GCS endpoint", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ProspectorError::storage("building GCS URL", "endpoint is not a base"))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object);

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(bytes);
        if let Some(token) = self.token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(ProspectorError::Network)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProspectorError::storage(
                format!("uploading gs://{bucket}/{object}"),
                format!("status {status}: {body}"),
            ));
        }

        info!(
            source = %src.display(),
            dest = %format!("gs://{bucket}/{object}"),
            bytes = len,
            "Uploaded object"
        );
        Ok(())
    }
}
