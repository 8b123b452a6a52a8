//! HTTP client for the remote email-finder service.
//!
//! The service accepts one contact per request and replies with the
//! discovered address, the verifier payload, and the credits spent.
//! Network errors and 5xx responses are retried with exponential backoff;
//! 429s honor `Retry-After` through the shared rate limiter.

use crate::client::RateLimiter;
use crate::models::{
    ContactRecord, FinderApiError, FinderReport, ProspectorError, Result,
};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Rate limiter key for the finder endpoint.
const FINDER_ENDPOINT: &str = "finder";

/// Request body for the finder service.
#[derive(Debug, Serialize)]
struct FindEmailRequest<'a> {
    first_name: &'a str,
    last_name: &'a str,
    company_website: &'a str,
}

/// Error body returned by the finder service on 4xx.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
}

/// Client for the remote finder service.
pub struct FinderClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    max_retries: u32,
    rate_limiter: Arc<RateLimiter>,
    // Request tracking
    total_requests: AtomicU64,
    total_failures: AtomicU64,
}

impl FinderClient {
    /// Create a new finder client.
    pub fn new(
        url: String,
        timeout_secs: u64,
        max_retries: u32,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProspectorError::Network)?;

        Ok(Self {
            client,
            url,
            timeout,
            max_retries: max_retries.max(1),
            rate_limiter: rate_limiter.unwrap_or_else(|| Arc::new(RateLimiter::new())),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
        })
    }

    /// Get the rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Look up an email for one contact.
    ///
    /// The returned report carries the HTTP status of the successful
    /// response. Rows rejected by the service with 4xx are not retried.
    pub async fn find_email(&self, contact: &ContactRecord) -> Result<FinderReport> {
        let request = FindEmailRequest {
            first_name: &contact.first_name,
            last_name: &contact.last_name,
            company_website: &contact.company_website,
        };

        let mut last_error: Option<ProspectorError> = None;

        for attempt in 0..self.max_retries {
            self.rate_limiter.wait_if_needed(FINDER_ENDPOINT).await;
            self.total_requests.fetch_add(1, Ordering::Relaxed);

            let response = self
                .client
                .post(&self.url)
                .headers(self.headers())
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        ProspectorError::Timeout(self.timeout)
                    } else {
                        ProspectorError::Network(e)
                    });
                    if attempt < self.max_retries - 1 {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();
            let headers = response.headers().clone();

            self.rate_limiter
                .record_request(FINDER_ENDPOINT, status, &headers);

            if status == 429 {
                let retry_after = headers
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);

                last_error = Some(ProspectorError::RateLimited {
                    retry_after_secs: retry_after,
                });

                if attempt < self.max_retries - 1 {
                    debug!(
                        attempt = attempt,
                        retry_after_secs = retry_after,
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                }
                continue;
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let error = if status == 401 || status == 403 {
                    FinderApiError::AuthenticationFailed
                } else if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body)
                {
                    FinderApiError::ApiError {
                        status,
                        message: api_error.error,
                    }
                } else {
                    FinderApiError::ApiError {
                        status,
                        message: error_body,
                    }
                };

                last_error = Some(ProspectorError::FinderApi(error));

                // Client errors are the service rejecting the row, not flakiness
                if (400..500).contains(&status) {
                    break;
                }

                if attempt < self.max_retries - 1 {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }

            let mut report: FinderReport = response.json().await.map_err(|e| {
                ProspectorError::FinderApi(FinderApiError::InvalidResponse(format!(
                    "Failed to parse finder response: {e}"
                )))
            })?;

            report.status_code = Some(status);
            return Ok(report);
        }

        self.total_failures.fetch_add(1, Ordering::Relaxed);
        Err(last_error.unwrap_or_else(|| {
            ProspectorError::FinderApi(FinderApiError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            })
        }))
    }

    /// Get (requests sent, lookups failed) counters.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_requests.load(Ordering::Relaxed),
            self.total_failures.load(Ordering::Relaxed),
        )
    }
}
