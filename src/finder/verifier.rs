//! MailTester Ninja verification client.
//!
//! One GET per candidate address. A candidate is accepted only when the
//! response body is JSON with `code == "ok"`; transport failures and
//! malformed bodies reject the candidate without aborting the search.

use crate::models::{ProspectorError, Result, VerifierConfig};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Outcome of verifying a single candidate address.
#[derive(Debug, Clone)]
pub struct Verification {
    /// Whether the address validated
    pub is_valid: bool,
    /// Raw API payload, when a JSON body was received
    pub details: Option<Value>,
    /// Error description, when the check itself failed
    pub error: Option<String>,
}

/// Client for the email verification API.
pub struct EmailVerifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EmailVerifier {
    /// Create a new verifier client.
    pub fn new(config: &VerifierConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ProspectorError::Network)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
        })
    }

    /// Verify one candidate address.
    ///
    /// Never returns Err for a rejected or unverifiable candidate; the
    /// search loop treats those the same and moves on.
    pub async fn verify(&self, email: &str) -> Verification {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("email", email), ("key", self.api_key.as_str())])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                debug!(email = email, error = %e, "Verification request failed");
                return Verification {
                    is_valid: false,
                    details: None,
                    error: Some(format!("API request failed: {e}")),
                };
            }
        };

        if let Err(e) = response.error_for_status_ref() {
            debug!(email = email, error = %e, "Verification request failed");
            return Verification {
                is_valid: false,
                details: None,
                error: Some(format!("API request failed: {e}")),
            };
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let is_valid = body.get("code").and_then(Value::as_str) == Some("ok");
                Verification {
                    is_valid,
                    details: Some(body),
                    error: None,
                }
            }
            Err(_) => Verification {
                is_valid: false,
                details: None,
                error: Some("Failed to decode API response".to_string()),
            },
        }
    }
}
