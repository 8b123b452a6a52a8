//! Local finder engine and backend dispatch.
//!
//! The local engine reproduces the finder service in-process: derive the
//! domain, generate candidates in priority order, verify each until one
//! validates. Credits are counted per verification attempt.

use crate::client::FinderClient;
use crate::finder::{extract_root_domain, prioritized_patterns, EmailVerifier};
use crate::models::{Config, ContactRecord, FinderMode, FinderReport, Result};
use std::time::Duration;
use tracing::{debug, info};

/// In-process email finder.
pub struct LocalFinder {
    verifier: EmailVerifier,
    attempt_delay: Duration,
}

impl LocalFinder {
    /// Create a local finder from the verifier client and attempt pacing.
    pub fn new(verifier: EmailVerifier, attempt_delay_secs: f64) -> Self {
        Self {
            verifier,
            attempt_delay: Duration::from_secs_f64(attempt_delay_secs.max(0.0)),
        }
    }

    /// Search for a valid address for one contact.
    ///
    /// Returns an exhausted report (never Err) when no candidate validates;
    /// verification credits spent are reported either way.
    pub async fn find(&self, contact: &ContactRecord) -> FinderReport {
        let domain = extract_root_domain(&contact.company_website);
        let first = contact.first_name.to_lowercase();
        let last = contact.last_name.to_lowercase();
        let last = (!last.is_empty()).then_some(last.as_str());

        let candidates = prioritized_patterns(&first, last, &domain);
        let total = candidates.len();
        let mut attempts: u32 = 0;

        for (idx, email) in candidates.iter().enumerate() {
            attempts += 1;
            let verification = self.verifier.verify(email).await;

            if verification.is_valid {
                info!(email = %email, attempts = attempts, "Address validated");
                return FinderReport::found(
                    email.clone(),
                    verification.details.unwrap_or(serde_json::Value::Null),
                    attempts,
                );
            }

            debug!(email = %email, attempt = attempts, "Candidate rejected");

            if idx + 1 < total {
                tokio::time::sleep(self.attempt_delay).await;
            }
        }

        FinderReport::exhausted(attempts)
    }
}

/// Finder backend selected by configuration.
pub enum FinderBackend {
    /// POST each contact to the remote finder service
    Remote(FinderClient),
    /// Run the search in-process
    Local(LocalFinder),
}

impl FinderBackend {
    /// Build the backend named by the config, resolving credentials.
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.finder.mode {
            FinderMode::Remote => {
                let client = FinderClient::new(
                    config.finder.url.clone(),
                    config.finder.timeout_secs,
                    config.finder.max_retries,
                    None,
                )?;
                Ok(Self::Remote(client))
            }
            FinderMode::Local => {
                let api_key = config.resolve_verifier_key()?;
                let verifier = EmailVerifier::new(&config.verifier, api_key)?;
                Ok(Self::Local(LocalFinder::new(
                    verifier,
                    config.verifier.attempt_delay_secs,
                )))
            }
        }
    }

    /// Look up an email for one contact.
    pub async fn find_email(&self, contact: &ContactRecord) -> Result<FinderReport> {
        match self {
            Self::Remote(client) => client.find_email(contact).await,
            Self::Local(finder) => Ok(finder.find(contact).await),
        }
    }
}
