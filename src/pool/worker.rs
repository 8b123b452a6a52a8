//! Worker pool for concurrent row processing.
//!
//! One task per row, bounded by a semaphore of `workers.size` permits.
//! Results surface in completion order so the pipeline can append and flush
//! each output row as soon as it exists. Rows missing required fields are
//! resolved locally without spending a finder request.

use crate::finder::FinderBackend;
use crate::models::{ContactRecord, EnrichedRecord, FinderReport, ProspectorError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Result of processing one row.
#[derive(Debug)]
pub struct RowResult {
    /// Input row index (1-based, header excluded)
    pub index: usize,
    /// The output row to append
    pub row: EnrichedRecord,
    /// The finder report, when a lookup ran
    pub report: Option<FinderReport>,
}

/// Worker pool dispatching contacts to the finder backend.
pub struct WorkerPool {
    backend: Arc<FinderBackend>,
    semaphore: Arc<Semaphore>,
    /// Pause after each finder request, pacing per worker
    request_delay: Duration,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(backend: Arc<FinderBackend>, size: usize, request_delay_secs: f64) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(size.max(1))),
            request_delay: Duration::from_secs_f64(request_delay_secs.max(0.0)),
        }
    }

    /// Process one row: validate, look up, pace.
    async fn process(&self, index: usize, contact: ContactRecord) -> RowResult {
        let contact = contact.trimmed();

        if !contact.has_required_fields() {
            debug!(row = index, "Skipped: missing first_name or company_website");
            return RowResult {
                index,
                row: EnrichedRecord::skipped(&contact),
                report: None,
            };
        }

        debug!(
            row = index,
            name = %format!("{} {}", contact.first_name, contact.last_name).trim(),
            website = %contact.company_website,
            "Processing"
        );

        let outcome = self.backend.find_email(&contact).await;

        // Per-worker pacing after every request, success or not
        if self.request_delay > Duration::ZERO {
            tokio::time::sleep(self.request_delay).await;
        }

        match outcome {
            Ok(report) => RowResult {
                index,
                row: EnrichedRecord::from_report(&contact, &report),
                report: Some(report),
            },
            Err(e) => {
                warn!(row = index, error = %e, "Lookup failed");
                RowResult {
                    index,
                    row: EnrichedRecord::failed(&contact, e.to_string()),
                    report: None,
                }
            }
        }
    }

    /// Spawn one task per row of the batch.
    ///
    /// The caller drains the set with `join_next`, receiving rows as they
    /// complete. Concurrency stays bounded by the pool's permits.
    pub fn spawn_batch(
        self: &Arc<Self>,
        batch: Vec<(usize, ContactRecord)>,
    ) -> JoinSet<Result<RowResult, ProspectorError>> {
        let mut set = JoinSet::new();

        for (index, contact) in batch {
            let pool = Arc::clone(self);
            set.spawn(async move {
                let _permit = pool
                    .semaphore
                    .acquire()
                    .await
                    .map_err(|_| ProspectorError::Internal("Semaphore closed".to_string()))?;
                Ok(pool.process(index, contact).await)
            });
        }

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::{EmailVerifier, LocalFinder};
    use crate::models::VerifierConfig;

    fn local_pool(size: usize) -> Arc<WorkerPool> {
        // Verifier pointed at an unroutable host: every candidate is
        // rejected with a transport error, so lookups exhaust quickly.
        let config = VerifierConfig {
            base_url: "http://127.0.0.1:1/ninja".to_string(),
            timeout_secs: 1,
            attempt_delay_secs: 0.0,
            ..VerifierConfig::default()
        };
        let verifier = EmailVerifier::new(&config, "test-key".to_string()).unwrap();
        let backend = Arc::new(FinderBackend::Local(LocalFinder::new(verifier, 0.0)));
        Arc::new(WorkerPool::new(backend, size, 0.0))
    }

    #[tokio::test]
    async fn incomplete_rows_are_skipped_without_lookup() {
        let pool = local_pool(2);
        let batch = vec![(
            1,
            ContactRecord {
                first_name: String::new(),
                last_name: "Doe".to_string(),
                company_website: "example.com".to_string(),
            },
        )];

        let mut set = pool.spawn_batch(batch);
        let result = set.join_next().await.unwrap().unwrap().unwrap();
        assert_eq!(result.index, 1);
        assert!(result.report.is_none());
        assert_eq!(result.row.error.as_deref(), Some("Missing required fields"));
    }

    #[tokio::test]
    async fn every_row_produces_exactly_one_result() {
        let pool = local_pool(3);
        let batch: Vec<_> = (1..=5)
            .map(|i| {
                (
                    i,
                    ContactRecord {
                        first_name: format!("user{i}"),
                        last_name: String::new(),
                        company_website: "example.invalid".to_string(),
                    },
                )
            })
            .collect();

        let mut set = pool.spawn_batch(batch);
        let mut indices = Vec::new();
        while let Some(joined) = set.join_next().await {
            let result = joined.unwrap().unwrap();
            // Unroutable verifier: searches exhaust, rows still enrich
            assert_eq!(
                result.report.as_ref().unwrap().email_found.as_deref(),
                Some(crate::models::NO_VALID_EMAIL)
            );
            indices.push(result.index);
        }
        indices.sort_unstable();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    }
}
