//! CSV enrichment pipeline.
//!
//! Flow: fetch input → read contacts → worker pool → append output rows as
//! they complete → store output. The output header is written and flushed
//! before any row so a crashed run always leaves a parseable file, and each
//! completed row is flushed immediately. With a checkpoint, rows land in
//! batched transactions instead and interrupted runs resume where they
//! stopped.

use crate::checkpoint::{CheckpointManager, Transaction};
use crate::finder::FinderBackend;
use crate::models::{Config, ContactRecord, ProspectorError, Result, RunStats};
use crate::pool::{RowResult, WorkerPool};
use crate::storage::{GcsClient, StorageLocation};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Output column order, fixed by the consumers of the enriched file.
const OUTPUT_HEADERS: [&str; 8] = [
    "first_name",
    "last_name",
    "company_website",
    "email_found",
    "status_code",
    "validation_result",
    "total_credits_used",
    "error",
];

/// Enrichment pipeline.
pub struct EnrichPipeline {
    pool: Arc<WorkerPool>,
    config: Config,
    gcs: GcsClient,
}

impl EnrichPipeline {
    /// Create a pipeline from configuration, resolving backend credentials.
    pub fn new(config: Config) -> Result<Self> {
        let backend = Arc::new(FinderBackend::from_config(&config)?);
        let pool = Arc::new(WorkerPool::new(
            backend,
            config.workers.size,
            config.finder.request_delay_secs,
        ));
        let gcs = GcsClient::new(&config.storage)?;

        Ok(Self { pool, config, gcs })
    }

    /// Load contacts from a CSV file.
    pub fn load_contacts(path: &Path) -> Result<Vec<ContactRecord>> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| ProspectorError::ParseError(format!("{}: {e}", path.display())))?;

        let mut contacts = Vec::new();
        for (row_num, record) in reader.deserialize::<ContactRecord>().enumerate() {
            let contact = record.map_err(|e| {
                ProspectorError::ParseError(format!("Row {}: {e}", row_num + 1))
            })?;
            contacts.push(contact);
        }

        info!(count = contacts.len(), "Loaded contacts");
        Ok(contacts)
    }

    /// Run the full job: fetch, enrich, store.
    pub async fn run(&self, checkpoint: Option<CheckpointManager>) -> Result<RunStats> {
        let bucket = self.config.storage.bucket.as_deref();
        let input_loc = StorageLocation::parse(&self.config.storage.input, bucket)?;
        let output_loc = StorageLocation::parse(&self.config.storage.output, bucket)?;

        info!(input = %input_loc, output = %output_loc, "Starting enrichment job");

        let local_input = match &input_loc {
            StorageLocation::Local(path) => path.clone(),
            StorageLocation::Gcs { bucket, object } => {
                let path = work_path("prospector-input.csv");
                self.gcs.download(bucket, object, &path).await?;
                path
            }
        };

        let local_output = match &output_loc {
            StorageLocation::Local(path) => path.clone(),
            StorageLocation::Gcs { .. } => work_path("prospector-output.csv"),
        };

        let contacts = Self::load_contacts(&local_input)?;

        let stats = match checkpoint {
            Some(mgr) => {
                self.enrich_with_checkpoint(contacts, &local_output, mgr)
                    .await?
            }
            None => self.enrich(contacts, &local_output).await?,
        };

        if let StorageLocation::Gcs { bucket, object } = &output_loc {
            self.gcs.upload(&local_output, bucket, object).await?;
        }

        info!(
            enriched = stats.enriched,
            matched = stats.matched,
            skipped = stats.skipped,
            failed = stats.failed,
            credits = stats.credits_used,
            runtime_secs = format!("{:.1}", stats.runtime_secs),
            "Enrichment job complete"
        );

        Ok(stats)
    }

    /// Enrich all contacts, streaming rows to the output as they complete.
    async fn enrich(&self, contacts: Vec<ContactRecord>, output_path: &Path) -> Result<RunStats> {
        let start = Instant::now();
        let total = contacts.len();

        info!(
            total_rows = total,
            workers = self.config.workers.size,
            "Starting enrichment"
        );

        let pb = progress_bar(total as u64);

        let output_file = File::create(output_path)
            .map_err(|e| ProspectorError::io("creating output file", e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(output_file);
        writer.write_record(OUTPUT_HEADERS)?;
        writer.flush().map_err(|e| ProspectorError::io("flushing output", e))?;

        let mut stats = RunStats {
            total_rows: total,
            ..Default::default()
        };

        let batch_size = (self.config.workers.size * 2).max(10);
        let indexed: Vec<(usize, ContactRecord)> = contacts
            .into_iter()
            .enumerate()
            .map(|(i, c)| (i + 1, c))
            .collect();

        let mut completed = 0u64;
        for batch in indexed.chunks(batch_size) {
            let mut set = self.pool.spawn_batch(batch.to_vec());

            while let Some(joined) = set.join_next().await {
                let result: RowResult = match joined {
                    Ok(result) => result?,
                    Err(e) => {
                        warn!(error = %e, "Row task panicked");
                        continue;
                    }
                };

                stats.record(&result.row, result.report.as_ref());
                writer.serialize(&result.row)?;
                writer
                    .flush()
                    .map_err(|e| ProspectorError::io("flushing output", e))?;

                completed += 1;
                pb.set_position(completed);
                pb.set_message(format!(
                    "matched: {}, skipped: {}, failed: {}",
                    stats.matched, stats.skipped, stats.failed
                ));
            }
        }

        pb.finish_with_message(format!(
            "Done! {} matched, {} skipped, {} failed",
            stats.matched, stats.skipped, stats.failed
        ));

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();
        Ok(stats)
    }

    /// Enrich with checkpoint support: resume pending rows, commit batches
    /// transactionally.
    async fn enrich_with_checkpoint(
        &self,
        contacts: Vec<ContactRecord>,
        output_path: &Path,
        mut checkpoint: CheckpointManager,
    ) -> Result<RunStats> {
        let start = Instant::now();
        let total = contacts.len();
        let fresh = !checkpoint.exists();

        checkpoint.init_or_load(total)?;

        // Re-apply marks from transactions that committed output but
        // crashed before the checkpoint update landed
        if let Some(recovered) = Transaction::recover(checkpoint.dir())? {
            info!(rows = recovered.len(), "Re-applying recovered transaction marks");
            for row in recovered {
                checkpoint.mark_row(row.index, row.outcome, row.matched, row.credits)?;
            }
        }

        let indexed: Vec<(usize, ContactRecord)> = contacts
            .into_iter()
            .enumerate()
            .map(|(i, c)| (i + 1, c))
            .collect();

        let pending = checkpoint.filter_pending(indexed);
        let pending_count = pending.len();

        if pending_count == 0 {
            info!("All rows already processed, nothing to do");
            let state = checkpoint.state().unwrap();
            return Ok(state.to_run_stats(0.0));
        }

        info!(
            total_rows = total,
            pending = pending_count,
            already_done = total - pending_count,
            workers = self.config.workers.size,
            "Resuming enrichment"
        );

        let pb = progress_bar(total as u64);
        let already_done = total - pending_count;
        pb.set_position(already_done as u64);

        // Fresh runs get the header up front; resumed runs already have one.
        // All row writes go through transaction commits, which append.
        if fresh {
            let output_file = File::create(output_path)
                .map_err(|e| ProspectorError::io("creating output file", e))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(output_file);
            writer.write_record(OUTPUT_HEADERS)?;
            writer
                .flush()
                .map_err(|e| ProspectorError::io("flushing output", e))?;
        } else if !output_path.exists() {
            // Resume with a missing output file: recreate the header so
            // appended rows stay parseable
            let output_file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(output_path)
                .map_err(|e| ProspectorError::io("creating output file", e))?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(output_file);
            writer.write_record(OUTPUT_HEADERS)?;
            writer
                .flush()
                .map_err(|e| ProspectorError::io("flushing output", e))?;
        }

        let batch_size = (self.config.workers.size * 2).max(10);
        let mut completed = already_done as u64;

        for batch in pending.chunks(batch_size) {
            let mut tx = Transaction::begin(checkpoint.dir(), output_path)?;
            let mut set = self.pool.spawn_batch(batch.to_vec());

            while let Some(joined) = set.join_next().await {
                let result: RowResult = match joined {
                    Ok(result) => result?,
                    Err(e) => {
                        warn!(error = %e, "Row task panicked");
                        continue;
                    }
                };

                let matched = result.report.as_ref().is_some_and(|r| r.has_match());
                let credits = result
                    .report
                    .as_ref()
                    .and_then(|r| r.total_credits_used)
                    .unwrap_or(0);
                let line = result.row.to_csv_line()?;

                tx.record_row(result.index, result.row.outcome(), matched, credits, line)?;

                completed += 1;
                pb.set_position(completed);
            }

            let committed = tx.commit()?;
            for row in &committed {
                checkpoint.mark_row(row.index, row.outcome, row.matched, row.credits)?;
            }

            let state = checkpoint.state().unwrap();
            pb.set_message(format!(
                "matched: {}, skipped: {}, failed: {}",
                state.stats.matched, state.stats.skipped, state.stats.failed
            ));
        }

        let state = checkpoint.state().unwrap();
        pb.finish_with_message(format!(
            "Done! {} matched, {} skipped, {} failed",
            state.stats.matched, state.stats.skipped, state.stats.failed
        ));

        Ok(state.to_run_stats(start.elapsed().as_secs_f64()))
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .unwrap()
            .progress_chars("##-"),
    );
    pb
}

fn work_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn load_contacts_reads_and_counts_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("input.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "first_name,last_name,company_website").unwrap();
        writeln!(file, "Jane,Doe,https://example.com").unwrap();
        writeln!(file, "Bob,,acme.io").unwrap();
        writeln!(file, ",Smith,").unwrap();

        let contacts = EnrichPipeline::load_contacts(&path).unwrap();
        assert_eq!(contacts.len(), 3);
        assert_eq!(contacts[0].first_name, "Jane");
        assert_eq!(contacts[1].last_name, "");
        assert!(!contacts[2].has_required_fields());
    }

    #[test]
    fn load_contacts_rejects_missing_file() {
        assert!(EnrichPipeline::load_contacts(Path::new("/nonexistent/input.csv")).is_err());
    }
}
