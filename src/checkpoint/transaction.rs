//! Transaction support for atomic output + checkpoint batches.
//!
//! Write-ahead pattern: record intent per row, append all output lines at
//! commit, then mark the transaction committed. A crash before commit leaves
//! the output untouched and the rows pending; a crash after commit but
//! before checkpoint update is repaired by `recover` re-applying the
//! committed operations.

use crate::models::{ProspectorError, Result, RowOutcome};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A pending row operation within a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRow {
    /// Row index (1-based)
    pub index: usize,
    /// Terminal outcome
    pub outcome: RowOutcome,
    /// Whether a real address was discovered
    pub matched: bool,
    /// Verification credits spent
    pub credits: u32,
    /// Serialized output CSV line (headerless)
    pub output_line: String,
}

/// Transaction state persisted to disk for recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionState {
    /// Unique transaction ID
    pub id: String,
    /// Rows to be committed
    pub rows: Vec<PendingRow>,
    /// Whether the transaction was committed
    pub committed: bool,
    /// Timestamp when the transaction started
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Atomic transaction for one batch of rows.
pub struct Transaction {
    /// Transaction ID
    id: String,
    /// Directory for transaction files
    dir: PathBuf,
    /// Path to pending transaction file
    pending_path: PathBuf,
    /// Accumulated rows
    rows: Vec<PendingRow>,
    /// Output file path (append target at commit)
    output_path: PathBuf,
    /// Whether the transaction has been committed or aborted
    finished: bool,
}

impl Transaction {
    /// Begin a new transaction.
    pub fn begin(checkpoint_dir: &Path, output_path: &Path) -> Result<Self> {
        let id = format!(
            "tx_{}_{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f"),
            uuid::Uuid::new_v4().simple()
        );
        let pending_path = checkpoint_dir.join(format!("{id}.pending.json"));

        let tx = Self {
            id: id.clone(),
            dir: checkpoint_dir.to_path_buf(),
            pending_path,
            rows: Vec::new(),
            output_path: output_path.to_path_buf(),
            finished: false,
        };

        tx.persist_state(false)?;

        debug!(tx_id = %id, "Transaction started");
        Ok(tx)
    }

    /// Check for and recover from any pending transactions.
    ///
    /// Returns rows from transactions that were committed (output written)
    /// but whose checkpoint update may not have landed; the caller re-marks
    /// them. Uncommitted transactions are dropped: their rows stay pending
    /// and will be reprocessed.
    pub fn recover(checkpoint_dir: &Path) -> Result<Option<Vec<PendingRow>>> {
        let pattern = checkpoint_dir.join("tx_*.pending.json");
        let pattern_str = pattern.to_string_lossy();

        let pending_files: Vec<_> = glob::glob(&pattern_str)
            .map_err(|e| ProspectorError::Internal(format!("Invalid glob pattern: {e}")))?
            .filter_map(|r| r.ok())
            .collect();

        if pending_files.is_empty() {
            return Ok(None);
        }

        let mut committed_rows = Vec::new();

        for pending_path in pending_files {
            warn!(path = %pending_path.display(), "Found pending transaction, recovering");

            let content = fs::read_to_string(&pending_path)
                .map_err(|e| ProspectorError::io("reading pending transaction", e))?;

            let state: TransactionState = serde_json::from_str(&content).map_err(|e| {
                ProspectorError::ParseError(format!("Invalid transaction state: {e}"))
            })?;

            if state.committed {
                debug!(
                    tx_id = %state.id,
                    rows = state.rows.len(),
                    "Transaction was committed, re-applying checkpoint marks"
                );
                committed_rows.extend(state.rows);
            } else {
                warn!(
                    tx_id = %state.id,
                    rows = state.rows.len(),
                    "Transaction was not committed, rows remain pending"
                );
            }

            fs::remove_file(&pending_path)
                .map_err(|e| ProspectorError::io("removing pending transaction", e))?;
        }

        if committed_rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(committed_rows))
        }
    }

    /// Record one completed row.
    pub fn record_row(
        &mut self,
        index: usize,
        outcome: RowOutcome,
        matched: bool,
        credits: u32,
        output_line: String,
    ) -> Result<()> {
        self.rows.push(PendingRow {
            index,
            outcome,
            matched,
            credits,
            output_line,
        });
        self.persist_state(false)
    }

    /// Commit the transaction atomically.
    ///
    /// Appends all output lines to the output file, syncs, marks the
    /// transaction committed, then cleans up the pending file.
    pub fn commit(mut self) -> Result<Vec<PendingRow>> {
        if self.finished {
            return Err(ProspectorError::Internal(
                "Transaction already finished".to_string(),
            ));
        }

        if !self.rows.is_empty() {
            let temp_output = self.dir.join(format!("{}.output.tmp", self.id));
            {
                let file = File::create(&temp_output)
                    .map_err(|e| ProspectorError::io("creating temp output", e))?;
                let mut writer = BufWriter::new(file);
                for row in &self.rows {
                    writeln!(writer, "{}", row.output_line)
                        .map_err(|e| ProspectorError::io("writing temp output", e))?;
                }
                writer
                    .flush()
                    .map_err(|e| ProspectorError::io("flushing temp output", e))?;
            }

            let temp_content = fs::read_to_string(&temp_output)
                .map_err(|e| ProspectorError::io("reading temp output", e))?;

            let mut output_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.output_path)
                .map_err(|e| ProspectorError::io("opening output file", e))?;

            output_file
                .write_all(temp_content.as_bytes())
                .map_err(|e| ProspectorError::io("appending to output", e))?;
            output_file
                .sync_all()
                .map_err(|e| ProspectorError::io("syncing output", e))?;

            fs::remove_file(&temp_output)
                .map_err(|e| ProspectorError::io("removing temp output", e))?;
        }

        self.persist_state(true)?;

        if self.pending_path.exists() {
            fs::remove_file(&self.pending_path)
                .map_err(|e| ProspectorError::io("removing pending transaction", e))?;
        }

        self.finished = true;
        debug!(tx_id = %self.id, rows = self.rows.len(), "Transaction committed");

        Ok(std::mem::take(&mut self.rows))
    }

    /// Abort the transaction, discarding all pending rows.
    pub fn abort(mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }

        if self.pending_path.exists() {
            fs::remove_file(&self.pending_path)
                .map_err(|e| ProspectorError::io("removing pending transaction", e))?;
        }

        self.finished = true;
        debug!(tx_id = %self.id, "Transaction aborted");
        Ok(())
    }

    /// Get the pending rows.
    pub fn rows(&self) -> &[PendingRow] {
        &self.rows
    }

    /// Persist current transaction state to disk.
    fn persist_state(&self, committed: bool) -> Result<()> {
        let state = TransactionState {
            id: self.id.clone(),
            rows: self.rows.clone(),
            committed,
            started_at: chrono::Utc::now(),
        };

        let content = serde_json::to_string_pretty(&state)
            .map_err(|e| ProspectorError::Internal(format!("Serializing transaction: {e}")))?;

        fs::write(&self.pending_path, content)
            .map_err(|e| ProspectorError::io("writing pending transaction", e))?;

        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                tx_id = %self.id,
                rows = self.rows.len(),
                "Transaction dropped without commit/abort - rows stay pending"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn commit_appends_rows_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_dir = temp_dir.path().join("checkpoint");
        fs::create_dir_all(&checkpoint_dir).unwrap();
        let output_path = temp_dir.path().join("output.csv");

        let mut tx = Transaction::begin(&checkpoint_dir, &output_path).unwrap();
        tx.record_row(
            1,
            RowOutcome::Enriched,
            true,
            2,
            "Jane,Doe,example.com,jane@example.com,,,2,".to_string(),
        )
        .unwrap();
        tx.record_row(
            2,
            RowOutcome::Skipped,
            false,
            0,
            ",,,,,,,Missing required fields".to_string(),
        )
        .unwrap();

        let rows = tx.commit().unwrap();
        assert_eq!(rows.len(), 2);

        let output = fs::read_to_string(&output_path).unwrap();
        assert!(output.contains("jane@example.com"));
        assert!(output.contains("Missing required fields"));

        let pending: Vec<_> =
            glob::glob(&checkpoint_dir.join("*.pending.json").to_string_lossy())
                .unwrap()
                .filter_map(|r| r.ok())
                .collect();
        assert!(pending.is_empty());
    }

    #[test]
    fn abort_leaves_output_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_dir = temp_dir.path().join("checkpoint");
        fs::create_dir_all(&checkpoint_dir).unwrap();
        let output_path = temp_dir.path().join("output.csv");

        let mut tx = Transaction::begin(&checkpoint_dir, &output_path).unwrap();
        tx.record_row(1, RowOutcome::Enriched, false, 1, "a,b,c,,,,1,".to_string())
            .unwrap();

        tx.abort().unwrap();

        assert!(!output_path.exists());

        let pending: Vec<_> =
            glob::glob(&checkpoint_dir.join("*.pending.json").to_string_lossy())
                .unwrap()
                .filter_map(|r| r.ok())
                .collect();
        assert!(pending.is_empty());
    }

    #[test]
    fn recovery_returns_only_committed_rows() {
        let temp_dir = TempDir::new().unwrap();
        let checkpoint_dir = temp_dir.path().join("checkpoint");
        fs::create_dir_all(&checkpoint_dir).unwrap();

        // Committed transaction whose checkpoint update never landed
        let committed = TransactionState {
            id: "tx_committed".to_string(),
            rows: vec![PendingRow {
                index: 4,
                outcome: RowOutcome::Enriched,
                matched: true,
                credits: 3,
                output_line: "x".to_string(),
            }],
            committed: true,
            started_at: chrono::Utc::now(),
        };
        fs::write(
            checkpoint_dir.join("tx_committed.pending.json"),
            serde_json::to_string(&committed).unwrap(),
        )
        .unwrap();

        // Uncommitted transaction: rows must stay pending, not re-applied
        let uncommitted = TransactionState {
            id: "tx_uncommitted".to_string(),
            rows: vec![PendingRow {
                index: 5,
                outcome: RowOutcome::Enriched,
                matched: false,
                credits: 1,
                output_line: "y".to_string(),
            }],
            committed: false,
            started_at: chrono::Utc::now(),
        };
        fs::write(
            checkpoint_dir.join("tx_uncommitted.pending.json"),
            serde_json::to_string(&uncommitted).unwrap(),
        )
        .unwrap();

        let recovered = Transaction::recover(&checkpoint_dir).unwrap().unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].index, 4);

        // All pending files cleaned up either way
        assert!(!checkpoint_dir.join("tx_committed.pending.json").exists());
        assert!(!checkpoint_dir.join("tx_uncommitted.pending.json").exists());
    }

    #[test]
    fn recovery_with_no_pending_files_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Transaction::recover(temp_dir.path()).unwrap().is_none());
    }
}
