//! Checkpoint state for resumable enrichment runs.
//!
//! Tracks the terminal outcome of every input row, persisted atomically
//! (write-then-rename, with a backup of the previous state). A resumed run
//! processes only rows still pending.

use crate::models::{ProspectorError, Result, RowOutcome, RunStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Status of a row in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    /// Not yet processed
    Pending,
    /// Report produced (match or exhausted search)
    Enriched,
    /// Missing required fields
    Skipped,
    /// Lookup failed after retries
    Failed,
}

impl From<RowOutcome> for RowStatus {
    fn from(outcome: RowOutcome) -> Self {
        match outcome {
            RowOutcome::Enriched => Self::Enriched,
            RowOutcome::Skipped => Self::Skipped,
            RowOutcome::Failed => Self::Failed,
        }
    }
}

/// Checkpoint entry for a single row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowCheckpoint {
    /// Row index (1-based, header excluded)
    pub index: usize,
    /// Current status
    pub status: RowStatus,
    /// Whether a real address was discovered
    #[serde(default)]
    pub matched: bool,
    /// Verification credits spent on this row
    #[serde(default)]
    pub credits: u32,
    /// Timestamp of last update
    pub updated_at: DateTime<Utc>,
}

/// Checkpoint state for an enrichment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Total rows in the input
    pub total_rows: usize,
    /// Per-row status
    pub rows: HashMap<usize, RowCheckpoint>,
    /// Aggregated statistics
    pub stats: CheckpointStats,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// Statistics tracked in the checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub pending: usize,
    pub enriched: usize,
    pub matched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub credits_used: u64,
}

impl CheckpointState {
    /// Create a fresh state with every row pending.
    pub fn new(total_rows: usize) -> Self {
        let now = Utc::now();
        let mut rows = HashMap::with_capacity(total_rows);
        for index in 1..=total_rows {
            rows.insert(
                index,
                RowCheckpoint {
                    index,
                    status: RowStatus::Pending,
                    matched: false,
                    credits: 0,
                    updated_at: now,
                },
            );
        }

        Self {
            total_rows,
            rows,
            stats: CheckpointStats {
                pending: total_rows,
                ..Default::default()
            },
            started_at: now,
            updated_at: now,
        }
    }

    /// Get pending row indices.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|(_, cp)| cp.status == RowStatus::Pending)
            .map(|(&index, _)| index)
            .collect()
    }

    /// Record the terminal outcome of a row.
    pub fn mark_row(&mut self, index: usize, outcome: RowOutcome, matched: bool, credits: u32) {
        if let Some(cp) = self.rows.get_mut(&index) {
            if cp.status == RowStatus::Pending {
                self.stats.pending -= 1;
                match outcome {
                    RowOutcome::Enriched => {
                        self.stats.enriched += 1;
                        if matched {
                            self.stats.matched += 1;
                        }
                    }
                    RowOutcome::Skipped => self.stats.skipped += 1,
                    RowOutcome::Failed => self.stats.failed += 1,
                }
                self.stats.credits_used += u64::from(credits);
            }
            cp.status = outcome.into();
            cp.matched = matched;
            cp.credits = credits;
            cp.updated_at = Utc::now();
        }
        self.updated_at = Utc::now();
    }

    /// Check if all rows are processed.
    pub fn is_complete(&self) -> bool {
        self.stats.pending == 0
    }

    /// Get progress percentage.
    pub fn progress_percent(&self) -> f64 {
        if self.total_rows == 0 {
            return 100.0;
        }
        let processed = self.total_rows - self.stats.pending;
        (processed as f64 / self.total_rows as f64) * 100.0
    }

    /// Convert to RunStats.
    pub fn to_run_stats(&self, runtime_secs: f64) -> RunStats {
        let mut stats = RunStats {
            total_rows: self.total_rows,
            enriched: self.stats.enriched,
            matched: self.stats.matched,
            skipped: self.stats.skipped,
            failed: self.stats.failed,
            credits_used: self.stats.credits_used,
            runtime_secs,
            ..Default::default()
        };
        stats.finalize();
        stats
    }
}

/// Checkpoint manager for persisting and loading state.
pub struct CheckpointManager {
    /// Directory for checkpoint files
    dir: PathBuf,
    /// Path to main checkpoint file
    checkpoint_path: PathBuf,
    /// Path to backup file
    backup_path: PathBuf,
    /// Current state
    state: Option<CheckpointState>,
}

impl CheckpointManager {
    /// Create a new checkpoint manager.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| ProspectorError::io("creating checkpoint dir", e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            checkpoint_path: dir.join("checkpoint.json"),
            backup_path: dir.join("checkpoint.backup.json"),
            state: None,
        })
    }

    /// Check if a checkpoint exists.
    pub fn exists(&self) -> bool {
        self.checkpoint_path.exists()
    }

    /// Initialize a new checkpoint or load an existing one.
    ///
    /// A loaded checkpoint must describe the same number of rows as the
    /// current input, otherwise the input changed between runs.
    pub fn init_or_load(&mut self, total_rows: usize) -> Result<&CheckpointState> {
        if self.exists() {
            self.load()?;
            let state = self.state.as_ref().unwrap();
            if state.total_rows != total_rows {
                return Err(ProspectorError::InvalidInput(format!(
                    "checkpoint describes {} rows but input has {total_rows}; \
                     use a fresh checkpoint directory",
                    state.total_rows
                )));
            }
            info!(
                pending = state.stats.pending,
                enriched = state.stats.enriched,
                "Resuming from checkpoint"
            );
        } else {
            self.state = Some(CheckpointState::new(total_rows));
            self.save()?;
            info!(total = total_rows, "Created new checkpoint");
        }
        Ok(self.state.as_ref().unwrap())
    }

    /// Load checkpoint from disk.
    pub fn load(&mut self) -> Result<&CheckpointState> {
        let file = File::open(&self.checkpoint_path)
            .map_err(|e| ProspectorError::io("opening checkpoint", e))?;
        let reader = BufReader::new(file);
        let state: CheckpointState = serde_json::from_reader(reader)
            .map_err(|e| ProspectorError::ParseError(format!("Invalid checkpoint: {e}")))?;

        self.state = Some(state);
        Ok(self.state.as_ref().unwrap())
    }

    /// Save checkpoint to disk (atomic write).
    pub fn save(&self) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| ProspectorError::Internal("No checkpoint state to save".to_string()))?;

        if self.checkpoint_path.exists() {
            fs::copy(&self.checkpoint_path, &self.backup_path)
                .map_err(|e| ProspectorError::io("backing up checkpoint", e))?;
        }

        let temp_path = self.dir.join("checkpoint.tmp.json");
        let file = File::create(&temp_path)
            .map_err(|e| ProspectorError::io("creating temp checkpoint", e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, state)
            .map_err(|e| ProspectorError::Internal(format!("Serializing checkpoint: {e}")))?;

        fs::rename(&temp_path, &self.checkpoint_path)
            .map_err(|e| ProspectorError::io("renaming checkpoint", e))?;

        debug!("Checkpoint saved");
        Ok(())
    }

    /// Mark a row and save.
    pub fn mark_row(
        &mut self,
        index: usize,
        outcome: RowOutcome,
        matched: bool,
        credits: u32,
    ) -> Result<()> {
        if let Some(state) = &mut self.state {
            state.mark_row(index, outcome, matched, credits);
        }
        self.save()
    }

    /// Get reference to state.
    pub fn state(&self) -> Option<&CheckpointState> {
        self.state.as_ref()
    }

    /// Filter indexed rows to only pending ones.
    pub fn filter_pending<T>(&self, rows: Vec<(usize, T)>) -> Vec<(usize, T)> {
        let state = match &self.state {
            Some(s) => s,
            None => return rows,
        };

        rows.into_iter()
            .filter(|(index, _)| {
                state
                    .rows
                    .get(index)
                    .is_some_and(|cp| cp.status == RowStatus::Pending)
            })
            .collect()
    }

    /// Get checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn marking_rows_updates_stats_once() {
        let mut state = CheckpointState::new(3);
        assert_eq!(state.stats.pending, 3);

        state.mark_row(1, RowOutcome::Enriched, true, 2);
        state.mark_row(2, RowOutcome::Skipped, false, 0);
        assert_eq!(state.stats.pending, 1);
        assert_eq!(state.stats.enriched, 1);
        assert_eq!(state.stats.matched, 1);
        assert_eq!(state.stats.skipped, 1);
        assert_eq!(state.stats.credits_used, 2);

        // Re-marking a terminal row must not double count
        state.mark_row(1, RowOutcome::Enriched, true, 2);
        assert_eq!(state.stats.enriched, 1);
        assert_eq!(state.stats.credits_used, 2);

        assert!(!state.is_complete());
        state.mark_row(3, RowOutcome::Failed, false, 0);
        assert!(state.is_complete());
        assert!((state.progress_percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut mgr = CheckpointManager::new(temp.path()).unwrap();
        mgr.init_or_load(2).unwrap();
        mgr.mark_row(1, RowOutcome::Enriched, false, 7).unwrap();

        let mut reloaded = CheckpointManager::new(temp.path()).unwrap();
        let state = reloaded.init_or_load(2).unwrap();
        assert_eq!(state.stats.pending, 1);
        assert_eq!(state.stats.enriched, 1);
        assert_eq!(state.stats.credits_used, 7);
        assert_eq!(state.pending_indices(), vec![2]);
    }

    #[test]
    fn row_count_mismatch_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut mgr = CheckpointManager::new(temp.path()).unwrap();
        mgr.init_or_load(2).unwrap();

        let mut reloaded = CheckpointManager::new(temp.path()).unwrap();
        assert!(reloaded.init_or_load(5).is_err());
    }

    #[test]
    fn filter_pending_drops_done_rows() {
        let temp = TempDir::new().unwrap();
        let mut mgr = CheckpointManager::new(temp.path()).unwrap();
        mgr.init_or_load(3).unwrap();
        mgr.mark_row(2, RowOutcome::Enriched, false, 1).unwrap();

        let rows = vec![(1, "a"), (2, "b"), (3, "c")];
        let pending = mgr.filter_pending(rows);
        assert_eq!(pending, vec![(1, "a"), (3, "c")]);
    }
}
