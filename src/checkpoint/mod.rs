//! Checkpoint module for resumable enrichment runs.
//!
//! Provides:
//! - `CheckpointState`: per-row status tracking
//! - `CheckpointManager`: persistence and loading of checkpoint state
//! - `Transaction`: atomic batch output + checkpoint with crash recovery

mod state;
mod transaction;

pub use state::*;
pub use transaction::*;
