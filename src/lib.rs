//! prospector - bulk email discovery and validation for contact CSVs.
//!
//! ## Architecture
//!
//! - **Pipeline**: Fetch input CSV → Worker Pool → append enriched rows →
//!   store output CSV
//! - **Worker Pool**: Bounded concurrent lookups against the finder backend
//! - **Finder backends**: a remote finder service (HTTP), or the in-process
//!   engine (candidate patterns + verification API)
//! - **Storage**: GCS objects (`gs://bucket/object`) or local files
//! - **Checkpoint**: optional resumable runs with transactional output

pub mod checkpoint;
pub mod client;
pub mod finder;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod storage;

// Re-exports for convenience
pub use checkpoint::{CheckpointManager, CheckpointState, Transaction};
pub use client::{FinderClient, RateLimiter};
pub use finder::{FinderBackend, LocalFinder};
pub use models::{
    Config, ContactRecord, EnrichedRecord, FinderReport, ProspectorError, Result, RunStats,
};
pub use pipeline::EnrichPipeline;
pub use pool::WorkerPool;
pub use storage::{GcsClient, StorageLocation};
