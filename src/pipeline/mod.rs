//! Pipeline module - the CSV enrichment job.

mod enrich;

pub use enrich::*;
