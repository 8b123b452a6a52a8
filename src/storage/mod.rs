//! Storage module - GCS objects and local files.

mod gcs;
mod location;

pub use gcs::*;
pub use location::*;
