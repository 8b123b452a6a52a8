//! Storage location parsing.
//!
//! A location is `gs://bucket/object` or a local filesystem path. Bare
//! object names (no path separator) resolve against the configured default
//! bucket when one is set, matching the original bucket + blob-name layout.

use crate::models::{ProspectorError, Result};
use std::fmt;
use std::path::PathBuf;

/// Where an input or output file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Object in a GCS bucket
    Gcs { bucket: String, object: String },
    /// Local filesystem path
    Local(PathBuf),
}

impl StorageLocation {
    /// Parse a location string, resolving bare names against `default_bucket`.
    pub fn parse(s: &str, default_bucket: Option<&str>) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ProspectorError::InvalidLocation(
                "empty location".to_string(),
            ));
        }

        if let Some(rest) = s.strip_prefix("gs://") {
            let (bucket, object) = rest.split_once('/').ok_or_else(|| {
                ProspectorError::InvalidLocation(format!("missing object name in '{s}'"))
            })?;
            if bucket.is_empty() || object.is_empty() {
                return Err(ProspectorError::InvalidLocation(format!(
                    "missing bucket or object name in '{s}'"
                )));
            }
            return Ok(Self::Gcs {
                bucket: bucket.to_string(),
                object: object.to_string(),
            });
        }

        // Bare object name + default bucket → GCS; anything path-like → local
        if let Some(bucket) = default_bucket {
            if !s.contains(['/', '\\']) {
                return Ok(Self::Gcs {
                    bucket: bucket.to_string(),
                    object: s.to_string(),
                });
            }
        }

        Ok(Self::Local(PathBuf::from(s)))
    }

    /// Whether this location requires GCS access.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Gcs { .. })
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gcs { bucket, object } => write!(f, "gs://{bucket}/{object}"),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gs_url_parses() {
        let loc = StorageLocation::parse("gs://leads/batch/input.csv", None).unwrap();
        assert_eq!(
            loc,
            StorageLocation::Gcs {
                bucket: "leads".to_string(),
                object: "batch/input.csv".to_string(),
            }
        );
        assert!(loc.is_remote());
        assert_eq!(loc.to_string(), "gs://leads/batch/input.csv");
    }

    #[test]
    fn bare_name_resolves_against_default_bucket() {
        let loc = StorageLocation::parse("input.csv", Some("leads")).unwrap();
        assert_eq!(
            loc,
            StorageLocation::Gcs {
                bucket: "leads".to_string(),
                object: "input.csv".to_string(),
            }
        );
    }

    #[test]
    fn bare_name_without_bucket_is_local() {
        let loc = StorageLocation::parse("input.csv", None).unwrap();
        assert_eq!(loc, StorageLocation::Local(PathBuf::from("input.csv")));
        assert!(!loc.is_remote());
    }

    #[test]
    fn path_like_values_stay_local_even_with_bucket() {
        let loc = StorageLocation::parse("/tmp/input.csv", Some("leads")).unwrap();
        assert_eq!(loc, StorageLocation::Local(PathBuf::from("/tmp/input.csv")));

        let loc = StorageLocation::parse("data/input.csv", Some("leads")).unwrap();
        assert_eq!(loc, StorageLocation::Local(PathBuf::from("data/input.csv")));
    }

    #[test]
    fn malformed_gs_urls_are_rejected() {
        assert!(StorageLocation::parse("gs://leads", None).is_err());
        assert!(StorageLocation::parse("gs:///input.csv", None).is_err());
        assert!(StorageLocation::parse("", None).is_err());
    }
}
