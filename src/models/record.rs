//! Row types for the enrichment pipeline.
//!
//! The CSV column contract is fixed: input columns `first_name`, `last_name`,
//! `company_website`; output appends `email_found`, `status_code`,
//! `validation_result`, `total_credits_used`, `error`, in that order.

use serde::{Deserialize, Serialize};

/// Sentinel written to `email_found` when every candidate pattern failed
/// verification. Downstream consumers match on this exact string.
pub const NO_VALID_EMAIL: &str = "no valid email";

/// One input row from the contact CSV.
///
/// Unknown extra columns are ignored; missing columns read as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactRecord {
    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    #[serde(default)]
    pub company_website: String,
}

impl ContactRecord {
    /// Return a copy with surrounding whitespace stripped from every field.
    pub fn trimmed(&self) -> Self {
        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            company_website: self.company_website.trim().to_string(),
        }
    }

    /// A row can be processed only with a first name and a website.
    pub fn has_required_fields(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.company_website.trim().is_empty()
    }
}

/// Result of a finder lookup for one contact, from either backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinderReport {
    /// Discovered address, or [`NO_VALID_EMAIL`] when the search exhausted
    /// all patterns
    #[serde(default)]
    pub email_found: Option<String>,

    /// HTTP status observed by the remote backend
    #[serde(default)]
    pub status_code: Option<u16>,

    /// Raw verifier payload for the accepted address
    #[serde(default)]
    pub validation_result: Option<serde_json::Value>,

    /// Number of verification attempts spent
    #[serde(default)]
    pub total_credits_used: Option<u32>,

    /// Error string when the lookup failed
    #[serde(default)]
    pub error: Option<String>,
}

impl FinderReport {
    /// Report for a lookup that found and validated an address.
    pub fn found(email: String, validation: serde_json::Value, credits: u32) -> Self {
        Self {
            email_found: Some(email),
            status_code: None,
            validation_result: Some(validation),
            total_credits_used: Some(credits),
            error: None,
        }
    }

    /// Report for a lookup that exhausted every candidate.
    pub fn exhausted(credits: u32) -> Self {
        Self {
            email_found: Some(NO_VALID_EMAIL.to_string()),
            status_code: None,
            validation_result: None,
            total_credits_used: Some(credits),
            error: None,
        }
    }

    /// Whether a real address was discovered.
    pub fn has_match(&self) -> bool {
        self.email_found
            .as_deref()
            .is_some_and(|e| !e.is_empty() && e != NO_VALID_EMAIL)
    }
}

/// Terminal outcome of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOutcome {
    /// Finder returned a report (match or exhausted search)
    Enriched,
    /// Missing required input fields, never sent to the finder
    Skipped,
    /// Lookup failed after retries
    Failed,
}

/// One output row: the input columns plus the finder columns.
///
/// Field order here defines the output header order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub first_name: String,
    pub last_name: String,
    pub company_website: String,
    pub email_found: Option<String>,
    pub status_code: Option<u16>,
    /// Verifier payload serialized as a JSON string inside the CSV cell
    pub validation_result: Option<String>,
    pub total_credits_used: Option<u32>,
    pub error: Option<String>,
}

impl EnrichedRecord {
    /// Build an output row from a processed contact and its finder report.
    pub fn from_report(contact: &ContactRecord, report: &FinderReport) -> Self {
        Self {
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            company_website: contact.company_website.clone(),
            email_found: report.email_found.clone(),
            status_code: report.status_code,
            validation_result: report
                .validation_result
                .as_ref()
                .map(|v| v.to_string()),
            total_credits_used: report.total_credits_used,
            error: report.error.clone(),
        }
    }

    /// Build an output row for a contact missing required fields.
    pub fn skipped(contact: &ContactRecord) -> Self {
        Self {
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            company_website: contact.company_website.clone(),
            email_found: None,
            status_code: None,
            validation_result: None,
            total_credits_used: None,
            error: Some("Missing required fields".to_string()),
        }
    }

    /// Build an output row for a contact whose lookup failed.
    pub fn failed(contact: &ContactRecord, error: impl Into<String>) -> Self {
        Self {
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            company_website: contact.company_website.clone(),
            email_found: None,
            status_code: None,
            validation_result: None,
            total_credits_used: None,
            error: Some(error.into()),
        }
    }

    /// Outcome classification for stats and checkpointing.
    pub fn outcome(&self) -> RowOutcome {
        match self.error.as_deref() {
            Some("Missing required fields") => RowOutcome::Skipped,
            Some(_) if self.email_found.is_none() => RowOutcome::Failed,
            _ => RowOutcome::Enriched,
        }
    }

    /// Serialize this row as a single headerless CSV line.
    pub fn to_csv_line(&self) -> Result<String, csv::Error> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(self)?;
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(std::io::Error::other(e.to_string())))?;
        Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
    }
}

/// Statistics for an enrichment run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Total input rows
    pub total_rows: usize,

    /// Rows enriched (report produced, match or not)
    pub enriched: usize,

    /// Rows with a real discovered address
    pub matched: usize,

    /// Rows skipped for missing required fields
    pub skipped: usize,

    /// Rows that failed after retries
    pub failed: usize,

    /// Verification credits spent across the run
    pub credits_used: u64,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Rows per hour throughput
    pub throughput_per_hour: f64,

    /// Match rate over enriched rows (0.0 - 1.0)
    pub match_rate: f64,
}

impl RunStats {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.enriched > 0 {
            self.match_rate = self.matched as f64 / self.enriched as f64;
        }
        if self.runtime_secs > 0.0 {
            let processed = self.enriched + self.skipped + self.failed;
            self.throughput_per_hour = processed as f64 / self.runtime_secs * 3600.0;
        }
    }

    /// Record one completed output row.
    pub fn record(&mut self, row: &EnrichedRecord, report: Option<&FinderReport>) {
        match row.outcome() {
            RowOutcome::Enriched => {
                self.enriched += 1;
                if report.is_some_and(FinderReport::has_match) {
                    self.matched += 1;
                }
            }
            RowOutcome::Skipped => self.skipped += 1,
            RowOutcome::Failed => self.failed += 1,
        }
        if let Some(credits) = report.and_then(|r| r.total_credits_used) {
            self.credits_used += u64::from(credits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fields_check_trims() {
        let contact = ContactRecord {
            first_name: "  ".to_string(),
            last_name: "Doe".to_string(),
            company_website: "example.com".to_string(),
        };
        assert!(!contact.has_required_fields());

        let contact = ContactRecord {
            first_name: "Jane".to_string(),
            last_name: String::new(),
            company_website: "example.com".to_string(),
        };
        assert!(contact.has_required_fields());
    }

    #[test]
    fn skipped_row_carries_original_error_string() {
        let contact = ContactRecord {
            first_name: String::new(),
            last_name: "Doe".to_string(),
            company_website: "example.com".to_string(),
        };
        let row = EnrichedRecord::skipped(&contact);
        assert_eq!(row.error.as_deref(), Some("Missing required fields"));
        assert_eq!(row.outcome(), RowOutcome::Skipped);
    }

    #[test]
    fn exhausted_report_is_enriched_but_not_matched() {
        let report = FinderReport::exhausted(7);
        assert!(!report.has_match());
        assert_eq!(report.email_found.as_deref(), Some(NO_VALID_EMAIL));

        let contact = ContactRecord {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            company_website: "example.com".to_string(),
        };
        let row = EnrichedRecord::from_report(&contact, &report);
        assert_eq!(row.outcome(), RowOutcome::Enriched);
        assert_eq!(row.total_credits_used, Some(7));
    }

    #[test]
    fn csv_line_preserves_column_order() {
        let contact = ContactRecord {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            company_website: "example.com".to_string(),
        };
        let report = FinderReport::found(
            "jane.doe@example.com".to_string(),
            serde_json::json!({"code": "ok"}),
            1,
        );
        let line = EnrichedRecord::from_report(&contact, &report)
            .to_csv_line()
            .unwrap();
        assert!(line.starts_with("Jane,Doe,example.com,jane.doe@example.com,"));
        assert!(line.contains(r#""{""code"":""ok""}""#));
    }

    #[test]
    fn contact_deserializes_with_extra_and_missing_columns() {
        let data = "first_name,company_website,city\nJane,example.com,Perth\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let contact: ContactRecord = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(contact.first_name, "Jane");
        assert_eq!(contact.last_name, "");
        assert_eq!(contact.company_website, "example.com");
    }

    #[test]
    fn stats_accounting() {
        let contact = ContactRecord {
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            company_website: "example.com".to_string(),
        };
        let mut stats = RunStats {
            total_rows: 3,
            ..Default::default()
        };

        let found = FinderReport::found("a@b.c".to_string(), serde_json::json!({}), 2);
        stats.record(&EnrichedRecord::from_report(&contact, &found), Some(&found));

        let exhausted = FinderReport::exhausted(7);
        stats.record(
            &EnrichedRecord::from_report(&contact, &exhausted),
            Some(&exhausted),
        );

        stats.record(&EnrichedRecord::skipped(&contact), None);

        assert_eq!(stats.enriched, 2);
        assert_eq!(stats.matched, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.credits_used, 9);

        stats.runtime_secs = 3600.0;
        stats.finalize();
        assert!((stats.match_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.throughput_per_hour - 3.0).abs() < f64::EPSILON);
    }
}
