//! Configuration models for prospector.
//!
//! Every tunable the job exposes lives here, loaded from a TOML file with
//! serde defaults that match the original deployment's environment defaults.
//! Secrets are resolved from the environment at startup, never persisted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for prospector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Finder backend configuration
    #[serde(default)]
    pub finder: FinderConfig,

    /// Email verifier configuration (local backend)
    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Storage configuration (GCS bucket or local paths)
    #[serde(default)]
    pub storage: StorageConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Which backend resolves emails for each row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FinderMode {
    /// POST each row to a remote finder service
    #[default]
    Remote,
    /// Run pattern generation and verification in-process
    Local,
}

/// Finder backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinderConfig {
    /// Backend selection
    #[serde(default)]
    pub mode: FinderMode,

    /// Remote finder service URL
    #[serde(default = "default_finder_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_finder_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum delay between finder requests in seconds
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: f64,
}

fn default_finder_url() -> String {
    "https://us-central1-mailtester-validator.cloudfunctions.net/find_email".to_string()
}

fn default_finder_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_delay() -> f64 {
    0.5
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            mode: FinderMode::default(),
            url: default_finder_url(),
            timeout_secs: default_finder_timeout(),
            max_retries: default_max_retries(),
            request_delay_secs: default_request_delay(),
        }
    }
}

/// Email verifier configuration, used by the local backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Verifier API base URL
    #[serde(default = "default_verifier_url")]
    pub base_url: String,

    /// API key (can also be set via the env var named by `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_verifier_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds
    #[serde(default = "default_verifier_timeout")]
    pub timeout_secs: u64,

    /// Delay between candidate verifications in seconds
    #[serde(default = "default_attempt_delay")]
    pub attempt_delay_secs: f64,
}

fn default_verifier_url() -> String {
    "https://happy.mailtester.ninja/ninja".to_string()
}

fn default_verifier_key_env() -> String {
    "MAILTESTER_API_KEY".to_string()
}

fn default_verifier_timeout() -> u64 {
    10
}

fn default_attempt_delay() -> f64 {
    0.9
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_verifier_url(),
            api_key: None,
            api_key_env: default_verifier_key_env(),
            timeout_secs: default_verifier_timeout(),
            attempt_delay_secs: default_attempt_delay(),
        }
    }
}

/// Storage configuration.
///
/// `input` and `output` accept full locations (`gs://bucket/object` or a
/// local path) or bare object names resolved against `bucket`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Default GCS bucket for bare object names
    #[serde(default)]
    pub bucket: Option<String>,

    /// Input location or object name
    #[serde(default = "default_input")]
    pub input: String,

    /// Output location or object name
    #[serde(default = "default_output")]
    pub output: String,

    /// GCS API endpoint override (for emulators in tests)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding a bearer token for GCS
    #[serde(default = "default_gcs_token_env")]
    pub token_env: String,
}

fn default_input() -> String {
    "input.csv".to_string()
}

fn default_output() -> String {
    "output.csv".to_string()
}

fn default_gcs_token_env() -> String {
    "GCS_ACCESS_TOKEN".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            input: default_input(),
            output: default_output(),
            endpoint: None,
            token_env: default_gcs_token_env(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    #[serde(default = "default_pool_size")]
    pub size: usize,
}

fn default_pool_size() -> usize {
    5
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Checkpoint directory for resume support
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Resolve the verifier API key from config or environment.
    ///
    /// Required only when the local backend is selected.
    pub fn resolve_verifier_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.verifier.api_key {
            return Ok(expand_env_vars(key));
        }

        std::env::var(&self.verifier.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            purpose: "email verifier".to_string(),
            env_var: self.verifier.api_key_env.clone(),
        })
    }

    /// Validate settings for the selected backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.finder.mode {
            FinderMode::Remote => {
                if self.finder.url.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "finder.url must be set for remote mode".to_string(),
                    ));
                }
            }
            FinderMode::Local => {
                self.resolve_verifier_key()?;
            }
        }

        if self.workers.size == 0 {
            return Err(ConfigError::Invalid(
                "workers.size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax. Unset variables are left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key for {purpose}: set {env_var} env var or api_key in config")]
    MissingApiKey { purpose: String, env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_original_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.finder.mode, FinderMode::Remote);
        assert_eq!(config.workers.size, 5);
        assert!((config.finder.request_delay_secs - 0.5).abs() < f64::EPSILON);
        assert!((config.verifier.attempt_delay_secs - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.verifier.timeout_secs, 10);
        assert_eq!(config.storage.input, "input.csv");
        assert_eq!(config.storage.output, "output.csv");
    }

    #[test]
    fn partial_sections_parse() {
        let config: Config = toml::from_str(
            r#"
            [finder]
            mode = "local"
            request_delay_secs = 2.0

            [storage]
            bucket = "leads"
            input = "gs://other/in.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.finder.mode, FinderMode::Local);
        assert!((config.finder.request_delay_secs - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.storage.bucket.as_deref(), Some("leads"));
        assert_eq!(config.storage.input, "gs://other/in.csv");
        // untouched sections keep defaults
        assert_eq!(config.workers.size, 5);
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config: Config = toml::from_str("[workers]\nsize = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn verifier_key_from_config_wins_over_env() {
        let config: Config = toml::from_str(
            r#"
            [verifier]
            api_key = "sub_inline"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolve_verifier_key().unwrap(), "sub_inline");
    }

    #[test]
    fn expand_env_vars_leaves_unknown_placeholders() {
        let s = expand_env_vars("key-${PROSPECTOR_TEST_UNSET_VAR}");
        assert_eq!(s, "key-${PROSPECTOR_TEST_UNSET_VAR}");
    }
}
