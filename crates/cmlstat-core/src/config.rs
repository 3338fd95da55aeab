//! Report configuration
//!
//! [`ReportConfig`] is built once at startup and handed to every component
//! that needs it. Values are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config PATH`, `./cmlstat.toml`, or
//!    `<config_dir>/cmlstat/config.toml`)
//! 3. environment variables (`CDSW_API_URL`, `CDSW_APIV2_KEY`,
//!    `CMLSTAT_OUTPUT_DIR`, `CMLSTAT_PAGE_SIZE`, `CMLSTAT_MAX_RETRIES`)
//! 4. command-line flags, applied by the binary
//!
//! # Example file
//!
//! ```toml
//! [api]
//! base_url = "https://ml.example.com"
//! page_size = 500
//!
//! [retry]
//! max_retries = 5
//!
//! [output]
//! directory = "/var/reports/cml"
//! ```

use crate::error::{CmlstatError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding the API base URL
pub const ENV_API_URL: &str = "CDSW_API_URL";
/// Environment variable holding the API key
pub const ENV_API_KEY: &str = "CDSW_APIV2_KEY";
/// Environment variable overriding the output directory
pub const ENV_OUTPUT_DIR: &str = "CMLSTAT_OUTPUT_DIR";
/// Environment variable overriding the page size
pub const ENV_PAGE_SIZE: &str = "CMLSTAT_PAGE_SIZE";
/// Environment variable overriding the retry count
pub const ENV_MAX_RETRIES: &str = "CMLSTAT_MAX_RETRIES";

/// Complete configuration for a report run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Usage API connection
    pub api: ApiConfig,
    /// Retry behaviour for API calls
    pub retry: RetryPolicy,
    /// Export destination
    pub output: OutputConfig,
}

/// Usage API connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Workspace URL; a trailing `/api/v1` or `/api/v2` is ignored
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_key: Option<String>,
    /// Records requested per listUsage page
    pub page_size: u32,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            page_size: 1000,
            timeout_secs: 60,
        }
    }
}

impl ApiConfig {
    /// Base URL without trailing slash or API version suffix
    ///
    /// # Examples
    /// ```
    /// use cmlstat_core::config::ApiConfig;
    ///
    /// let api = ApiConfig { base_url: "https://ml.example.com/api/v1/".into(), ..Default::default() };
    /// assert_eq!(api.root_url(), "https://ml.example.com");
    /// ```
    pub fn root_url(&self) -> &str {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        trimmed
            .strip_suffix("/api/v1")
            .or_else(|| trimmed.strip_suffix("/api/v2"))
            .unwrap_or(trimmed)
    }
}

/// Exponential backoff policy for API calls
///
/// The delay before retry `n` (0-based) is
/// `backoff_ms * backoff_factor^n`, capped at `max_backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub backoff_ms: u64,
    /// Multiplier applied per retry
    pub backoff_factor: u64,
    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
            backoff_factor: 2,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry_attempt` (0-based)
    ///
    /// # Examples
    /// ```
    /// use cmlstat_core::config::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff_for(0), Duration::from_millis(500));
    /// assert_eq!(policy.backoff_for(2), Duration::from_millis(2000));
    /// assert_eq!(policy.backoff_for(10), Duration::from_millis(10_000));
    /// ```
    pub fn backoff_for(&self, retry_attempt: u32) -> Duration {
        let exponential = self
            .backoff_ms
            .saturating_mul(self.backoff_factor.saturating_pow(retry_attempt));
        Duration::from_millis(exponential.min(self.max_backoff_ms))
    }
}

/// Export destination settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the report files are written to
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("reports"),
        }
    }
}

impl ReportConfig {
    /// Load configuration from defaults, a TOML file and the environment
    ///
    /// When `explicit_path` is given the file must exist. Otherwise the
    /// first of `./cmlstat.toml` and `<config_dir>/cmlstat/config.toml`
    /// that exists is used, if any.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::load_from_file(&path)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Candidate configuration file locations, in lookup order
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("cmlstat.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("cmlstat").join("config.toml"));
        }
        paths
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!(config_file = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path).map_err(|e| {
            CmlstatError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            CmlstatError::Config(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var(ENV_API_URL) {
            self.api.base_url = val;
        }
        if let Ok(val) = env::var(ENV_API_KEY) {
            self.api.api_key = Some(val);
        }
        if let Ok(val) = env::var(ENV_OUTPUT_DIR) {
            self.output.directory = PathBuf::from(val);
        }
        if let Ok(val) = env::var(ENV_PAGE_SIZE) {
            self.api.page_size = val
                .parse()
                .map_err(|_| CmlstatError::Config(format!("Invalid {ENV_PAGE_SIZE}: {val}")))?;
        }
        if let Ok(val) = env::var(ENV_MAX_RETRIES) {
            self.retry.max_retries = val
                .parse()
                .map_err(|_| CmlstatError::Config(format!("Invalid {ENV_MAX_RETRIES}: {val}")))?;
        }
        Ok(())
    }

    /// Check that the configuration can drive a report run
    pub fn validate(&self) -> Result<()> {
        if self.api.root_url().is_empty() {
            return Err(CmlstatError::Config(format!(
                "API base URL is not set (use --api-url, {ENV_API_URL}, or api.base_url)"
            )));
        }
        if self.api.page_size == 0 {
            return Err(CmlstatError::Config("api.page_size must be > 0".into()));
        }
        if self.retry.backoff_factor == 0 {
            return Err(CmlstatError::Config(
                "retry.backoff_factor must be > 0".into(),
            ));
        }
        if self.output.directory.as_os_str().is_empty() {
            return Err(CmlstatError::Config(
                "output.directory must not be empty".into(),
            ));
        }
        Ok(())
    }
}
