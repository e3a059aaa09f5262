//! Configuration for the CCRV orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Provider endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the CCRV provider API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent on every provider request.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds. Bounds every `initiate`/`poll`
    /// provider call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl ProviderConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connection timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Retry/backoff settings for callbacks that arrive before their
/// transaction record exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRetryConfig {
    /// Maximum delivery attempts for a parked callback.
    #[serde(default = "default_callback_attempts")]
    pub max_attempts: u32,

    /// First retry delay in milliseconds; doubles per attempt.
    #[serde(default = "default_callback_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on a single retry delay in milliseconds.
    #[serde(default = "default_callback_backoff_cap")]
    pub max_backoff_ms: u64,
}

impl CallbackRetryConfig {
    /// Exponential backoff for the given 1-based attempt number.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

impl Default for CallbackRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_callback_attempts(),
            initial_backoff_ms: default_callback_backoff(),
            max_backoff_ms: default_callback_backoff_cap(),
        }
    }
}

/// Retry settings for the post-submit store write in `initiate`.
///
/// The provider-issued transaction id must never be dropped, so the write
/// is retried with the same id rather than re-submitting to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRetryConfig {
    /// Maximum create attempts.
    #[serde(default = "default_store_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_store_backoff")]
    pub backoff_ms: u64,
}

impl StoreRetryConfig {
    /// Delay between create attempts.
    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_store_attempts(),
            backoff_ms: default_store_backoff(),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider endpoint settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Parked-callback retry settings.
    #[serde(default)]
    pub callback_retry: CallbackRetryConfig,

    /// Post-submit store write retry settings.
    #[serde(default)]
    pub store_retry: StoreRetryConfig,

    /// Verification credits granted to the in-process quota ledger (CLI
    /// runs only; deployments wire the billing service instead).
    #[serde(default = "default_quota_credits")]
    pub quota_credits: u64,

    /// Seconds between polls when the CLI waits for a terminal state.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            callback_retry: CallbackRetryConfig::default(),
            store_retry: StoreRetryConfig::default(),
            quota_credits: default_quota_credits(),
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.ccrv-provider.example".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_callback_attempts() -> u32 {
    6
}

const fn default_callback_backoff() -> u64 {
    50
}

const fn default_callback_backoff_cap() -> u64 {
    5_000
}

const fn default_store_attempts() -> u32 {
    4
}

const fn default_store_backoff() -> u64 {
    100
}

const fn default_quota_credits() -> u64 {
    100
}

const fn default_poll_interval() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default configuration file location.
#[must_use]
pub fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "ccrv-orchestrator")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("ccrv-orchestrator.toml"))
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
