//! Session layer configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::logging::LogFormat;

/// Default REST service root.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

/// Default staleness window for cached queries (5 minutes).
pub const DEFAULT_CACHE_STALE: Duration = Duration::from_secs(300);

/// Default quiescence period before a search edit is applied.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);

/// Session layer configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root of the REST service, including any path prefix (e.g. `/api`).
    pub api_base_url: String,
    /// Per-request timeout. `Duration::ZERO` disables it.
    pub request_timeout: Duration,
    /// Default staleness window for the query cache.
    pub cache_stale_after: Duration,
    /// Debounce window for free-text search edits.
    pub search_debounce: Duration,
    /// Where the credential pair is persisted.
    pub credential_store_path: PathBuf,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            cache_stale_after: DEFAULT_CACHE_STALE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            credential_store_path: PathBuf::from("educonnect-credentials.json"),
            log_format: LogFormat::Text,
        }
    }
}

impl SessionConfig {
    /// Create a SessionConfig from environment variables.
    ///
    /// Environment variables:
    /// - `API_BASE_URL`: REST service root (default: `http://localhost:8000/api`)
    /// - `REQUEST_TIMEOUT_SECS`: request timeout in seconds, 0 disables (default: 30)
    /// - `CACHE_STALE_SECS`: query cache staleness window in seconds (default: 300)
    /// - `SEARCH_DEBOUNCE_MS`: search debounce in milliseconds (default: 400)
    /// - `CREDENTIAL_STORE_PATH`: credential file (default: `educonnect-credentials.json`)
    /// - `LOG_FORMAT`: `text` or `json` (default: `text`)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("API_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config.api_base_url = base_url.trim().to_string();
        }

        if let Some(secs) = env_parse::<u64>("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("CACHE_STALE_SECS") {
            config.cache_stale_after = Duration::from_secs(secs);
        }

        if let Some(ms) = env_parse::<u64>("SEARCH_DEBOUNCE_MS") {
            config.search_debounce = Duration::from_millis(ms);
        }

        if let Ok(path) = std::env::var("CREDENTIAL_STORE_PATH")
            && !path.trim().is_empty()
        {
            config.credential_store_path = PathBuf::from(path);
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.log_format = LogFormat::parse(&format);
        }

        config
    }

    /// Parse the base URL, normalised so relative endpoint paths join under it.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.api_base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)?;
        if url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "API base URL cannot be used as a base: {}",
                self.api_base_url
            )));
        }
        Ok(url)
    }

    /// Check the configuration for values the session layer cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.cache_stale_after.is_zero() {
            return Err(Error::config("cache staleness window must be non-zero"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
