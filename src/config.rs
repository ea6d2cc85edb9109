use std::time::Duration;

use super::error::{EdinetError, Result};

/// Default base URL of the EDINET API (version 2).
pub const DEFAULT_BASE_URL: &str = "https://api.edinet-fsa.go.jp/api/v2";

/// Configuration for the Edinet client
#[derive(Debug, Clone)]
pub struct EdinetConfig {
    /// Subscription key sent with every request
    pub api_key: String,
    /// Rate limit in requests per second
    pub rate_limit: u32,
    /// HTTP request timeout
    pub timeout: Duration,
    /// How many times a transient failure is retried before it is surfaced
    pub max_retries: u32,
    /// Base URL of the API, without a trailing slash
    pub base_url: String,
}

impl Default for EdinetConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            rate_limit: 1,
            timeout: Duration::from_secs(30),
            max_retries: 5,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl EdinetConfig {
    /// Creates a new EdinetConfig with custom settings
    ///
    /// # Basic usage
    ///
    /// ```rust
    /// use edinetkit::{Edinet, EdinetConfig};
    /// use std::time::Duration;
    ///
    /// let config = EdinetConfig::new("your-subscription-key", 1, Duration::from_secs(30), None);
    /// let edinet = Edinet::with_config(config)?;
    /// # Ok::<(), edinetkit::EdinetError>(())
    /// ```
    pub fn new(
        api_key: impl Into<String>,
        rate_limit: u32,
        timeout: Duration,
        base_url: Option<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            rate_limit,
            timeout,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ..Default::default()
        }
    }

    /// Builds a configuration from the environment.
    ///
    /// `EDINET_API_KEY` is required; `EDINET_BASE_URL` overrides the default endpoint.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("EDINET_API_KEY")
            .map_err(|_| EdinetError::ConfigError("EDINET_API_KEY is not set".to_string()))?;
        let mut config = Self {
            api_key,
            ..Default::default()
        };
        if let Ok(base_url) = std::env::var("EDINET_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        Ok(config)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}
