//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.aport.io";

/// Configuration consumed by [`crate::AportClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL for the verification API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key, sent as a bearer token.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Deadline for a single exchange, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Freshness window of the cached key set, in seconds.
    #[serde(default = "default_jwks_ttl_secs")]
    pub jwks_ttl_secs: u64,

    /// Clock skew tolerated when checking decision token expiry.
    #[serde(default = "default_token_leeway_secs")]
    pub token_leeway_secs: u64,

    /// Expected `iss` of decision tokens; unchecked when absent.
    #[serde(default)]
    pub token_issuer: Option<String>,

    /// Validate tokens server-side when the key set cannot be obtained.
    #[serde(default)]
    pub remote_token_fallback: bool,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    800
}

fn default_jwks_ttl_secs() -> u64 {
    5 * 60
}

fn default_token_leeway_secs() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            jwks_ttl_secs: default_jwks_ttl_secs(),
            token_leeway_secs: default_token_leeway_secs(),
            token_issuer: None,
            remote_token_fallback: false,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `AGENT_PASSPORT_BASE_URL` | API base URL |
    /// | `AGENT_PASSPORT_API_KEY` | API key |
    /// | `AGENT_PASSPORT_TIMEOUT_MS` | Request timeout in milliseconds |
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("AGENT_PASSPORT_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_base_url),
            api_key: std::env::var("AGENT_PASSPORT_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
            timeout_ms: std::env::var("AGENT_PASSPORT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout_ms),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_token_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.token_issuer = Some(issuer.into());
        self
    }

    pub fn with_remote_token_fallback(mut self, enabled: bool) -> Self {
        self.remote_token_fallback = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_secs)
    }

    pub fn token_leeway(&self) -> Duration {
        Duration::from_secs(self.token_leeway_secs)
    }
}
