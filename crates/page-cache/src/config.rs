//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::{Ttl, DEFAULT_STORABLE_STATUSES};

fn default_ttl_secs() -> Option<u64> {
    Some(600)
}

fn default_shared() -> bool {
    true
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

fn default_backend_timeout_ms() -> u64 {
    500
}

fn default_storable_statuses() -> Vec<u16> {
    DEFAULT_STORABLE_STATUSES.to_vec()
}

/// Configuration for a [`CacheCoordinator`](crate::CacheCoordinator).
///
/// # Example
///
/// ```toml
/// default_ttl_secs = 120
/// key_prefix = "shop:"
/// max_body_size = 262144
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Ceiling on how long a response is kept. `None` stores forever unless
    /// the response sets its own lifetime.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: Option<u64>,
    /// Namespace prepended to every key.
    #[serde(default)]
    pub key_prefix: String,
    /// Whether the store is shared between users.
    #[serde(default = "default_shared")]
    pub shared: bool,
    /// Largest body (in bytes) that will be stored.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Upper bound on each backend call.
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    /// Status codes that may be stored.
    #[serde(default = "default_storable_statuses")]
    pub storable_statuses: Vec<u16>,
    /// Add `X-Cache-Status` to responses.
    #[serde(default)]
    pub debug_headers: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            key_prefix: String::new(),
            shared: default_shared(),
            max_body_size: default_max_body_size(),
            backend_timeout_ms: default_backend_timeout_ms(),
            storable_statuses: default_storable_statuses(),
            debug_headers: false,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storable_statuses.is_empty() {
            return Err(ConfigError::Invalid(
                "storable_statuses must not be empty".to_string(),
            ));
        }
        if self.backend_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "backend_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the default TTL in seconds (`None` for forever).
    pub fn with_default_ttl(mut self, secs: Option<u64>) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    /// Set the key namespace.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set whether the store is shared.
    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Set the largest storable body.
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Set the backend timeout.
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable debug headers.
    pub fn with_debug_headers(mut self, enabled: bool) -> Self {
        self.debug_headers = enabled;
        self
    }

    /// The default TTL.
    pub fn default_ttl(&self) -> Ttl {
        Ttl::from_secs(self.default_ttl_secs)
    }

    /// The backend timeout.
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}
