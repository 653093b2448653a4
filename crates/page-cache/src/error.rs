//! Error types for cache policy configuration.

use thiserror::Error;

/// A cache policy that cannot be honoured as configured.
///
/// Raised synchronously to whoever builds the policy, never resolved silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// `public` and `private` were both requested for the same response.
    #[error("`public` and `private` cannot both be set on the same response")]
    ConflictingScope,

    /// A valued directive was given a boolean.
    #[error("`{0}` expects a number of seconds, not a flag")]
    ExpectedSeconds(String),

    /// A flag directive was given a number.
    #[error("`{0}` is a flag and does not take a value")]
    UnexpectedValue(String),
}

/// Errors raised while loading a [`CacheConfig`](crate::CacheConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("Failed to parse cache config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid cache config: {0}")]
    Invalid(String),
}
