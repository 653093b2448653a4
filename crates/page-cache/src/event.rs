//! Structured cache events and the sinks that receive them.
//!
//! The core never configures logging. It emits one [`CacheEvent`] per state
//! transition into whatever [`CacheEventSink`] it was given.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::policy::NotStorable;

/// Result of the lookup phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LookupStatus {
    /// Served from cache; the application was not invoked.
    Hit,
    /// Not found, or the lookup was skipped.
    Miss,
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
        }
    }
}

/// Backend operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendOperation {
    Get,
    Set,
    Delete,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Set => write!(f, "set"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Something the cache did while handling an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    /// Outcome of the lookup phase, once per exchange.
    CacheLookup { status: LookupStatus },
    /// The request was not eligible for lookup (unsafe method or `no-cache`).
    /// Followed by a `cache_lookup` MISS.
    LookupSkipped,
    /// A response was written to the backend.
    StoreInCache { max_age: u64, key: String },
    /// A fresh response was not written.
    NotStorable { reason: NotStorable },
    /// A backend call failed; the exchange continued without the cache.
    BackendFailure {
        operation: BackendOperation,
        key: String,
        error: String,
    },
    /// A stored value could not be decoded and was purged.
    MalformedEntry { key: String, error: String },
}

impl CacheEvent {
    /// Event name, as used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CacheLookup { .. } => "cache_lookup",
            Self::LookupSkipped => "lookup_skipped",
            Self::StoreInCache { .. } => "store_in_cache",
            Self::NotStorable { .. } => "response_not_cachable",
            Self::BackendFailure { .. } => "backend_failure",
            Self::MalformedEntry { .. } => "malformed_entry",
        }
    }
}

/// Receiver of cache events.
pub trait CacheEventSink: Send + Sync {
    /// Handle one event. Must not block the exchange for long.
    fn emit(&self, event: &CacheEvent);
}

/// Forwards events to `tracing`. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl CacheEventSink for TracingSink {
    fn emit(&self, event: &CacheEvent) {
        match event {
            CacheEvent::CacheLookup { status } => {
                tracing::debug!(status = %status, "cache_lookup {}", status);
            }
            CacheEvent::LookupSkipped => {
                tracing::trace!("lookup_skipped");
            }
            CacheEvent::StoreInCache { max_age, key } => {
                tracing::debug!(max_age, key = %key, "store_in_cache max_age={}", max_age);
            }
            CacheEvent::NotStorable { reason } => {
                tracing::trace!(reason = %reason, "response_not_cachable reason={}", reason);
            }
            CacheEvent::BackendFailure {
                operation,
                key,
                error,
            } => {
                tracing::warn!(operation = %operation, key = %key, error = %error, "cache backend failure");
            }
            CacheEvent::MalformedEntry { key, error } => {
                tracing::warn!(key = %key, error = %error, "purging malformed cache entry");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl CacheEventSink for NoopSink {
    fn emit(&self, _event: &CacheEvent) {}
}

/// Keeps every event in memory (for tests and debugging endpoints).
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CacheEvent>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl CacheEventSink for RecordingSink {
    fn emit(&self, event: &CacheEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
