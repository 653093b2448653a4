//! Storage backend contract and the stored entry format.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::exchange::Response;
use crate::headers::HeaderList;
use crate::policy::Ttl;

/// Result type for backend operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Backend operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish within the configured timeout.
    #[error("operation timed out")]
    Timeout,
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Key-value store holding cached responses.
///
/// Each operation must be atomic from the caller's point of view: a `set`
/// that fails, times out or is cancelled must not leave a partial value
/// visible to `get`. Concurrent writers to one key resolve last-write-wins.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a value, `None` on miss or expiry.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value for the given TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> CacheResult<()>;

    /// Remove a value. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

#[async_trait]
impl<B: CacheBackend + ?Sized> CacheBackend for Arc<B> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> CacheResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        (**self).delete(key).await
    }
}

/// Snapshot of a response as written to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, already patched with caching headers.
    pub headers: HeaderList,
    /// Response body, base64 in the serialized form.
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
    /// When the entry was stored (milliseconds since epoch).
    pub stored_at_ms: i64,
    /// TTL the entry was stored with.
    pub ttl: Ttl,
}

impl CacheEntry {
    /// Snapshot a response.
    pub fn new(response: &Response, ttl: Ttl) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at_ms: Utc::now().timestamp_millis(),
            ttl,
        }
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored value.
    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Age in milliseconds at `now_ms` (milliseconds since epoch).
    pub fn age_ms(&self, now_ms: i64) -> u64 {
        u64::try_from(now_ms.saturating_sub(self.stored_at_ms)).unwrap_or(0)
    }

    /// Whether the entry is still within its TTL at `now_ms`.
    ///
    /// Compared in milliseconds so an entry is never cut short by the
    /// second it was stored in.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        match self.ttl {
            Ttl::Seconds(secs) => self.age_ms(now_ms) < secs.saturating_mul(1_000),
            Ttl::Forever => true,
        }
    }

    /// Rebuild the response.
    pub fn into_response(self) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

// Bodies may be binary (e.g. gzip), so they travel as base64 inside JSON.
mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T: AsRef<[u8]>, S: Serializer>(body: T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory backend (for development and testing).
///
/// Writes replace the whole value under one lock, so readers never observe
/// a partial entry.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired values.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|v| !v.is_expired(now))
            .count()
    }

    /// Whether no unexpired values remain.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Unexpired keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, v)| !v.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|v| !v.is_expired(now))
            .map(|v| v.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> CacheResult<()> {
        let now = Instant::now();
        let expires_at = ttl.as_duration().and_then(|d| now.checked_add(d));

        let mut entries = self.entries.write().await;
        entries.retain(|_, v| !v.is_expired(now));
        entries.insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
