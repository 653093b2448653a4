//! Cache key derivation.
//!
//! Lookups are two-phase. The primary key (method + normalized URL) holds the
//! Vary metadata learnt from the last stored response; the entry itself lives
//! at the primary key when the response did not vary, or at a variant key
//! derived from the request headers named by Vary.

use std::fmt;

use http::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::{form_urlencoded, Url};

use crate::backend::{CacheBackend, CacheResult};
use crate::exchange::Response;
use crate::headers::joined_header;
use crate::policy::Ttl;

/// An opaque storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a cache key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request header names a stored response varies on, verbatim and in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaryMetadata {
    headers: Vec<String>,
}

impl VaryMetadata {
    /// Create from header names.
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers }
    }

    /// The names listed in a response's `Vary` header.
    pub fn from_response(response: &Response) -> Self {
        Self::new(response.vary())
    }

    /// Header names in Vary order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether the response varied on nothing.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> CacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored value.
    pub fn from_bytes(bytes: &[u8]) -> CacheResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Derives primary, metadata and variant keys.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    prefix: String,
}

impl CacheKeyBuilder {
    /// Create a key builder with no namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a namespace to every key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Key identifying a resource for one method.
    ///
    /// The URL is normalized first: scheme and host lower-cased, default port
    /// and fragment dropped, query parameters sorted. The path is kept
    /// byte-for-byte, so `//host/pi`, `/a\b` and `/a/../b` each get their
    /// own key.
    pub fn primary_key(&self, method: &Method, url: &str) -> CacheKey {
        let normalized = normalize_url(url);
        let digest = Sha256::new()
            .chain_update(method.as_str().as_bytes())
            .chain_update([0u8])
            .chain_update(normalized.as_bytes())
            .finalize();

        CacheKey(format!("{}page.{}.{}", self.prefix, method, hex::encode(digest)))
    }

    /// Key under which the Vary metadata for a primary key is kept.
    pub fn vary_metadata_key(&self, primary: &CacheKey) -> CacheKey {
        CacheKey(format!("{}.vary", primary))
    }

    /// Primary key qualified by the request's values for the Vary headers.
    ///
    /// Values are taken in Vary order, names matched case-insensitively, and
    /// a missing header counts as an empty value.
    pub fn variant_key(
        &self,
        primary: &CacheKey,
        vary: &VaryMetadata,
        request_headers: &[(String, String)],
    ) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(primary.as_str().as_bytes());

        for name in vary.headers() {
            let value = joined_header(request_headers, name).unwrap_or_default();
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }

        CacheKey(format!("{}.{}", primary, hex::encode(hasher.finalize())))
    }

    /// Where the entry lives: the primary key, or a variant key if it varies.
    pub fn entry_key(
        &self,
        primary: &CacheKey,
        vary: &VaryMetadata,
        request_headers: &[(String, String)],
    ) -> CacheKey {
        if vary.is_empty() {
            primary.clone()
        } else {
            self.variant_key(primary, vary, request_headers)
        }
    }

    /// Record which request headers future lookups of this resource must use.
    pub async fn store_vary_metadata<B: CacheBackend + ?Sized>(
        &self,
        backend: &B,
        primary: &CacheKey,
        vary: &VaryMetadata,
        ttl: Ttl,
    ) -> CacheResult<()> {
        let key = self.vary_metadata_key(primary);
        backend.set(key.as_str(), vary.to_bytes()?, ttl).await
    }

    /// Fetch the Vary metadata for a primary key; `None` means never stored.
    pub async fn load_vary_metadata<B: CacheBackend + ?Sized>(
        &self,
        backend: &B,
        primary: &CacheKey,
    ) -> CacheResult<Option<VaryMetadata>> {
        let key = self.vary_metadata_key(primary);
        match backend.get(key.as_str()).await? {
            Some(bytes) => VaryMetadata::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

fn normalize_url(raw: &str) -> String {
    if raw.starts_with('/') {
        return normalize_target(raw);
    }

    let Ok(url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.has_host() {
        return raw.to_string();
    }

    // Only the origin comes from the parser; the rest of the target stays raw.
    let after_scheme = raw.find("://").map_or(raw.len(), |at| at + 3);
    let target = raw[after_scheme..]
        .find(['/', '\\', '?', '#'])
        .map_or("", |at| &raw[after_scheme + at..]);

    let mut normalized = url.origin().ascii_serialization();
    if !target.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(&normalize_target(target));
    normalized
}

/// Path kept verbatim, fragment dropped, query pairs sorted.
fn normalize_target(target: &str) -> String {
    let target = target.split_once('#').map_or(target, |(before, _)| before);
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    let mut normalized = path.to_string();
    let mut pairs: Vec<(String, String)> = query
        .map(|query| form_urlencoded::parse(query.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    if !pairs.is_empty() {
        pairs.sort();
        normalized.push('?');
        normalized.push_str(
            &form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish(),
        );
    }

    normalized
}
