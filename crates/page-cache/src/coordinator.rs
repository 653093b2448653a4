//! Per-exchange orchestration: lookup, invoke, evaluate, store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::Method;

use crate::backend::{CacheBackend, CacheEntry, CacheError, CacheResult};
use crate::config::CacheConfig;
use crate::directive::DirectiveOverrides;
use crate::error::ConfigError;
use crate::event::{BackendOperation, CacheEvent, CacheEventSink, LookupStatus, TracingSink};
use crate::exchange::{Request, Response};
use crate::headers::{expires_at, header_names};
use crate::key::{CacheKey, CacheKeyBuilder, VaryMetadata};
use crate::middleware::Application;
use crate::policy::{CacheControlPolicy, NotStorable, RequestPolicy, ResponsePolicy, Ttl};

// Values of the debug status header.
const STATUS_HIT: &str = "HIT";
const STATUS_MISS: &str = "MISS";
const STATUS_BYPASS: &str = "BYPASS";

/// Runs one exchange through the cache.
///
/// A hit is served without invoking the application. On a miss or bypass the
/// application's complete response is evaluated and, if storable, written to
/// the backend before being returned. Backend failures never change what the
/// client receives: lookups fail open to a miss and failed stores return the
/// application's response untouched.
///
/// The coordinator holds no per-exchange state and is shared behind an
/// [`Arc`].
pub struct CacheCoordinator<B> {
    backend: Arc<B>,
    keys: CacheKeyBuilder,
    request_policy: RequestPolicy,
    response_policy: ResponsePolicy,
    default_ttl: Ttl,
    max_body_size: usize,
    backend_timeout: Duration,
    debug_headers: bool,
    sink: Arc<dyn CacheEventSink>,
}

impl<B: CacheBackend> CacheCoordinator<B> {
    /// Build a coordinator from a validated configuration.
    pub fn new(backend: Arc<B>, config: &CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            backend,
            keys: CacheKeyBuilder::new().with_prefix(config.key_prefix.clone()),
            request_policy: RequestPolicy::new(),
            response_policy: ResponsePolicy::new()
                .with_shared(config.shared)
                .with_storable_statuses(config.storable_statuses.clone()),
            default_ttl: config.default_ttl(),
            max_body_size: config.max_body_size,
            backend_timeout: config.backend_timeout(),
            debug_headers: config.debug_headers,
            sink: Arc::new(TracingSink),
        })
    }

    /// Send events to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn CacheEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the response policy, e.g. with [`ResponsePolicy::never_cache`].
    pub fn with_response_policy(mut self, policy: ResponsePolicy) -> Self {
        self.response_policy = policy;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn key_builder(&self) -> &CacheKeyBuilder {
        &self.keys
    }

    pub fn response_policy(&self) -> &ResponsePolicy {
        &self.response_policy
    }

    pub fn default_ttl(&self) -> Ttl {
        self.default_ttl
    }

    /// Handle one exchange.
    ///
    /// Application errors are returned unchanged and nothing is stored.
    pub async fn handle<A>(&self, request: &Request, app: &A) -> Result<Response, A::Error>
    where
        A: Application + ?Sized,
    {
        let request_directives = request.cache_control();

        let label = if self
            .request_policy
            .is_lookup_eligible(&request.method, &request_directives)
        {
            if let Some(mut cached) = self.lookup(request).await {
                self.emit(CacheEvent::CacheLookup {
                    status: LookupStatus::Hit,
                });
                if request.method == Method::HEAD {
                    cached.body.clear();
                }
                self.tag(&mut cached, STATUS_HIT);
                return Ok(cached);
            }
            STATUS_MISS
        } else {
            self.emit(CacheEvent::LookupSkipped);
            STATUS_BYPASS
        };
        self.emit(CacheEvent::CacheLookup {
            status: LookupStatus::Miss,
        });

        let fresh = app.call(request).await?;
        let mut response = self.store(request, fresh).await;
        self.tag(&mut response, label);
        Ok(response)
    }

    // === Lookup ===

    async fn lookup(&self, request: &Request) -> Option<Response> {
        // A GET entry can answer a HEAD request.
        let candidates = if request.method == Method::HEAD {
            vec![Method::GET, Method::HEAD]
        } else {
            vec![request.method.clone()]
        };

        for method in &candidates {
            let primary = self.keys.primary_key(method, &request.url);
            if let Some(entry) = self.load_entry(&primary, request).await {
                return Some(entry.into_response());
            }
        }
        None
    }

    async fn load_entry(&self, primary: &CacheKey, request: &Request) -> Option<CacheEntry> {
        let vary = match self
            .bounded(self.keys.load_vary_metadata(&*self.backend, primary))
            .await
        {
            Ok(Some(vary)) => vary,
            Ok(None) => return None,
            Err(error) => {
                let vary_key = self.keys.vary_metadata_key(primary);
                self.lookup_failed(&vary_key, error).await;
                return None;
            }
        };

        let key = self.keys.entry_key(primary, &vary, &request.headers);
        let bytes = match self.bounded(self.backend.get(key.as_str())).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                self.lookup_failed(&key, error).await;
                return None;
            }
        };

        let entry = match CacheEntry::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(error) => {
                self.lookup_failed(&key, error).await;
                return None;
            }
        };

        // Backends may hold entries slightly past their TTL.
        entry
            .is_fresh(Utc::now().timestamp_millis())
            .then_some(entry)
    }

    async fn lookup_failed(&self, key: &CacheKey, error: CacheError) {
        match error {
            CacheError::Serialization(message) => {
                self.emit(CacheEvent::MalformedEntry {
                    key: key.to_string(),
                    error: message,
                });
                if let Err(error) = self.bounded(self.backend.delete(key.as_str())).await {
                    self.backend_failed(BackendOperation::Delete, key, &error);
                }
            }
            error => self.backend_failed(BackendOperation::Get, key, &error),
        }
    }

    // === Store ===

    async fn store(&self, request: &Request, mut response: Response) -> Response {
        if self.response_policy.is_never_cache() {
            CacheControlPolicy::never_cache().apply(&mut response);
        }

        let ttl = match self.evaluate(request, &response) {
            Ok(ttl) => ttl,
            Err(reason) => {
                self.emit(CacheEvent::NotStorable { reason });
                return response;
            }
        };

        let mut patched = response.clone();
        patch_caching_headers(&mut patched, ttl);

        match self.write(request, &patched, ttl).await {
            Some(key) => {
                self.emit(CacheEvent::StoreInCache {
                    max_age: ttl.max_age_secs(),
                    key: key.to_string(),
                });
                patched
            }
            None => response,
        }
    }

    fn evaluate(&self, request: &Request, response: &Response) -> Result<Ttl, NotStorable> {
        self.response_policy.check_storable(request, response)?;

        if response.body.len() > self.max_body_size {
            return Err(NotStorable::BodyTooLarge);
        }

        self.response_policy
            .effective_ttl(response, self.default_ttl)
            .ok_or(NotStorable::ZeroTtl)
    }

    /// Write Vary metadata, then the entry. Returns the entry key on success.
    async fn write(&self, request: &Request, response: &Response, ttl: Ttl) -> Option<CacheKey> {
        let primary = self.keys.primary_key(&request.method, &request.url);
        let vary = VaryMetadata::from_response(response);
        let key = self.keys.entry_key(&primary, &vary, &request.headers);

        let bytes = match CacheEntry::new(response, ttl).to_bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                self.backend_failed(BackendOperation::Set, &key, &error);
                return None;
            }
        };

        if let Err(error) = self
            .bounded(self.keys.store_vary_metadata(&*self.backend, &primary, &vary, ttl))
            .await
        {
            let vary_key = self.keys.vary_metadata_key(&primary);
            self.backend_failed(BackendOperation::Set, &vary_key, &error);
            return None;
        }

        if let Err(error) = self.bounded(self.backend.set(key.as_str(), bytes, ttl)).await {
            self.backend_failed(BackendOperation::Set, &key, &error);
            return None;
        }

        Some(key)
    }

    // === Helpers ===

    async fn bounded<T>(&self, operation: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        tokio::time::timeout(self.backend_timeout, operation)
            .await
            .unwrap_or(Err(CacheError::Timeout))
    }

    fn backend_failed(&self, operation: BackendOperation, key: &CacheKey, error: &CacheError) {
        self.emit(CacheEvent::BackendFailure {
            operation,
            key: key.to_string(),
            error: error.to_string(),
        });
    }

    fn tag(&self, response: &mut Response, label: &str) {
        if self.debug_headers {
            response.set_header(header_names::X_CACHE_STATUS, label);
        }
    }

    fn emit(&self, event: CacheEvent) {
        self.sink.emit(&event);
    }
}

/// Align `max-age` with the TTL and add `Expires` unless one is already set.
fn patch_caching_headers(response: &mut Response, ttl: Ttl) {
    let overrides = DirectiveOverrides::new().max_age(ttl.max_age_secs());
    let merged = response.cache_control().merge_validated(&overrides);
    response.set_cache_control(&merged);

    if let Ttl::Seconds(secs) = ttl {
        if !response.has_header(header_names::EXPIRES) {
            if let Some(expires) = expires_at(Utc::now(), secs) {
                response.set_header(header_names::EXPIRES, expires);
            }
        }
    }
}
