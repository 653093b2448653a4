//! Application contract and the wrappers that put caching in front of it.
//!
//! Every wrapper is itself an [`Application`], so per-route and
//! pipeline-wide caching are the same code composed at different points.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::CacheBackend;
use crate::coordinator::CacheCoordinator;
use crate::directive::DirectiveOverrides;
use crate::error::PolicyViolation;
use crate::exchange::{Request, Response};
use crate::policy::CacheControlPolicy;

/// Something that turns a request into a complete response.
#[async_trait]
pub trait Application: Send + Sync {
    /// Error the application may fail with.
    type Error: Send;

    /// Produce a response for the request.
    async fn call(&self, request: &Request) -> Result<Response, Self::Error>;
}

#[async_trait]
impl<A: Application + ?Sized> Application for Arc<A> {
    type Error = A::Error;

    async fn call(&self, request: &Request) -> Result<Response, Self::Error> {
        (**self).call(request).await
    }
}

/// Application backed by an async closure.
pub struct AppFn<F> {
    handler: F,
}

/// Wrap a closure `Fn(Request) -> impl Future<Output = Result<Response, E>>`.
pub fn app_fn<F>(handler: F) -> AppFn<F> {
    AppFn { handler }
}

#[async_trait]
impl<F, Fut, E> Application for AppFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, E>> + Send,
    E: Send,
{
    type Error = E;

    async fn call(&self, request: &Request) -> Result<Response, E> {
        (self.handler)(request.clone()).await
    }
}

/// Serves and stores responses through a [`CacheCoordinator`].
pub struct CacheMiddleware<A, B> {
    inner: A,
    coordinator: Arc<CacheCoordinator<B>>,
}

impl<A, B> CacheMiddleware<A, B>
where
    A: Application,
    B: CacheBackend,
{
    /// Cache `inner` through `coordinator`.
    pub fn new(inner: A, coordinator: Arc<CacheCoordinator<B>>) -> Self {
        Self { inner, coordinator }
    }

    /// The coordinator in use.
    pub fn coordinator(&self) -> &Arc<CacheCoordinator<B>> {
        &self.coordinator
    }
}

#[async_trait]
impl<A, B> Application for CacheMiddleware<A, B>
where
    A: Application,
    B: CacheBackend,
{
    type Error = A::Error;

    async fn call(&self, request: &Request) -> Result<Response, A::Error> {
        self.coordinator.handle(request, &self.inner).await
    }
}

/// Merges fixed Cache-Control overrides into every response.
///
/// Only headers are touched, so it behaves the same with or without a cache
/// further down the chain.
pub struct CacheControlMiddleware<A> {
    inner: A,
    policy: CacheControlPolicy,
}

impl<A: Application> CacheControlMiddleware<A> {
    /// Fails if the overrides conflict, e.g. `public` and `private` together.
    pub fn new(inner: A, overrides: DirectiveOverrides) -> Result<Self, PolicyViolation> {
        Ok(Self {
            inner,
            policy: CacheControlPolicy::new(overrides)?,
        })
    }
}

#[async_trait]
impl<A: Application> Application for CacheControlMiddleware<A> {
    type Error = A::Error;

    async fn call(&self, request: &Request) -> Result<Response, A::Error> {
        let mut response = self.inner.call(request).await?;
        self.policy.apply(&mut response);
        Ok(response)
    }
}

/// Marks every response as uncacheable.
pub struct NeverCacheMiddleware<A> {
    inner: A,
    policy: CacheControlPolicy,
}

impl<A: Application> NeverCacheMiddleware<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            policy: CacheControlPolicy::never_cache(),
        }
    }
}

#[async_trait]
impl<A: Application> Application for NeverCacheMiddleware<A> {
    type Error = A::Error;

    async fn call(&self, request: &Request) -> Result<Response, A::Error> {
        let mut response = self.inner.call(request).await?;
        self.policy.apply(&mut response);
        Ok(response)
    }
}
