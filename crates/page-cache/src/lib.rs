//! HTTP response caching in front of an application.
//!
//! This crate provides:
//! - `DirectiveSet` - Typed Cache-Control parsing, merging and serialization
//! - `RequestPolicy` - Whether a cache lookup may be attempted
//! - `ResponsePolicy` - Whether and for how long a response may be stored
//! - `CacheKeyBuilder` - Primary and Vary-qualified cache keys
//! - `CacheCoordinator` - Lookup, invoke, evaluate and store for one exchange
//! - `CacheMiddleware` / `CacheControlMiddleware` / `NeverCacheMiddleware` -
//!   Composable wrappers around an `Application`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use page_cache::{app_fn, CacheConfig, CacheCoordinator, InMemoryBackend, Request, Response};
//!
//! let config = CacheConfig::new().with_default_ttl(Some(120));
//! let cache = CacheCoordinator::new(Arc::new(InMemoryBackend::new()), &config)?;
//!
//! let app = app_fn(|_req: Request| async {
//!     Ok::<_, anyhow::Error>(Response::ok("3.14").with_header("Cache-Control", "max-age=3600"))
//! });
//!
//! // Stored for 120 seconds; the second call never reaches `app`.
//! cache.handle(&Request::get("/pi"), &app).await?;
//! cache.handle(&Request::get("/pi"), &app).await?;
//! ```

mod backend;
mod config;
mod coordinator;
mod directive;
mod error;
mod event;
mod exchange;
mod headers;
mod key;
mod middleware;
mod policy;

pub use backend::*;
pub use config::*;
pub use coordinator::*;
pub use directive::*;
pub use error::*;
pub use event::*;
pub use exchange::*;
pub use headers::*;
pub use key::*;
pub use middleware::*;
pub use policy::*;
