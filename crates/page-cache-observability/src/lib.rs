//! Observability for the page cache.
//!
//! This crate provides:
//! - `EventLogger` - Structured JSON or human-readable event lines on stderr
//! - `CacheMetrics` - Hit, miss, store and failure counters
//! - `FanoutSink` - Deliver each event to several sinks
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use page_cache::CacheCoordinator;
//! use page_cache_observability::{CacheMetrics, EventLogger, FanoutSink};
//!
//! let metrics = Arc::new(CacheMetrics::new());
//! let sink = FanoutSink::new()
//!     .with(Arc::new(EventLogger::from_env()))
//!     .with(metrics.clone());
//! let cache = CacheCoordinator::new(backend, &config)?.with_sink(Arc::new(sink));
//! ```

mod fanout;
mod logging;
mod metrics;

pub use fanout::*;
pub use logging::*;
pub use metrics::*;
