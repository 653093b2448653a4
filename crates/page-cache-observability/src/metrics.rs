//! Cache counters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use page_cache::{CacheEvent, CacheEventSink, LookupStatus};
use serde::{Deserialize, Serialize};

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    /// Misses, including exchanges whose lookup was skipped.
    pub misses: u64,
    /// Exchanges whose lookup was skipped.
    pub bypasses: u64,
    pub stores: u64,
    /// Responses not stored, by reason code.
    pub skipped: BTreeMap<String, u64>,
    pub backend_errors: u64,
    pub malformed_entries: u64,
}

impl MetricsSnapshot {
    /// Lookups attempted (skipped lookups excluded).
    pub fn lookups(&self) -> u64 {
        (self.hits + self.misses).saturating_sub(self.bypasses)
    }

    /// Fraction of attempted lookups that hit, 0.0 if none were attempted.
    pub fn hit_ratio(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Counts cache events. Cheap to update from many exchanges at once.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    stores: AtomicU64,
    backend_errors: AtomicU64,
    malformed_entries: AtomicU64,
    skipped: Mutex<HashMap<&'static str, u64>>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let skipped = self
            .skipped
            .lock()
            .map(|skipped| {
                skipped
                    .iter()
                    .map(|(reason, count)| (reason.to_string(), *count))
                    .collect()
            })
            .unwrap_or_default();

        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            skipped,
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            malformed_entries: self.malformed_entries.load(Ordering::Relaxed),
        }
    }
}

impl CacheEventSink for CacheMetrics {
    fn emit(&self, event: &CacheEvent) {
        let counter = match event {
            CacheEvent::CacheLookup { status } => match status {
                LookupStatus::Hit => &self.hits,
                LookupStatus::Miss => &self.misses,
            },
            CacheEvent::LookupSkipped => &self.bypasses,
            CacheEvent::StoreInCache { .. } => &self.stores,
            CacheEvent::BackendFailure { .. } => &self.backend_errors,
            CacheEvent::MalformedEntry { .. } => &self.malformed_entries,
            CacheEvent::NotStorable { reason } => {
                if let Ok(mut skipped) = self.skipped.lock() {
                    *skipped.entry(reason.as_str()).or_insert(0) += 1;
                }
                return;
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_cache::NotStorable;

    fn lookup(status: LookupStatus) -> CacheEvent {
        CacheEvent::CacheLookup { status }
    }

    #[test]
    fn test_counts_lookups() {
        let metrics = CacheMetrics::new();
        metrics.emit(&lookup(LookupStatus::Hit));
        metrics.emit(&lookup(LookupStatus::Hit));
        metrics.emit(&lookup(LookupStatus::Hit));
        metrics.emit(&lookup(LookupStatus::Miss));
        // A skipped lookup reports itself, then a miss.
        metrics.emit(&CacheEvent::LookupSkipped);
        metrics.emit(&lookup(LookupStatus::Miss));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 2);
        assert_eq!(snapshot.bypasses, 1);
        assert_eq!(snapshot.lookups(), 4);
        assert!((snapshot.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_ratio_without_lookups() {
        assert_eq!(MetricsSnapshot::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_counts_skips_by_reason() {
        let metrics = CacheMetrics::new();
        for reason in [NotStorable::NoStore, NotStorable::NoStore, NotStorable::VaryStar] {
            metrics.emit(&CacheEvent::NotStorable { reason });
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.skipped.get("no_store"), Some(&2));
        assert_eq!(snapshot.skipped.get("vary_star"), Some(&1));
    }

    #[test]
    fn test_counts_stores_and_failures() {
        let metrics = CacheMetrics::new();
        metrics.emit(&CacheEvent::StoreInCache {
            max_age: 60,
            key: "k".into(),
        });
        metrics.emit(&CacheEvent::MalformedEntry {
            key: "k".into(),
            error: "bad".into(),
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.stores, 1);
        assert_eq!(snapshot.malformed_entries, 1);
        assert_eq!(snapshot.backend_errors, 0);

        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json()).unwrap();
        assert_eq!(json["stores"], 1);
    }
}
