//! Delivering one event to several sinks.

use std::sync::Arc;

use page_cache::{CacheEvent, CacheEventSink};

/// Forwards every event to each inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn CacheEventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn CacheEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl CacheEventSink for FanoutSink {
    fn emit(&self, event: &CacheEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheMetrics;
    use page_cache::{LookupStatus, RecordingSink};

    #[test]
    fn test_fanout_reaches_every_sink() {
        let recorder = Arc::new(RecordingSink::new());
        let metrics = Arc::new(CacheMetrics::new());
        let fanout = FanoutSink::new().with(recorder.clone()).with(metrics.clone());

        fanout.emit(&CacheEvent::CacheLookup {
            status: LookupStatus::Miss,
        });

        assert_eq!(fanout.len(), 2);
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(metrics.snapshot().misses, 1);
    }

    #[test]
    fn test_empty_fanout() {
        let fanout = FanoutSink::new();
        fanout.emit(&CacheEvent::CacheLookup {
            status: LookupStatus::Hit,
        });
        assert!(fanout.is_empty());
    }
}
