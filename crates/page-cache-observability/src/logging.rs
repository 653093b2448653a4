//! Structured logging of cache events.

use std::env;
use std::fmt;

use page_cache::{CacheEvent, CacheEventSink};
use serde::Serialize;

/// Environment variable that overrides the minimum level.
pub const LOG_LEVEL_ENV: &str = "PAGE_CACHE_LOG_LEVEL";

/// Log level for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Level an event is logged at.
    pub fn for_event(event: &CacheEvent) -> Self {
        match event {
            CacheEvent::CacheLookup { .. } | CacheEvent::StoreInCache { .. } => Self::Debug,
            CacheEvent::NotStorable { .. } | CacheEvent::LookupSkipped => Self::Trace,
            CacheEvent::BackendFailure { .. } | CacheEvent::MalformedEntry { .. } => Self::Warn,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Output format for logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format (for production/log aggregation).
    #[default]
    Json,
    /// Human-readable format (for development).
    Human,
}

/// A structured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    /// Event name, e.g. `cache_lookup`.
    pub event: String,
    /// Event fields.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LogEntry {
    /// Build an entry from an event.
    pub fn from_event(event: &CacheEvent) -> Self {
        let fields = match serde_json::to_value(event) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("event");
                map
            }
            _ => serde_json::Map::new(),
        };

        Self {
            level: LogLevel::for_event(event),
            event: event.name().to_string(),
            fields,
        }
    }

    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.event.clone())
    }

    /// Format as human-readable string.
    pub fn to_human(&self) -> String {
        let mut s = format!("[{}] {}", self.level, self.event);

        if !self.fields.is_empty() {
            s.push_str(" | ");
            let fields: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(text) => format!("{}={}", k, text),
                    other => format!("{}={}", k, other),
                })
                .collect();
            s.push_str(&fields.join(" "));
        }

        s
    }
}

/// Writes cache events to stderr as structured lines.
#[derive(Debug, Clone)]
pub struct EventLogger {
    min_level: LogLevel,
    format: LogFormat,
}

impl Default for EventLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            format: LogFormat::Json,
        }
    }
}

impl EventLogger {
    /// Logger at `info` in JSON.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger whose minimum level comes from `PAGE_CACHE_LOG_LEVEL`, if set.
    pub fn from_env() -> Self {
        let logger = Self::new();
        match env::var(LOG_LEVEL_ENV).ok().as_deref().and_then(LogLevel::parse) {
            Some(level) => logger.with_min_level(level),
            None => logger,
        }
    }

    /// Set minimum log level.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Set output format.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// The line this logger would write, or `None` if filtered out.
    pub fn render(&self, event: &CacheEvent) -> Option<String> {
        if LogLevel::for_event(event) < self.min_level {
            return None;
        }

        let entry = LogEntry::from_event(event);
        Some(match self.format {
            LogFormat::Json => entry.to_json(),
            LogFormat::Human => entry.to_human(),
        })
    }
}

impl CacheEventSink for EventLogger {
    fn emit(&self, event: &CacheEvent) {
        if let Some(line) = self.render(event) {
            eprintln!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_cache::{LookupStatus, NotStorable};

    fn lookup(status: LookupStatus) -> CacheEvent {
        CacheEvent::CacheLookup { status }
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" trace "), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_event_levels() {
        assert_eq!(LogLevel::for_event(&lookup(LookupStatus::Hit)), LogLevel::Debug);
        assert_eq!(
            LogLevel::for_event(&CacheEvent::NotStorable {
                reason: NotStorable::NoStore
            }),
            LogLevel::Trace
        );
        assert_eq!(
            LogLevel::for_event(&CacheEvent::MalformedEntry {
                key: "k".into(),
                error: "bad".into()
            }),
            LogLevel::Warn
        );
    }

    #[test]
    fn test_render_lookup_skipped() {
        let logger = EventLogger::new()
            .with_min_level(LogLevel::Trace)
            .with_format(LogFormat::Human);

        assert_eq!(
            logger.render(&CacheEvent::LookupSkipped).as_deref(),
            Some("[TRACE] lookup_skipped")
        );
    }

    #[test]
    fn test_default_filters_debug() {
        let logger = EventLogger::new();
        assert_eq!(logger.render(&lookup(LookupStatus::Miss)), None);
    }

    #[test]
    fn test_render_json() {
        let logger = EventLogger::new().with_min_level(LogLevel::Debug);
        let line = logger
            .render(&CacheEvent::StoreInCache {
                max_age: 120,
                key: "page.GET.abc".into(),
            })
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(json["level"], "debug");
        assert_eq!(json["event"], "store_in_cache");
        assert_eq!(json["max_age"], 120);
        assert_eq!(json["key"], "page.GET.abc");
    }

    #[test]
    fn test_render_human() {
        let logger = EventLogger::new()
            .with_min_level(LogLevel::Trace)
            .with_format(LogFormat::Human);

        assert_eq!(
            logger.render(&lookup(LookupStatus::Hit)).as_deref(),
            Some("[DEBUG] cache_lookup | status=HIT")
        );
    }

    #[test]
    fn test_warnings_pass_default_level() {
        let logger = EventLogger::new().with_format(LogFormat::Human);
        let line = logger
            .render(&CacheEvent::BackendFailure {
                operation: page_cache::BackendOperation::Get,
                key: "k".into(),
                error: "operation timed out".into(),
            })
            .unwrap();

        assert!(line.starts_with("[WARN] backend_failure"));
        assert!(line.contains("operation=get"));
    }
}
