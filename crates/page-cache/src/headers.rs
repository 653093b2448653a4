//! Header list helpers and HTTP-date formatting.

use chrono::{DateTime, TimeDelta, Utc};

/// Header names read or written by the cache.
pub mod header_names {
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const EXPIRES: &str = "Expires";
    pub const VARY: &str = "Vary";
    pub const SET_COOKIE: &str = "Set-Cookie";
    pub const COOKIE: &str = "Cookie";
    /// Cache status header (HIT, MISS, BYPASS).
    pub const X_CACHE_STATUS: &str = "X-Cache-Status";
}

/// Ordered list of `(name, value)` header pairs. Names may repeat.
pub type HeaderList = Vec<(String, String)>;

/// First value of a header (case-insensitive name match).
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// All values of a header joined with `", "`, as if sent on a single line.
pub fn joined_header(headers: &[(String, String)], name: &str) -> Option<String> {
    let values: Vec<&str> = headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

/// Replace every occurrence of a header with a single value.
pub fn set_header(headers: &mut HeaderList, name: &str, value: impl Into<String>) {
    remove_header(headers, name);
    headers.push((name.to_string(), value.into()));
}

/// Remove every occurrence of a header.
pub fn remove_header(headers: &mut HeaderList, name: &str) {
    headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
}

/// Format a timestamp as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// HTTP-date for `now + seconds`, or `None` if the result is out of range.
pub fn expires_at(now: DateTime<Utc>, seconds: u64) -> Option<String> {
    let delta = TimeDelta::try_seconds(i64::try_from(seconds).ok()?)?;
    now.checked_add_signed(delta).map(http_date)
}
