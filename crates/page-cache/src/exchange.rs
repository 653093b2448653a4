//! Request and response snapshots passed between the cache and the application.

use http::Method;

use crate::directive::DirectiveSet;
use crate::headers::{find_header, header_names, joined_header, remove_header, set_header, HeaderList};

/// An incoming request, as seen by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Request target: an absolute URL or an origin-form path with query.
    pub url: String,
    /// Request headers in arrival order.
    pub headers: HeaderList,
}

impl Request {
    /// Create a request without headers.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Create a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Whether the client sent a non-empty `Cookie` header.
    pub fn has_cookie(&self) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(header_names::COOKIE) && !v.trim().is_empty())
    }

    /// The request's own Cache-Control directives.
    pub fn cache_control(&self) -> DirectiveSet {
        joined_header(&self.headers, header_names::CACHE_CONTROL)
            .map(|v| DirectiveSet::parse(&v))
            .unwrap_or_default()
    }
}

/// A complete, buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in emission order.
    pub headers: HeaderList,
    /// The full response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Create an empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Create a 200 response with a body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200).with_body(body)
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Whether the header is present at all.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Replace a header.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        set_header(&mut self.headers, name, value);
    }

    /// Remove a header.
    pub fn remove_header(&mut self, name: &str) {
        remove_header(&mut self.headers, name);
    }

    /// The response's Cache-Control directives.
    pub fn cache_control(&self) -> DirectiveSet {
        joined_header(&self.headers, header_names::CACHE_CONTROL)
            .map(|v| DirectiveSet::parse(&v))
            .unwrap_or_default()
    }

    /// Replace Cache-Control with the serialized directives, dropping it when empty.
    pub fn set_cache_control(&mut self, directives: &DirectiveSet) {
        if directives.is_empty() {
            self.remove_header(header_names::CACHE_CONTROL);
        } else {
            self.set_header(header_names::CACHE_CONTROL, directives.serialize());
        }
    }

    /// Header names listed in `Vary`, verbatim and in order.
    pub fn vary(&self) -> Vec<String> {
        joined_header(&self.headers, header_names::VARY)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get the body as UTF-8 text, if valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}
