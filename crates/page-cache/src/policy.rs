//! Request and response caching policies.

use std::fmt;
use std::time::Duration;

use http::Method;
use serde::{Deserialize, Serialize};

use crate::directive::{directive_names, DirectiveOverrides, DirectiveSet};
use crate::error::PolicyViolation;
use crate::exchange::{Request, Response};
use crate::headers::header_names;

/// One year, the furthest an `Expires` date should be set in the future.
pub const ONE_YEAR_SECS: u64 = 60 * 60 * 24 * 365;

/// Status codes storable by default.
pub const DEFAULT_STORABLE_STATUSES: [u16; 7] = [200, 203, 300, 301, 302, 404, 410];

/// How long a stored entry stays valid.
///
/// "Do not cache" is the absence of a TTL (`Option<Ttl>::None`), never a
/// zero or negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ttl {
    /// Expires after this many seconds.
    Seconds(u64),
    /// Never expires on its own; only eviction removes it.
    Forever,
}

impl Ttl {
    /// Expiry as a duration, `None` for [`Ttl::Forever`].
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Seconds(secs) => Some(Duration::from_secs(*secs)),
            Self::Forever => None,
        }
    }

    /// Value for the outgoing `max-age` directive.
    pub fn max_age_secs(&self) -> u64 {
        match self {
            Self::Seconds(secs) => *secs,
            Self::Forever => ONE_YEAR_SECS,
        }
    }

    /// Build from an optional number of seconds, `None` meaning forever.
    pub fn from_secs(secs: Option<u64>) -> Self {
        secs.map_or(Self::Forever, Self::Seconds)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(secs) => write!(f, "{}s", secs),
            Self::Forever => write!(f, "forever"),
        }
    }
}

/// Whether a method is safe enough to serve from cache.
pub fn is_cacheable_method(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// Decides whether a cache lookup may be attempted for a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestPolicy;

impl RequestPolicy {
    /// Create the request policy.
    pub fn new() -> Self {
        Self
    }

    /// True for GET/HEAD requests whose Cache-Control lacks `no-cache`.
    ///
    /// A `no-cache` request skips the lookup, but its fresh response may still
    /// be stored.
    pub fn is_lookup_eligible(&self, method: &Method, request_directives: &DirectiveSet) -> bool {
        is_cacheable_method(method) && !request_directives.has_flag(directive_names::NO_CACHE)
    }
}

/// Why a response was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotStorable {
    /// The request method is not GET or HEAD.
    Method,
    /// The status code is not in the storable allow-list.
    StatusCode,
    /// `no-store` on the request or the response.
    NoStore,
    /// `private` response and the store is shared.
    Private,
    /// `Set-Cookie` in response to a request that sent no cookie.
    CookiesForCookielessRequest,
    /// `Vary: *`.
    VaryStar,
    /// The effective TTL is zero, or `no-cache` was set.
    ZeroTtl,
    /// The body exceeds the configured maximum.
    BodyTooLarge,
    /// Caching is disabled for this endpoint.
    NeverCache,
}

impl NotStorable {
    /// Short reason code for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::StatusCode => "status_code",
            Self::NoStore => "no_store",
            Self::Private => "private",
            Self::CookiesForCookielessRequest => "cookies_for_cookieless_request",
            Self::VaryStar => "vary_star",
            Self::ZeroTtl => "zero_ttl",
            Self::BodyTooLarge => "body_too_large",
            Self::NeverCache => "never_cache",
        }
    }
}

impl fmt::Display for NotStorable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PolicyMode {
    #[default]
    Standard,
    NeverCache,
}

/// Decides whether a response may be stored, and for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePolicy {
    mode: PolicyMode,
    /// Whether the store is shared between users (server-side).
    pub shared: bool,
    /// Status codes that may be stored.
    pub storable_statuses: Vec<u16>,
}

impl Default for ResponsePolicy {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Standard,
            shared: true,
            storable_statuses: DEFAULT_STORABLE_STATUSES.to_vec(),
        }
    }
}

impl ResponsePolicy {
    /// Standard policy for a shared store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never stores and marks every response uncacheable.
    pub fn never_cache() -> Self {
        Self {
            mode: PolicyMode::NeverCache,
            ..Default::default()
        }
    }

    /// Set whether the store is shared.
    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    /// Replace the storable status allow-list.
    pub fn with_storable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.storable_statuses = statuses;
        self
    }

    /// Whether this is the never-cache policy.
    pub fn is_never_cache(&self) -> bool {
        self.mode == PolicyMode::NeverCache
    }

    /// Check storability, reporting the first reason it fails.
    pub fn check_storable(&self, request: &Request, response: &Response) -> Result<(), NotStorable> {
        if self.is_never_cache() {
            return Err(NotStorable::NeverCache);
        }

        if !is_cacheable_method(&request.method) {
            return Err(NotStorable::Method);
        }

        if !self.storable_statuses.contains(&response.status) {
            return Err(NotStorable::StatusCode);
        }

        let directives = response.cache_control();
        if directives.has_flag(directive_names::NO_STORE)
            || request.cache_control().has_flag(directive_names::NO_STORE)
        {
            return Err(NotStorable::NoStore);
        }

        if self.shared && directives.has_flag(directive_names::PRIVATE) {
            return Err(NotStorable::Private);
        }

        if response.has_header(header_names::SET_COOKIE) && !request.has_cookie() {
            return Err(NotStorable::CookiesForCookielessRequest);
        }

        if response.vary().iter().any(|name| name == "*") {
            return Err(NotStorable::VaryStar);
        }

        Ok(())
    }

    /// Whether the response may be stored at all.
    pub fn is_storable(&self, request: &Request, response: &Response) -> bool {
        self.check_storable(request, response).is_ok()
    }

    /// TTL to store the response with, or `None` for no caching.
    ///
    /// The default TTL is a ceiling: the result is the minimum of the default
    /// and the response's own lifetime (`s-maxage` before `max-age` when the
    /// store is shared). A [`Ttl::Forever`] default imposes no ceiling. Zero,
    /// `no-cache` and `no-store` all yield `None`.
    pub fn effective_ttl(&self, response: &Response, default_ttl: Ttl) -> Option<Ttl> {
        if self.is_never_cache() {
            return None;
        }

        let directives = response.cache_control();
        if directives.has_flag(directive_names::NO_CACHE)
            || directives.has_flag(directive_names::NO_STORE)
        {
            return None;
        }

        let shared_lifetime = if self.shared {
            directives.value_of(directive_names::S_MAXAGE)
        } else {
            None
        };
        let lifetime = shared_lifetime.or_else(|| directives.value_of(directive_names::MAX_AGE));

        let ttl = match (lifetime, default_ttl) {
            (Some(secs), Ttl::Seconds(ceiling)) => Ttl::Seconds(secs.min(ceiling)),
            (Some(secs), Ttl::Forever) => Ttl::Seconds(secs),
            (None, default) => default,
        };

        match ttl {
            Ttl::Seconds(0) => None,
            ttl => Some(ttl),
        }
    }

    /// Storability and TTL together.
    pub fn evaluate(
        &self,
        request: &Request,
        response: &Response,
        default_ttl: Ttl,
    ) -> Result<Ttl, NotStorable> {
        self.check_storable(request, response)?;
        self.effective_ttl(response, default_ttl)
            .ok_or(NotStorable::ZeroTtl)
    }
}

/// Rewrites the outgoing Cache-Control by merging fixed overrides into it.
///
/// Touches headers only; storage decisions are left to whatever cache sits
/// downstream, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheControlPolicy {
    overrides: DirectiveOverrides,
}

impl CacheControlPolicy {
    /// Validate the overrides up front.
    pub fn new(overrides: DirectiveOverrides) -> Result<Self, PolicyViolation> {
        overrides.validate()?;
        Ok(Self { overrides })
    }

    /// `no-store, no-cache, must-revalidate, max-age=0`.
    pub fn never_cache() -> Self {
        Self {
            overrides: DirectiveOverrides::new()
                .max_age(0)
                .no_cache(true)
                .no_store(true)
                .must_revalidate(true),
        }
    }

    /// The overrides this policy applies.
    pub fn overrides(&self) -> &DirectiveOverrides {
        &self.overrides
    }

    /// Merge the overrides into the response's Cache-Control header.
    pub fn apply(&self, response: &mut Response) {
        let merged = response.cache_control().merge_validated(&self.overrides);
        response.set_cache_control(&merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, cache_control: &str) -> Response {
        let resp = Response::new(status).with_body("body");
        if cache_control.is_empty() {
            resp
        } else {
            resp.with_header("Cache-Control", cache_control)
        }
    }

    // === RequestPolicy ===

    #[test]
    fn test_lookup_only_for_safe_methods() {
        let policy = RequestPolicy::new();
        let none = DirectiveSet::new();

        assert!(policy.is_lookup_eligible(&Method::GET, &none));
        assert!(policy.is_lookup_eligible(&Method::HEAD, &none));
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::PATCH, Method::OPTIONS] {
            assert!(!policy.is_lookup_eligible(&method, &none), "{method}");
        }
    }

    #[test]
    fn test_lookup_skipped_for_no_cache_request() {
        let policy = RequestPolicy::new();
        let directives = DirectiveSet::parse("no-cache");

        assert!(!policy.is_lookup_eligible(&Method::GET, &directives));
    }

    #[test]
    fn test_lookup_allowed_with_other_request_directives() {
        let policy = RequestPolicy::new();
        let directives = DirectiveSet::parse("max-age=0");

        assert!(policy.is_lookup_eligible(&Method::GET, &directives));
    }

    // === ResponsePolicy: storability ===

    #[test]
    fn test_storable_status_allow_list() {
        let policy = ResponsePolicy::new();
        let req = Request::get("/");

        for status in DEFAULT_STORABLE_STATUSES {
            assert!(policy.is_storable(&req, &response(status, "")), "{status}");
        }
        for status in [201, 204, 304, 400, 403, 500, 503] {
            assert_eq!(
                policy.check_storable(&req, &response(status, "")),
                Err(NotStorable::StatusCode),
                "{status}"
            );
        }
    }

    #[test]
    fn test_not_storable_for_unsafe_method() {
        let policy = ResponsePolicy::new();
        let req = Request::new(Method::POST, "/");

        assert_eq!(
            policy.check_storable(&req, &response(200, "")),
            Err(NotStorable::Method)
        );
    }

    #[test]
    fn test_no_store_response_not_storable() {
        let policy = ResponsePolicy::new();
        let req = Request::get("/");

        assert_eq!(
            policy.check_storable(&req, &response(200, "no-store")),
            Err(NotStorable::NoStore)
        );
    }

    #[test]
    fn test_no_store_request_not_storable() {
        let policy = ResponsePolicy::new();
        let req = Request::get("/").with_header("Cache-Control", "no-store");

        assert!(!policy.is_storable(&req, &response(200, "")));
    }

    #[test]
    fn test_private_only_rejected_for_shared_store() {
        let req = Request::get("/");
        let resp = response(200, "private, max-age=60");

        assert_eq!(
            ResponsePolicy::new().check_storable(&req, &resp),
            Err(NotStorable::Private)
        );
        assert!(ResponsePolicy::new().with_shared(false).is_storable(&req, &resp));
    }

    #[test]
    fn test_set_cookie_without_request_cookie() {
        let policy = ResponsePolicy::new();
        let resp = response(200, "").with_header("Set-Cookie", "sid=abc");

        assert_eq!(
            policy.check_storable(&Request::get("/"), &resp),
            Err(NotStorable::CookiesForCookielessRequest)
        );
        let with_cookie = Request::get("/").with_header("Cookie", "sid=abc");
        assert!(policy.is_storable(&with_cookie, &resp));
    }

    #[test]
    fn test_vary_star_never_storable() {
        let policy = ResponsePolicy::new();
        let resp = response(200, "").with_header("Vary", "Accept, *");

        assert_eq!(
            policy.check_storable(&Request::get("/"), &resp),
            Err(NotStorable::VaryStar)
        );
    }

    #[test]
    fn test_custom_status_list() {
        let policy = ResponsePolicy::new().with_storable_statuses(vec![200]);
        assert!(!policy.is_storable(&Request::get("/"), &response(404, "")));
    }

    // === ResponsePolicy: TTL ===

    #[test]
    fn test_effective_ttl_default_is_ceiling() {
        let policy = ResponsePolicy::new();

        assert_eq!(
            policy.effective_ttl(&response(200, "max-age=3600"), Ttl::Seconds(120)),
            Some(Ttl::Seconds(120))
        );
        assert_eq!(
            policy.effective_ttl(&response(200, "max-age=30"), Ttl::Seconds(120)),
            Some(Ttl::Seconds(30))
        );
    }

    #[test]
    fn test_effective_ttl_without_max_age_uses_default() {
        let policy = ResponsePolicy::new();

        assert_eq!(
            policy.effective_ttl(&response(200, ""), Ttl::Seconds(120)),
            Some(Ttl::Seconds(120))
        );
        assert_eq!(
            policy.effective_ttl(&response(200, ""), Ttl::Forever),
            Some(Ttl::Forever)
        );
    }

    #[test]
    fn test_effective_ttl_forever_default_uses_max_age() {
        let policy = ResponsePolicy::new();
        assert_eq!(
            policy.effective_ttl(&response(200, "max-age=3600"), Ttl::Forever),
            Some(Ttl::Seconds(3600))
        );
    }

    #[test]
    fn test_effective_ttl_prefers_s_maxage_when_shared() {
        let resp = response(200, "max-age=600, s-maxage=60");

        assert_eq!(
            ResponsePolicy::new().effective_ttl(&resp, Ttl::Forever),
            Some(Ttl::Seconds(60))
        );
        assert_eq!(
            ResponsePolicy::new().with_shared(false).effective_ttl(&resp, Ttl::Forever),
            Some(Ttl::Seconds(600))
        );
    }

    #[test]
    fn test_effective_ttl_zero_means_no_caching() {
        let policy = ResponsePolicy::new();

        assert_eq!(policy.effective_ttl(&response(200, ""), Ttl::Seconds(0)), None);
        assert_eq!(
            policy.effective_ttl(&response(200, "max-age=0"), Ttl::Seconds(120)),
            None
        );
    }

    #[test]
    fn test_effective_ttl_no_cache_or_no_store() {
        let policy = ResponsePolicy::new();

        assert_eq!(policy.effective_ttl(&response(200, "no-cache"), Ttl::Forever), None);
        assert_eq!(
            policy.effective_ttl(&response(200, "no-store, max-age=60"), Ttl::Forever),
            None
        );
    }

    #[test]
    fn test_evaluate_zero_ttl_on_200() {
        let policy = ResponsePolicy::new();
        assert_eq!(
            policy.evaluate(&Request::get("/"), &response(200, ""), Ttl::Seconds(0)),
            Err(NotStorable::ZeroTtl)
        );
    }

    #[test]
    fn test_evaluate_success() {
        let policy = ResponsePolicy::new();
        assert_eq!(
            policy.evaluate(&Request::get("/"), &response(200, "max-age=10"), Ttl::Seconds(120)),
            Ok(Ttl::Seconds(10))
        );
    }

    // === Never cache ===

    #[test]
    fn test_never_cache_policy_never_stores() {
        let policy = ResponsePolicy::never_cache();
        let resp = response(200, "public, max-age=3600");

        assert!(policy.is_never_cache());
        assert!(!policy.is_storable(&Request::get("/"), &resp));
        assert_eq!(policy.effective_ttl(&resp, Ttl::Forever), None);
    }

    #[test]
    fn test_never_cache_directives() {
        let mut resp = response(200, "public, max-age=3600");
        CacheControlPolicy::never_cache().apply(&mut resp);

        assert_eq!(
            resp.header("Cache-Control"),
            Some("public, max-age=0, no-cache, no-store, must-revalidate")
        );
    }

    // === CacheControlPolicy ===

    #[test]
    fn test_cache_control_policy_rejects_conflict() {
        let result = CacheControlPolicy::new(DirectiveOverrides::new().public(true).private(true));
        assert_eq!(result, Err(PolicyViolation::ConflictingScope));
    }

    #[test]
    fn test_cache_control_policy_patches_header() {
        let policy = CacheControlPolicy::new(DirectiveOverrides::new().max_age(30).public(true)).unwrap();
        let mut resp = response(200, "no-transform, max-age=60");
        policy.apply(&mut resp);

        assert_eq!(resp.header("Cache-Control"), Some("no-transform, max-age=30, public"));
    }

    #[test]
    fn test_cache_control_policy_removes_empty_header() {
        let policy = CacheControlPolicy::new(DirectiveOverrides::new().must_revalidate(false)).unwrap();
        let mut resp = response(200, "must-revalidate");
        policy.apply(&mut resp);

        assert!(!resp.has_header("Cache-Control"));
    }

    // === Ttl ===

    #[test]
    fn test_ttl_helpers() {
        assert_eq!(Ttl::from_secs(None), Ttl::Forever);
        assert_eq!(Ttl::from_secs(Some(5)).as_duration(), Some(Duration::from_secs(5)));
        assert_eq!(Ttl::Forever.as_duration(), None);
        assert_eq!(Ttl::Forever.max_age_secs(), ONE_YEAR_SECS);
        assert_eq!(Ttl::Seconds(3).to_string(), "3s");
    }
}
