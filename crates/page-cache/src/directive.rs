//! Cache-Control directive parsing, merging and serialization.

use std::fmt;

use crate::error::PolicyViolation;

/// Directive names with defined semantics.
pub mod directive_names {
    pub const NO_CACHE: &str = "no-cache";
    pub const NO_STORE: &str = "no-store";
    pub const NO_TRANSFORM: &str = "no-transform";
    pub const MUST_REVALIDATE: &str = "must-revalidate";
    pub const PROXY_REVALIDATE: &str = "proxy-revalidate";
    pub const MUST_UNDERSTAND: &str = "must-understand";
    pub const PUBLIC: &str = "public";
    pub const PRIVATE: &str = "private";
    pub const MAX_AGE: &str = "max-age";
    pub const S_MAXAGE: &str = "s-maxage";
    pub const STALE_WHILE_REVALIDATE: &str = "stale-while-revalidate";
    pub const STALE_IF_ERROR: &str = "stale-if-error";
}

use directive_names::*;

const VALUED: [&str; 4] = [MAX_AGE, S_MAXAGE, STALE_WHILE_REVALIDATE, STALE_IF_ERROR];

const FLAGS: [&str; 8] = [
    NO_CACHE,
    NO_STORE,
    NO_TRANSFORM,
    MUST_REVALIDATE,
    PROXY_REVALIDATE,
    MUST_UNDERSTAND,
    PUBLIC,
    PRIVATE,
];

/// Whether a directive name carries delta-seconds.
pub fn is_valued(name: &str) -> bool {
    VALUED.iter().any(|v| v.eq_ignore_ascii_case(name))
}

fn is_known_flag(name: &str) -> bool {
    FLAGS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// Value carried by a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveValue {
    /// Bare token, e.g. `no-store`.
    Flag,
    /// Delta-seconds, e.g. `max-age=60`.
    Seconds(u64),
    /// Argument of an unrecognized (or field-name) directive, kept verbatim.
    Token(String),
}

/// A single Cache-Control directive with a lower-case name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: String,
    value: DirectiveValue,
}

impl Directive {
    /// Create a flag directive.
    pub fn flag(name: &str) -> Self {
        Self {
            name: canonical_name(name),
            value: DirectiveValue::Flag,
        }
    }

    /// Create a delta-seconds directive.
    pub fn seconds(name: &str, secs: u64) -> Self {
        Self {
            name: canonical_name(name),
            value: DirectiveValue::Seconds(secs),
        }
    }

    /// The canonical (lower-case) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The directive's value.
    pub fn value(&self) -> &DirectiveValue {
        &self.value
    }

    /// The delta-seconds value, if this is a valued directive.
    pub fn seconds_value(&self) -> Option<u64> {
        match self.value {
            DirectiveValue::Seconds(secs) => Some(secs),
            _ => None,
        }
    }

    fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }

        let Some((name, raw)) = token.split_once('=') else {
            let name = token.to_ascii_lowercase();
            if is_valued(&name) {
                tracing::trace!(directive = %name, "ignoring valued directive without a value");
                return None;
            }
            return Some(Self {
                name,
                value: DirectiveValue::Flag,
            });
        };

        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        let raw = raw.trim();

        if is_valued(&name) {
            match parse_delta_seconds(unquote(raw)) {
                Some(secs) => Some(Self {
                    name,
                    value: DirectiveValue::Seconds(secs),
                }),
                None => {
                    tracing::trace!(directive = %name, value = raw, "ignoring malformed directive");
                    None
                }
            }
        } else {
            Some(Self {
                name,
                value: DirectiveValue::Token(raw.to_string()),
            })
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            DirectiveValue::Flag => write!(f, "{}", self.name),
            DirectiveValue::Seconds(secs) => write!(f, "{}={}", self.name, secs),
            DirectiveValue::Token(raw) => write!(f, "{}={}", self.name, raw),
        }
    }
}

// Lower-case, and accept `must_revalidate` for `must-revalidate`. Other
// names keep their underscores, as the header parser does.
fn canonical_name(name: &str) -> String {
    let name = name.trim().to_ascii_lowercase();
    let hyphenated = name.replace('_', "-");
    if is_valued(&hyphenated) || is_known_flag(&hyphenated) {
        hyphenated
    } else {
        name
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw)
}

// Digits only; values too large for u64 saturate.
fn parse_delta_seconds(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(raw.parse().unwrap_or(u64::MAX))
}

/// Split a comma-separated header list, keeping commas inside quoted strings.
fn split_list(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

/// A set of Cache-Control directives with unique names.
///
/// Insertion order is preserved so serialization is deterministic. `public`
/// and `private` never coexist: inserting one removes the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveSet {
    directives: Vec<Directive>,
}

impl DirectiveSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a Cache-Control header value.
    ///
    /// Unknown tokens pass through unchanged. Malformed valued directives
    /// (`max-age=soon`, `max-age=-1`) are dropped. When a valued directive
    /// repeats the smallest value is kept, and `private` wins over `public`.
    pub fn parse(value: &str) -> Self {
        let mut set = Self::new();
        for token in split_list(value) {
            if let Some(directive) = Directive::parse(token) {
                set.absorb(directive);
            }
        }
        set
    }

    fn absorb(&mut self, directive: Directive) {
        if directive.name == PUBLIC && self.contains(PRIVATE) {
            return;
        }

        if let (Some(i), Some(new)) = (self.position(&directive.name), directive.seconds_value()) {
            if let Some(old) = self.directives[i].seconds_value() {
                self.directives[i].value = DirectiveValue::Seconds(old.min(new));
                return;
            }
        }

        self.insert(directive);
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.directives
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Insert or replace a directive, keeping its original position if present.
    pub fn insert(&mut self, directive: Directive) {
        match directive.name.as_str() {
            PUBLIC => {
                self.remove(PRIVATE);
            }
            PRIVATE => {
                self.remove(PUBLIC);
            }
            _ => {}
        }

        match self.position(&directive.name) {
            Some(i) => self.directives[i] = directive,
            None => self.directives.push(directive),
        }
    }

    /// Remove a directive by name.
    pub fn remove(&mut self, name: &str) -> Option<Directive> {
        self.position(name).map(|i| self.directives.remove(i))
    }

    /// Get a directive by name.
    pub fn get(&self, name: &str) -> Option<&Directive> {
        self.position(name).map(|i| &self.directives[i])
    }

    /// Whether a directive with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Whether a non-valued directive with this name is present.
    ///
    /// Field-name forms such as `private="Set-Cookie"` count as set.
    pub fn has_flag(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|d| !matches!(d.value, DirectiveValue::Seconds(_)))
    }

    /// Delta-seconds value of a valued directive.
    pub fn value_of(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Directive::seconds_value)
    }

    /// Iterate directives in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }

    /// Number of directives.
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Merge overrides into a copy of this set.
    ///
    /// A valued override of a directive already present takes the minimum of
    /// both values, so an override can tighten but never widen a lifetime.
    /// `false` removes a directive, `true` adds or replaces it.
    pub fn merge(&self, overrides: &DirectiveOverrides) -> Result<Self, PolicyViolation> {
        overrides.validate()?;
        Ok(self.merge_validated(overrides))
    }

    pub(crate) fn merge_validated(&self, overrides: &DirectiveOverrides) -> Self {
        let mut merged = self.clone();

        for (name, value) in &overrides.entries {
            match value {
                Override::Flag(false) => {
                    merged.remove(name);
                }
                Override::Flag(true) => merged.insert(Directive::flag(name)),
                Override::Seconds(secs) => {
                    let effective = merged
                        .value_of(name)
                        .map_or(*secs, |current| current.min(*secs));
                    merged.insert(Directive::seconds(name, effective));
                }
            }
        }

        merged
    }

    /// Canonical header value: `", "`-joined, flags bare, valued as `name=value`.
    pub fn serialize(&self) -> String {
        self.directives
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for DirectiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// A requested change to one directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    /// Add (`true`) or remove (`false`) the directive.
    Flag(bool),
    /// Set a delta-seconds value, capped by any value already present.
    Seconds(u64),
}

/// Directive changes to merge into a response's Cache-Control.
///
/// Names are canonicalized, so `must_revalidate` and `Must-Revalidate` are
/// the same directive. Setting a name twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveOverrides {
    entries: Vec<(String, Override)>,
}

impl DirectiveOverrides {
    /// Create an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    fn set(mut self, name: &str, value: Override) -> Self {
        let name = canonical_name(name);
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    /// Add or remove a flag directive.
    pub fn flag(self, name: &str, enabled: bool) -> Self {
        self.set(name, Override::Flag(enabled))
    }

    /// Set a delta-seconds directive.
    pub fn seconds(self, name: &str, secs: u64) -> Self {
        self.set(name, Override::Seconds(secs))
    }

    pub fn max_age(self, secs: u64) -> Self {
        self.seconds(MAX_AGE, secs)
    }

    pub fn s_maxage(self, secs: u64) -> Self {
        self.seconds(S_MAXAGE, secs)
    }

    pub fn stale_while_revalidate(self, secs: u64) -> Self {
        self.seconds(STALE_WHILE_REVALIDATE, secs)
    }

    pub fn stale_if_error(self, secs: u64) -> Self {
        self.seconds(STALE_IF_ERROR, secs)
    }

    pub fn public(self, enabled: bool) -> Self {
        self.flag(PUBLIC, enabled)
    }

    pub fn private(self, enabled: bool) -> Self {
        self.flag(PRIVATE, enabled)
    }

    pub fn no_cache(self, enabled: bool) -> Self {
        self.flag(NO_CACHE, enabled)
    }

    pub fn no_store(self, enabled: bool) -> Self {
        self.flag(NO_STORE, enabled)
    }

    pub fn no_transform(self, enabled: bool) -> Self {
        self.flag(NO_TRANSFORM, enabled)
    }

    pub fn must_revalidate(self, enabled: bool) -> Self {
        self.flag(MUST_REVALIDATE, enabled)
    }

    pub fn proxy_revalidate(self, enabled: bool) -> Self {
        self.flag(PROXY_REVALIDATE, enabled)
    }

    pub fn must_understand(self, enabled: bool) -> Self {
        self.flag(MUST_UNDERSTAND, enabled)
    }

    /// Iterate overrides in the order they were first set.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Override)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    /// Whether no overrides are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn enables(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, v)| n == name && *v == Override::Flag(true))
    }

    /// Check the overrides can be applied.
    pub fn validate(&self) -> Result<(), PolicyViolation> {
        for (name, value) in &self.entries {
            match value {
                Override::Flag(_) if is_valued(name) => {
                    return Err(PolicyViolation::ExpectedSeconds(name.clone()));
                }
                Override::Seconds(_) if is_known_flag(name) => {
                    return Err(PolicyViolation::UnexpectedValue(name.clone()));
                }
                _ => {}
            }
        }

        if self.enables(PUBLIC) && self.enables(PRIVATE) {
            return Err(PolicyViolation::ConflictingScope);
        }

        Ok(())
    }
}
