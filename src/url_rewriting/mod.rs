//! URL canonicalization and entry path computation.
//!
//! Entries are addressed inside the bundle by their decoded full path: the
//! host (punycode-decoded) followed by the percent-decoded path and, when
//! present, the decoded query joined by `?`. The scheme, port, userinfo and
//! fragment are dropped; whatever scheme the bundle is served under at replay
//! time applies to every entry.
//!
//! Two representations exist and must not be confused:
//! - [`ZimPath`] is the *decoded* canonical form used as an entry's address
//!   (`"foo.com/part with space/bar?key=value"` is valid, its percent-encoded
//!   spelling is not);
//! - emitted links are the *encoded* form: every octet outside the RFC 3986
//!   unreserved set is percent-encoded, `/` is kept between path segments,
//!   and the `?` joining path and query is itself encoded so intermediaries
//!   do not strip the query.
//!
//! On top of the plain normalization, canonical paths are reduced by the
//! fuzzy rules in [`fuzzy`] so equivalent URLs collapse onto one entry.

mod article;
pub mod fuzzy;

pub use article::{encode_canonical_path, ArticleUrlRewriter};
pub use fuzzy::FuzzyRules;

use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::errors::RewriteError;

/// A validated absolute http/https URL with a host.
///
/// This is the only input type [`normalize`] accepts: constructing one is the
/// point where `InvalidUrl` is raised, so downstream code never re-checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpUrl(Url);

impl HttpUrl {
    pub fn parse(input: &str) -> Result<Self, RewriteError> {
        let url = Url::parse(input.trim())
            .map_err(|_| RewriteError::InvalidUrl(input.to_string()))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, RewriteError> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(RewriteError::InvalidUrl(url.to_string()));
        }
        Ok(Self(url))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Resolve a (possibly relative) reference against this URL.
    pub fn join(&self, reference: &str) -> Result<Url, url::ParseError> {
        self.0.join(reference)
    }
}

impl fmt::Display for HttpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The canonical, decoded, fuzzy-reduced address of one bundle entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZimPath(String);

impl ZimPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Normalize an absolute URL into the canonical path used as an entry's key.
///
/// Steps, in order: drop scheme/port/userinfo/fragment, punycode-decode and
/// lowercase the host, percent-decode the path once (an empty path becomes
/// `/`), decode the query once with `+` converted to space, collapse runs of
/// `/` in the combined decoded string, then apply the fuzzy rules.
///
/// The function is pure and idempotent: re-normalizing a canonical path
/// prefixed with a dummy scheme yields the same canonical path.
pub fn normalize(url: &HttpUrl, rules: &FuzzyRules) -> ZimPath {
    let parsed = url.as_url();

    // Invariant of HttpUrl: host is present.
    let raw_host = parsed.host_str().unwrap_or_default();
    let host = decode_host(raw_host);

    // The url crate guarantees a non-empty, '/'-prefixed path for http(s).
    let path = percent_decode_str(parsed.path()).decode_utf8_lossy();

    let mut combined = String::with_capacity(host.len() + path.len());
    combined.push_str(&host);
    combined.push_str(&path);

    if let Some(query) = parsed.query() {
        // In the wire form `+` means space; a literal plus arrives as %2B,
        // so the substitution must happen before percent-decoding.
        let query = query.replace('+', " ");
        let query = percent_decode_str(&query).decode_utf8_lossy().into_owned();
        combined.push('?');
        combined.push_str(&query);
    }

    let collapsed = collapse_slashes(&combined);
    ZimPath::new(rules.reduce(&collapsed).into_owned())
}

/// Punycode-decode an IDNA host to its Unicode form, lowercased.
///
/// IP literals (including bracketed IPv6) are kept verbatim.
fn decode_host(host: &str) -> String {
    if host.starts_with('[') || host.parse::<std::net::Ipv4Addr>().is_ok() {
        return host.to_string();
    }
    let (unicode, result) = idna::domain_to_unicode(host);
    if result.is_err() {
        // Malformed punycode: keep the ASCII spelling rather than guessing.
        return host.to_ascii_lowercase();
    }
    unicode.to_lowercase()
}

/// Collapse every run of consecutive `/` into a single one.
fn collapse_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut previous_slash = false;
    for c in input.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}
