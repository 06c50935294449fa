//! Per-document reference rewriting.
//!
//! An [`ArticleUrlRewriter`] is created for each payload being written. Given
//! a reference found in the document (an attribute value, a CSS `url(...)`, a
//! JS string literal), it resolves it against the document URL, canonicalizes
//! the result and emits a purely relative link that resolves inside the
//! bundle wherever the bundle is served from.

use std::collections::HashSet;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use super::{normalize, FuzzyRules, HttpUrl, ZimPath};
use crate::errors::RewriteError;

/// Everything outside the RFC 3986 unreserved set gets percent-encoded in
/// the query part, the `?` joining path and query and the `=` inside it
/// included.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Path segments additionally keep `:` literal; a leading `./` guards the
/// one position where a colon segment would read as a scheme. `/` is handled
/// by encoding segments individually.
const PATH_SEGMENT_ENCODE: &AsciiSet = &QUERY_ENCODE.remove(b':');

/// Rewrites references of one document into bundle-relative links.
pub struct ArticleUrlRewriter<'a> {
    article_url: HttpUrl,
    article_path: ZimPath,
    known_paths: Option<&'a HashSet<ZimPath>>,
    rules: &'a FuzzyRules,
}

impl<'a> ArticleUrlRewriter<'a> {
    pub fn new(
        article_url: HttpUrl,
        known_paths: Option<&'a HashSet<ZimPath>>,
        rules: &'a FuzzyRules,
    ) -> Self {
        let article_path = normalize(&article_url, rules);
        Self {
            article_url,
            article_path,
            known_paths,
            rules,
        }
    }

    pub fn article_url(&self) -> &HttpUrl {
        &self.article_url
    }

    pub fn article_path(&self) -> &ZimPath {
        &self.article_path
    }

    /// Rewrite one reference, resolving it against the document URL (or the
    /// effective `<base href>` when one is in force).
    ///
    /// Non-navigational references (`#…`, `{`/`*` templating sigils, `data:`,
    /// `javascript:` and every other non-http scheme) and references that
    /// already look rewritten pass through verbatim. A reference that fails
    /// to resolve or canonicalize is logged and also passes through.
    pub fn rewrite(&self, reference: &str, base: Option<&Url>) -> String {
        match self.try_rewrite(reference, base) {
            Some(rewritten) => rewritten,
            None => reference.to_string(),
        }
    }

    fn try_rewrite(&self, reference: &str, base: Option<&Url>) -> Option<String> {
        let trimmed = reference.trim();
        if trimmed.is_empty() || matches!(trimmed.as_bytes()[0], b'#' | b'{' | b'*') {
            return None;
        }
        if let Some(scheme) = scheme_of(trimmed) {
            if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
                return None;
            }
        }
        if self.looks_already_rewritten(trimmed) {
            return None;
        }

        let base = base.unwrap_or_else(|| self.article_url.as_url());
        let resolved = match base.join(trimmed) {
            Ok(url) => url,
            Err(err) => {
                log::warn!("leaving unresolvable reference {trimmed:?} as-is: {err}");
                return None;
            }
        };
        let target_url = match HttpUrl::from_url(resolved) {
            Ok(url) => url,
            Err(_) => return None,
        };
        let target = normalize(&target_url, self.rules);

        if let Some(known) = self.known_paths {
            if !known.contains(&target) {
                // Still rewritten: the bundle may resolve it through an alias
                // or a fuzzy-equivalent entry at replay time.
                log::debug!("reference {trimmed:?} points outside the bundle ({target})");
            }
        }

        Some(self.link_to_path(&target))
    }

    /// Canonical path a reference resolves to, without producing a link.
    ///
    /// Used for bookkeeping, e.g. recording the target of a module script.
    pub fn item_path(&self, reference: &str, base: Option<&Url>) -> Result<ZimPath, RewriteError> {
        let base = base.unwrap_or_else(|| self.article_url.as_url());
        let resolved = base
            .join(reference.trim())
            .map_err(|_| RewriteError::InvalidUrl(reference.to_string()))?;
        Ok(normalize(&HttpUrl::from_url(resolved)?, self.rules))
    }

    /// Relative, percent-encoded link from this document to a canonical path.
    ///
    /// The link consists of the `../` sequence needed to climb out of the
    /// document's directory followed by the non-shared tail of the target.
    /// When the result would start with a segment containing `:`, a `./`
    /// prefix is added so browsers do not read the segment as a scheme.
    pub fn link_to_path(&self, target: &ZimPath) -> String {
        let (doc_path, _) = split_query(self.article_path.value());
        let (target_path, target_query) = split_query(target.value());

        let doc_segments: Vec<&str> = doc_path.split('/').collect();
        let doc_dirs = &doc_segments[..doc_segments.len().saturating_sub(1)];
        let target_segments: Vec<&str> = target_path.split('/').collect();

        // Shared directory prefix; the target's last segment is its filename
        // and never counts as a directory.
        let max_common = doc_dirs
            .len()
            .min(target_segments.len().saturating_sub(1));
        let mut common = 0;
        while common < max_common && doc_dirs[common] == target_segments[common] {
            common += 1;
        }

        let ups = doc_dirs.len() - common;
        let mut link = "../".repeat(ups);
        let tail: Vec<String> = target_segments[common..]
            .iter()
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT_ENCODE).to_string())
            .collect();
        link.push_str(&tail.join("/"));

        if let Some(query) = target_query {
            let joined = format!("?{query}");
            link.push_str(&utf8_percent_encode(&joined, QUERY_ENCODE).to_string());
        }

        if link.is_empty() {
            return "./".to_string();
        }
        if ups == 0 {
            if let Some(first) = tail.first() {
                if first.contains(':') {
                    return format!("./{link}");
                }
            }
        }
        link
    }

    /// Heuristic for links the offline pass already rewrote.
    ///
    /// All three must hold: the reference climbs with `../`; its first
    /// non-`..` segment looks like a hostname (contains a dot); and the climb
    /// is exactly one level more than the original document URL's directory
    /// depth, i.e. it climbs past the host. Any single condition missing
    /// means the reference is rewritten normally.
    fn looks_already_rewritten(&self, reference: &str) -> bool {
        if !reference.starts_with("../") {
            return false;
        }
        let mut ups = 0;
        let mut first_segment = None;
        for segment in reference.split('/') {
            if segment == ".." {
                ups += 1;
            } else {
                first_segment = Some(segment);
                break;
            }
        }
        let Some(first_segment) = first_segment else {
            return false;
        };
        if !first_segment.contains('.') {
            return false;
        }

        let path = self.article_url.as_url().path();
        let dirs = path.rsplit_once('/').map(|(dirs, _)| dirs).unwrap_or("");
        let depth = dirs.split('/').filter(|s| !s.is_empty()).count();
        ups == depth + 1
    }
}

/// Percent-encode a canonical path for emission, keeping `/` between path
/// segments and encoding everything else outside the unreserved set (the
/// `?` joining path and query included).
pub fn encode_canonical_path(path: &ZimPath) -> String {
    let (path_part, query) = split_query(path.value());
    let mut out = path_part
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT_ENCODE).to_string())
        .collect::<Vec<_>>()
        .join("/");
    if let Some(query) = query {
        let joined = format!("?{query}");
        out.push_str(&utf8_percent_encode(&joined, QUERY_ENCODE).to_string());
    }
    out
}

fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    }
}

/// Extract the scheme of a reference, when it syntactically has one.
fn scheme_of(reference: &str) -> Option<&str> {
    let colon = reference.find(':')?;
    let candidate = &reference[..colon];
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    // "//host/x:y" never reaches here: the '/' fails the character check.
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter_for<'a>(url: &str, rules: &'a FuzzyRules) -> ArticleUrlRewriter<'a> {
        // Tests never consult the known-path set.
        ArticleUrlRewriter::new(HttpUrl::parse(url).unwrap(), None, rules)
    }

    #[test]
    fn scheme_detection() {
        assert_eq!(scheme_of("https://a/b"), Some("https"));
        assert_eq!(scheme_of("mailto:x@y"), Some("mailto"));
        assert_eq!(scheme_of("File:picture.svg"), Some("File"));
        assert_eq!(scheme_of("//host/path"), None);
        assert_eq!(scheme_of("a/b:c"), None);
        assert_eq!(scheme_of("foo"), None);
    }

    #[test]
    fn relative_link_between_sibling_paths() {
        let rules = FuzzyRules::empty();
        let rw = rewriter_for("https://www.example.com/path1/resource1.html", &rules);
        let link = rw.rewrite("https://www.example.com/javascript/content.txt", None);
        assert_eq!(link, "../javascript/content.txt");
    }

    #[test]
    fn scheme_relative_reference() {
        let rules = FuzzyRules::empty();
        let rw = rewriter_for("https://www.example.com/path1/resource1.html", &rules);
        let link = rw.rewrite("//www.example.com/javascript/content.txt", None);
        assert_eq!(link, "../javascript/content.txt");
    }

    #[test]
    fn query_is_encoded_on_emit() {
        let rules = FuzzyRules::empty();
        let rw = rewriter_for("https://www.example.com/path1/resource1.html", &rules);
        let link = rw.rewrite(
            "https://www.example.com/javascript/content.txt?query=value",
            None,
        );
        assert_eq!(link, "../javascript/content.txt%3Fquery%3Dvalue");
    }

    #[test]
    fn sibling_with_colon_gets_dot_slash() {
        let rules = FuzzyRules::empty();
        let rw = rewriter_for("https://en.wikipedia.org/wiki/Kiwix", &rules);
        let link = rw.rewrite("https://en.wikipedia.org/wiki/File:Kiwix_logo_v3.svg", None);
        assert_eq!(link, "./File:Kiwix_logo_v3.svg");
    }

    #[test]
    fn anchors_and_opaque_schemes_pass_through() {
        let rules = FuzzyRules::empty();
        let rw = rewriter_for("https://example.com/a/b.html", &rules);
        for reference in [
            "#anchor",
            "{{template}}",
            "*wildcard",
            "data:text/plain,x",
            "blob:https://example.com/x",
            "mailto:me@example.com",
            "javascript:void(0)",
            "tel:+123",
            "about:blank",
        ] {
            assert_eq!(rw.rewrite(reference, None), reference);
        }
    }

    #[test]
    fn cross_host_prerewritten_link_is_stable() {
        let rules = FuzzyRules::empty();
        let rw = rewriter_for("https://www.example.com/path1/resource1.html", &rules);
        // Climbs one level past the host of a one-directory-deep document.
        let reference = "../../anotherhost.com/javascript/content.txt";
        assert_eq!(rw.rewrite(reference, None), reference);
        // Same shape but the first segment is not hostname-like: rewritten.
        assert_ne!(rw.rewrite("../../javascript/content.txt", None), "../../javascript/content.txt");
    }

    #[test]
    fn relative_references_stay_minimal() {
        let rules = FuzzyRules::empty();
        for doc in [
            "https://kiwix.org/a/article/path",
            "https://kiwix.org/a/article/path/",
        ] {
            let rw = rewriter_for(doc, &rules);
            for reference in ["foo", "bar/foo", "foo/", "bar/foo/", "../baz"] {
                assert_eq!(rw.rewrite(reference, None), reference);
                assert_eq!(rw.rewrite(&format!("./{reference}"), None), reference);
            }
        }
        // Climbing to the host root from a one-level-deep document clamps.
        let rw = rewriter_for("https://kiwix.org/a/path", &rules);
        assert_eq!(rw.rewrite("../../biz", None), "../biz");
    }

    #[test]
    fn self_reference_resolves_to_dot_slash() {
        let rules = FuzzyRules::empty();
        let rw = rewriter_for("https://example.com/dir/", &rules);
        assert_eq!(rw.rewrite("https://example.com/dir/", None), "./");
    }

    #[test]
    fn encode_canonical_path_preserves_unreserved() {
        let path = ZimPath::new("example.com/a-b_c.d~e/f g?h=i j");
        assert_eq!(
            encode_canonical_path(&path),
            "example.com/a-b_c.d~e/f%20g%3Fh%3Di%20j"
        );
    }
}
