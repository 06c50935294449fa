//! Payload rewriting, driven by media class.
//!
//! The class of a record is inferred from a combined signal: the record-type
//! hint is authoritative when present (`document`, `stylesheet`, `script`,
//! `xhr`, `fetch`), with the declared media type as fallback. HTML, CSS and
//! JS payloads are rewritten; JSONP wrappers are unwrapped; JSON payloads
//! get the domain-specific rules only; everything else passes through
//! opaque. A script record whose canonical path was discovered as a module
//! (from `<script type="module">` or a transitive import, in record order)
//! is rewritten with module semantics.

pub mod css;
pub mod ds;
pub mod html;
pub mod js;
pub mod rx_replacer;

pub use html::{HtmlRewriter, RewrittenHtml};
pub use rx_replacer::RewriteOpts;

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::url_rewriting::{normalize, ArticleUrlRewriter, FuzzyRules, HttpUrl, ZimPath};

const JS_MIME_TYPES: &[&str] = &[
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
];

/// JSONP payload shape: optional leading comments, then `name(` opening an
/// object or array literal.
static JSONP_WRAPPER_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\s*(?:(?:/\*[^*]*\*/)|(?://[^\n]*\n)))*\s*([$\w.]+)\([\[{]")
        .expect("JSONP_WRAPPER_RX: hardcoded regex is valid")
});

static JSONP_CALLBACK_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[?].*?(?:callback|jsonp)=([^&]+)")
        .expect("JSONP_CALLBACK_RX: hardcoded regex is valid")
});

/// Media class of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    Html,
    Css,
    JsClassic,
    JsModule,
    Jsonp,
    Json,
}

/// The callback name a JSONP request asked for, from its query string.
pub fn extract_jsonp_callback(url: &str) -> Option<String> {
    let caps = JSONP_CALLBACK_RX.captures(url)?;
    let callback = &caps[1];
    if callback == "?" {
        return None;
    }
    Some(callback.to_string())
}

fn normalized_mime(media_type: Option<&str>) -> Option<String> {
    Some(
        media_type?
            .split(';')
            .next()?
            .trim()
            .to_ascii_lowercase(),
    )
}

fn mode_from_mime(mime: Option<&str>, url: &str, path: &ZimPath) -> Option<RewriteMode> {
    match mime? {
        "text/html" | "application/xhtml" | "application/xhtml+xml" => Some(RewriteMode::Html),
        "text/css" => Some(RewriteMode::Css),
        "application/json" => Some(RewriteMode::Json),
        mime if JS_MIME_TYPES.contains(&mime) => {
            if extract_jsonp_callback(url).is_some() {
                Some(RewriteMode::Jsonp)
            } else if path.value().ends_with(".json") {
                Some(RewriteMode::Json)
            } else {
                Some(RewriteMode::JsClassic)
            }
        }
        _ => None,
    }
}

fn mode_from_resource_type(
    resource_type: &str,
    mime: Option<&str>,
    url: &str,
    path: &ZimPath,
) -> Option<RewriteMode> {
    match resource_type {
        "document" if mime == Some("text/html") => Some(RewriteMode::Html),
        "stylesheet" => Some(RewriteMode::Css),
        "script" | "fetch" | "xhr"
            if mime == Some("application/json") || path.value().ends_with(".json") =>
        {
            Some(RewriteMode::Json)
        }
        "script" | "xhr" if mime.is_some_and(|m| JS_MIME_TYPES.contains(&m)) => {
            if extract_jsonp_callback(url).is_some() {
                Some(RewriteMode::Jsonp)
            } else {
                Some(RewriteMode::JsClassic)
            }
        }
        _ => None,
    }
}

/// Infer the media class of a record. The record-type hint wins when
/// present; scripts already known as modules are upgraded.
pub fn rewrite_mode(
    resource_type: Option<&str>,
    media_type: Option<&str>,
    url: &str,
    path: &ZimPath,
    js_modules: &HashSet<ZimPath>,
) -> Option<RewriteMode> {
    let mime = normalized_mime(media_type);
    let mut mode = match resource_type.map(str::trim).filter(|rt| !rt.is_empty()) {
        Some(resource_type) => mode_from_resource_type(
            &resource_type.to_ascii_lowercase(),
            mime.as_deref(),
            url,
            path,
        ),
        None => mode_from_mime(mime.as_deref(), url, path),
    };
    if mode == Some(RewriteMode::JsClassic) && js_modules.contains(path) {
        mode = Some(RewriteMode::JsModule);
    }
    mode
}

pub struct RewriteOutcome {
    pub title: String,
    pub content: Vec<u8>,
}

/// One record's rewriting context: document URL, canonical path, media class
/// and the shared module bookkeeping.
pub struct PayloadRewriter<'a> {
    url_rewriter: ArticleUrlRewriter<'a>,
    path: ZimPath,
    mode: Option<RewriteMode>,
    js_modules: &'a RefCell<HashSet<ZimPath>>,
}

impl<'a> PayloadRewriter<'a> {
    pub fn new(
        url: HttpUrl,
        resource_type: Option<&str>,
        media_type: Option<&str>,
        known_paths: &'a HashSet<ZimPath>,
        js_modules: &'a RefCell<HashSet<ZimPath>>,
        rules: &'a FuzzyRules,
    ) -> Self {
        let path = normalize(&url, rules);
        let mode = rewrite_mode(
            resource_type,
            media_type,
            url.as_str(),
            &path,
            &js_modules.borrow(),
        );
        let url_rewriter = ArticleUrlRewriter::new(url, Some(known_paths), rules);
        Self {
            url_rewriter,
            path,
            mode,
            js_modules,
        }
    }

    pub fn mode(&self) -> Option<RewriteMode> {
        self.mode
    }

    pub fn path(&self) -> &ZimPath {
        &self.path
    }

    pub fn url_rewriter(&self) -> &ArticleUrlRewriter<'a> {
        &self.url_rewriter
    }

    /// Rewrite the payload according to its media class. Parse failures fall
    /// back to the original bytes with a warning; opaque payloads pass
    /// through untouched.
    pub fn rewrite(
        &self,
        payload: &[u8],
        pre_head_insert: &str,
        post_head_insert: Option<&str>,
    ) -> RewriteOutcome {
        let Some(mode) = self.mode else {
            return RewriteOutcome {
                title: String::new(),
                content: payload.to_vec(),
            };
        };

        let text = String::from_utf8_lossy(payload);
        match mode {
            RewriteMode::Html => {
                let notify = |path: ZimPath| {
                    self.js_modules.borrow_mut().insert(path);
                };
                let rewriter = HtmlRewriter::new(
                    &self.url_rewriter,
                    pre_head_insert.to_string(),
                    post_head_insert.map(str::to_string),
                    &notify,
                );
                match rewriter.rewrite(&text) {
                    Ok(rewritten) => RewriteOutcome {
                        title: rewritten.title,
                        content: rewritten.content,
                    },
                    Err(_) => RewriteOutcome {
                        title: String::new(),
                        content: payload.to_vec(),
                    },
                }
            }
            RewriteMode::Css => {
                let rewriter = css::CssRewriter::new(&self.url_rewriter);
                RewriteOutcome {
                    title: String::new(),
                    content: rewriter.rewrite(&text, None).into_bytes(),
                }
            }
            RewriteMode::JsClassic | RewriteMode::JsModule => {
                let notify = |path: ZimPath| {
                    self.js_modules.borrow_mut().insert(path);
                };
                let rewriter = js::JsRewriter::new(&self.url_rewriter, Some(&notify));
                let opts = RewriteOpts {
                    is_module: mode == RewriteMode::JsModule,
                    ..Default::default()
                };
                RewriteOutcome {
                    title: String::new(),
                    content: rewriter.rewrite(&text, &opts, None).into_bytes(),
                }
            }
            RewriteMode::Jsonp => RewriteOutcome {
                title: String::new(),
                content: self.unwrap_jsonp(&text).into_bytes(),
            },
            RewriteMode::Json => {
                let unwrapped = self.unwrap_jsonp(&text);
                let extra = ds::rules_for_url(self.url_rewriter.article_url().as_str());
                let content = if extra.is_empty() {
                    unwrapped
                } else {
                    let rewriter = rx_replacer::RxRewriter::new(extra)
                        .expect("hardcoded domain rule regexes are valid");
                    rewriter.rewrite(&unwrapped, &RewriteOpts::default())
                };
                RewriteOutcome {
                    title: String::new(),
                    content: content.into_bytes(),
                }
            }
        }
    }

    /// Replace the wrapper callback of a JSONP payload with the name the
    /// request asked for, dropping leading comments.
    fn unwrap_jsonp(&self, content: &str) -> String {
        let Some(caps) = JSONP_WRAPPER_RX.captures(content) else {
            return content.to_string();
        };
        let Some(callback) = extract_jsonp_callback(self.url_rewriter.article_url().as_str())
        else {
            return content.to_string();
        };
        let Some(wrapper) = caps.get(1) else {
            return content.to_string();
        };
        format!("{callback}{}", &content[wrapper.end()..])
    }
}
