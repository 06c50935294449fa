//! HTML rewriter.
//!
//! Streaming rewrite over lol_html: one catch-all element handler takes care
//! of URL-bearing attributes, `srcset`, `<base href>`, `<meta http-equiv=
//! "refresh">`, `integrity` stripping, inline event handlers and the head
//! insertions, while buffered text handlers feed inline `<style>` and
//! `<script>` bodies to the CSS and JS rewriters. The first `<title>` text is
//! captured and returned for use as the entry's title.
//!
//! Character references in attribute values are decoded before the URL
//! pipeline runs; lol_html re-escapes on emit and always emits double-quoted
//! attributes.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use lol_html::html_content::{ContentType, Element};
use lol_html::{element, text, Settings};
use regex::Regex;
use url::Url;

use super::css::CssRewriter;
use super::js::JsRewriter;
use super::rx_replacer::RewriteOpts;
use crate::errors::RewriteError;
use crate::url_rewriting::{ArticleUrlRewriter, ZimPath};

/// Attributes whose value is a single URL, rewritten via the common pipeline.
const URL_ATTRIBUTES: &[&str] = &[
    "href",
    "src",
    "poster",
    "data",
    "action",
    "formaction",
    "background",
    "cite",
    "longdesc",
    "usemap",
];

static META_REFRESH_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(\s*[\d.]+\s*;\s*url\s*=\s*)(.+)$")
        .expect("META_REFRESH_RX: hardcoded regex is valid")
});

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScriptKind {
    Classic,
    Module,
    /// Non-executable payloads (`application/json`, templates, …).
    Data,
}

pub struct RewrittenHtml {
    pub title: String,
    pub content: Vec<u8>,
}

pub struct HtmlRewriter<'a> {
    url_rewriter: &'a ArticleUrlRewriter<'a>,
    pre_head_insert: String,
    post_head_insert: Option<String>,
    notify_js_module: &'a dyn Fn(ZimPath),
}

impl<'a> HtmlRewriter<'a> {
    pub fn new(
        url_rewriter: &'a ArticleUrlRewriter<'a>,
        pre_head_insert: String,
        post_head_insert: Option<String>,
        notify_js_module: &'a dyn Fn(ZimPath),
    ) -> Self {
        Self {
            url_rewriter,
            pre_head_insert,
            post_head_insert,
            notify_js_module,
        }
    }

    pub fn rewrite(&self, content: &str) -> Result<RewrittenHtml, RewriteError> {
        let base: Rc<RefCell<Option<Url>>> = Rc::new(RefCell::new(None));
        let title = Rc::new(RefCell::new(String::new()));
        let title_done = Rc::new(RefCell::new(false));
        let script_kind = Rc::new(RefCell::new(ScriptKind::Classic));
        let script_buf = Rc::new(RefCell::new(String::new()));
        let style_buf = Rc::new(RefCell::new(String::new()));

        let css = CssRewriter::new(self.url_rewriter);
        let js = JsRewriter::new(self.url_rewriter, Some(self.notify_js_module));
        let css = &css;
        let js = &js;

        let mut output = Vec::with_capacity(content.len());
        let result = {
            let element_base = base.clone();
            let element_kind = script_kind.clone();
            let style_base = base.clone();
            let script_base = base.clone();
            let text_kind = script_kind.clone();
            let title_sink = title.clone();
            let title_flag = title_done.clone();

            let mut rewriter = lol_html::HtmlRewriter::new(
                Settings {
                    element_content_handlers: vec![
                        element!("*", move |el| {
                            self.handle_element(el, &element_base, &element_kind, js, css)
                        }),
                        text!("title", move |chunk| {
                            if !*title_flag.borrow() {
                                title_sink.borrow_mut().push_str(chunk.as_str());
                                if chunk.last_in_text_node() {
                                    *title_flag.borrow_mut() = true;
                                }
                            }
                            Ok(())
                        }),
                        text!("style", {
                            let buf = style_buf.clone();
                            move |chunk| {
                                buf.borrow_mut().push_str(chunk.as_str());
                                if chunk.last_in_text_node() {
                                    let source = std::mem::take(&mut *buf.borrow_mut());
                                    let rewritten =
                                        css.rewrite(&source, style_base.borrow().as_ref());
                                    chunk.replace(&rewritten, ContentType::Html);
                                } else {
                                    chunk.remove();
                                }
                                Ok(())
                            }
                        }),
                        text!("script", {
                            let buf = script_buf.clone();
                            move |chunk| {
                                let kind = *text_kind.borrow();
                                if kind == ScriptKind::Data {
                                    return Ok(());
                                }
                                buf.borrow_mut().push_str(chunk.as_str());
                                if chunk.last_in_text_node() {
                                    let source = std::mem::take(&mut *buf.borrow_mut());
                                    let rewritten = if source.trim().is_empty() {
                                        source
                                    } else {
                                        let opts = RewriteOpts {
                                            is_module: kind == ScriptKind::Module,
                                            ..Default::default()
                                        };
                                        js.rewrite(&source, &opts, script_base.borrow().as_ref())
                                    };
                                    chunk.replace(&rewritten, ContentType::Html);
                                } else {
                                    chunk.remove();
                                }
                                Ok(())
                            }
                        }),
                    ],
                    ..Settings::default()
                },
                |chunk: &[u8]| output.extend_from_slice(chunk),
            );
            rewriter
                .write(content.as_bytes())
                .and_then(|()| rewriter.end())
        };

        if let Err(err) = result {
            log::warn!(
                "HTML rewrite of {} failed: {err}",
                self.url_rewriter.article_path()
            );
            return Err(RewriteError::ParseError {
                kind: "html",
                path: self.url_rewriter.article_path().value().to_string(),
            });
        }

        let title = title.borrow().trim().to_string();
        Ok(RewrittenHtml {
            title,
            content: output,
        })
    }

    fn handle_element(
        &self,
        el: &mut Element,
        base: &RefCell<Option<Url>>,
        script_kind: &RefCell<ScriptKind>,
        js: &JsRewriter<'_>,
        css: &CssRewriter<'_>,
    ) -> HandlerResult {
        let tag = el.tag_name();

        match tag.as_str() {
            "base" => {
                if let Some(href) = el.get_attribute("href") {
                    let decoded = decode_entities(&href);
                    if base.borrow().is_none() {
                        if let Ok(resolved) = self.url_rewriter.article_url().join(decoded.trim())
                        {
                            *base.borrow_mut() = Some(resolved);
                        }
                    }
                    let rewritten = self.url_rewriter.rewrite(&decoded, None);
                    el.set_attribute("href", &rewritten)?;
                }
                return Ok(());
            }
            "head" => {
                el.prepend(&self.pre_head_insert, ContentType::Html);
                if let Some(post) = &self.post_head_insert {
                    el.append(post, ContentType::Html);
                }
            }
            "meta" => {
                self.rewrite_meta_refresh(el, base)?;
            }
            "script" => {
                let kind = script_kind_of(el);
                *script_kind.borrow_mut() = kind;
                el.remove_attribute("integrity");
                if kind == ScriptKind::Module {
                    if let Some(src) = el.get_attribute("src") {
                        let decoded = decode_entities(&src);
                        match self
                            .url_rewriter
                            .item_path(&decoded, base.borrow().as_ref())
                        {
                            Ok(path) => (self.notify_js_module)(path),
                            Err(err) => {
                                log::warn!("cannot record module script {decoded:?}: {err}")
                            }
                        }
                    }
                }
            }
            "link" => {
                el.remove_attribute("integrity");
            }
            _ => {}
        }

        for name in URL_ATTRIBUTES {
            if let Some(value) = el.get_attribute(name) {
                let decoded = decode_entities(&value);
                let rewritten = self
                    .url_rewriter
                    .rewrite(&decoded, base.borrow().as_ref());
                el.set_attribute(name, &rewritten)?;
            }
        }

        if let Some(srcset) = el.get_attribute("srcset") {
            let decoded = decode_entities(&srcset);
            let rewritten = self.rewrite_srcset(&decoded, base.borrow().as_ref());
            el.set_attribute("srcset", &rewritten)?;
        }

        if let Some(style) = el.get_attribute("style") {
            let decoded = decode_entities(&style);
            let rewritten = css.rewrite(&decoded, base.borrow().as_ref());
            el.set_attribute("style", &rewritten)?;
        }

        // Inline event handlers (onclick, onload, …) hold classic JS.
        let handler_attrs: Vec<(String, String)> = el
            .attributes()
            .iter()
            .filter(|attr| attr.name().starts_with("on") && attr.name().len() > 2)
            .map(|attr| (attr.name(), attr.value()))
            .collect();
        for (name, value) in handler_attrs {
            let decoded = decode_entities(&value);
            let opts = RewriteOpts {
                inline: true,
                ..Default::default()
            };
            let rewritten = js.rewrite(&decoded, &opts, base.borrow().as_ref());
            el.set_attribute(&name, &rewritten)?;
        }

        Ok(())
    }

    fn rewrite_meta_refresh(
        &self,
        el: &mut Element,
        base: &RefCell<Option<Url>>,
    ) -> HandlerResult {
        let refresh = el
            .get_attribute("http-equiv")
            .is_some_and(|equiv| equiv.trim().eq_ignore_ascii_case("refresh"));
        if !refresh {
            return Ok(());
        }
        if let Some(content) = el.get_attribute("content") {
            let decoded = decode_entities(&content);
            if let Some(caps) = META_REFRESH_RX.captures(&decoded) {
                let rewritten = self
                    .url_rewriter
                    .rewrite(caps[2].trim(), base.borrow().as_ref());
                el.set_attribute("content", &format!("{}{}", &caps[1], rewritten))?;
            }
        }
        Ok(())
    }

    /// `srcset` is a comma-separated list of `URL [descriptor]` candidates.
    fn rewrite_srcset(&self, srcset: &str, base: Option<&Url>) -> String {
        srcset
            .split(',')
            .filter_map(|candidate| {
                let trimmed = candidate.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let mut parts = trimmed.splitn(2, char::is_whitespace);
                let url = parts.next().unwrap_or_default();
                let descriptor = parts.next();
                let rewritten = self.url_rewriter.rewrite(url, base);
                Some(match descriptor {
                    Some(descriptor) => format!("{rewritten} {descriptor}"),
                    None => rewritten,
                })
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn script_kind_of(el: &Element) -> ScriptKind {
    match el.get_attribute("type") {
        None => ScriptKind::Classic,
        Some(raw) => {
            let ty = raw.trim().to_ascii_lowercase();
            if ty.is_empty() || ty.contains("javascript") || ty.contains("ecmascript") {
                ScriptKind::Classic
            } else if ty == "module" {
                ScriptKind::Module
            } else {
                ScriptKind::Data
            }
        }
    }
}

/// Decode HTML character references in an attribute value: the named forms of
/// the mandatorily-escaped set plus numeric (`&#NN;`, `&#xHH;`) references.
/// Unknown entities are kept literal.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let end = match rest.find(';') {
            // Entity names are short; a distant ';' is not a reference.
            Some(end) if end <= 32 => end,
            _ => {
                out.push('&');
                rest = &rest[1..];
                continue;
            }
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix('#')
                .and_then(|num| {
                    if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        num.parse::<u32>().ok()
                    }
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
