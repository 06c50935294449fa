//! JavaScript rewriter.
//!
//! Text-level rewriting, no AST: one combined-regex pass (see
//! [`rx_replacer`](super::rx_replacer)) over the payload targeting string
//! literals that hold absolute or scheme-relative URLs. Module payloads get
//! one extra rule for `import` statements: bare specifiers are left alone,
//! relative and http(s) specifiers are rewritten and reported so the
//! transitive closure of module scripts is known to the converter.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::ds;
use super::rx_replacer::{RewriteAction, RewriteOpts, RxRewriter, TransformationRule};
use crate::url_rewriting::{ArticleUrlRewriter, ZimPath};

// Quoted string literals holding an absolute or scheme-relative URL.
// Bounded quantifiers keep pathological inputs from backtracking wildly.
const DOUBLE_QUOTED_URL: &str = r#""(?:https?:)?//[^"'\s]{1,2000}""#;
const SINGLE_QUOTED_URL: &str = r#"'(?:https?:)?//[^"'\s]{1,2000}'"#;

// A whole `import … from '…'` / `import '…'` statement in module code.
const IMPORT_STATEMENT: &str =
    r#"^\s*?import(?:['"\s]*(?:[\w*${}\s,]+from\s*)?['"\s]?['"\s])(?:.*?)['"\s]"#;

/// Splits an import statement into (prelude, specifier, closing quote).
/// Only http(s) and `/`-, `./`-, `../`-style specifiers participate; bare
/// specifiers never match and stay untouched.
static IMPORT_SPECIFIER_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(import(?:['"\s]*(?:[\w*${}\s,]+from\s*)?['"\s]?['"\s]))((?:https?|[./]).*?)(['"\s])"#,
    )
    .expect("IMPORT_SPECIFIER_RX: hardcoded regex is valid")
});

pub struct JsRewriter<'a> {
    url_rewriter: &'a ArticleUrlRewriter<'a>,
    notify_js_module: Option<&'a dyn Fn(ZimPath)>,
}

impl<'a> JsRewriter<'a> {
    pub fn new(
        url_rewriter: &'a ArticleUrlRewriter<'a>,
        notify_js_module: Option<&'a dyn Fn(ZimPath)>,
    ) -> Self {
        Self {
            url_rewriter,
            notify_js_module,
        }
    }

    /// Rewrite a JS payload. `base` carries the document's effective
    /// `<base href>` for inline scripts; standalone scripts pass `None`.
    pub fn rewrite(&self, text: &str, opts: &RewriteOpts, base: Option<&Url>) -> String {
        let mut rules: Vec<TransformationRule<'_>> = vec![
            TransformationRule::new(DOUBLE_QUOTED_URL, self.quoted_url_action(base)),
            TransformationRule::new(SINGLE_QUOTED_URL, self.quoted_url_action(base)),
        ];
        if opts.is_module {
            let action: RewriteAction<'_> =
                Box::new(move |matched, _| self.rewrite_import_statement(matched, base));
            rules.push(TransformationRule::new(IMPORT_STATEMENT, action));
        }
        rules.extend(ds::rules_for_url(self.url_rewriter.article_url().as_str()));

        let rewriter = RxRewriter::new(rules).expect("hardcoded JS rule regexes are valid");
        rewriter.rewrite(text, opts)
    }

    fn quoted_url_action<'b>(&'b self, base: Option<&'b Url>) -> RewriteAction<'b> {
        Box::new(move |matched, _| {
            let quote = &matched[..1];
            let inner = &matched[1..matched.len() - 1];
            let rewritten = self.url_rewriter.rewrite(inner, base);
            format!("{quote}{rewritten}{quote}")
        })
    }

    fn rewrite_import_statement(&self, matched: &str, base: Option<&Url>) -> String {
        IMPORT_SPECIFIER_RX
            .replace_all(matched, |caps: &regex::Captures| {
                let specifier = &caps[2];
                if let Some(notify) = self.notify_js_module {
                    match self.url_rewriter.item_path(specifier, base) {
                        Ok(path) => notify(path),
                        Err(err) => log::warn!("cannot record module import {specifier:?}: {err}"),
                    }
                }
                let mut rewritten = self.url_rewriter.rewrite(specifier, base);
                // Import specifiers must not look bare after rewriting.
                if !(rewritten.starts_with('/')
                    || rewritten.starts_with("./")
                    || rewritten.starts_with("../"))
                {
                    rewritten = format!("./{rewritten}");
                }
                format!("{}{}{}", &caps[1], rewritten, &caps[3])
            })
            .into_owned()
    }
}
