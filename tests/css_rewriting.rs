//! CSS payloads through the media-class dispatcher.

use std::cell::RefCell;
use std::collections::HashSet;

use offzim::content_rewriting::{PayloadRewriter, RewriteMode};
use offzim::{FuzzyRules, HttpUrl};

fn rewrite_css(doc_url: &str, css: &str) -> String {
    let rules = FuzzyRules::empty();
    let known = HashSet::new();
    let modules = RefCell::new(HashSet::new());
    let rewriter = PayloadRewriter::new(
        HttpUrl::parse(doc_url).unwrap(),
        Some("stylesheet"),
        Some("text/css"),
        &known,
        &modules,
        &rules,
    );
    assert_eq!(rewriter.mode(), Some(RewriteMode::Css));
    let outcome = rewriter.rewrite(css.as_bytes(), "", None);
    String::from_utf8(outcome.content).unwrap()
}

#[test]
fn stylesheet_urls_and_imports() {
    let out = rewrite_css(
        "https://www.example.com/styles/main.css",
        "@charset \"utf-8\";\n\
         @import url(\"https://www.example.com/styles/reset.css\");\n\
         body { background: url(/img/bg.png) no-repeat; }\n",
    );
    assert!(out.contains("@charset \"utf-8\";"), "{out}");
    assert!(out.contains("@import url(\"reset.css\")"), "{out}");
    assert!(out.contains("url(\"../img/bg.png\") no-repeat"), "{out}");
}

#[test]
fn cross_host_font_reference() {
    let out = rewrite_css(
        "https://www.example.com/styles/main.css",
        "@font-face { src: url(\"https://fonts.example.net/a.woff2\") format(\"woff2\"); }",
    );
    assert!(
        out.contains("url(\"../../fonts.example.net/a.woff2\")"),
        "{out}"
    );
    assert!(out.contains("format(\"woff2\")"), "{out}");
}

#[test]
fn unparseable_payload_is_passed_through() {
    let broken = "this is not css {{{ ]] ;";
    assert_eq!(
        rewrite_css("https://www.example.com/styles/main.css", broken),
        broken
    );
}

#[test]
fn stylesheet_resource_type_wins_over_missing_mime() {
    let rules = FuzzyRules::empty();
    let known = HashSet::new();
    let modules = RefCell::new(HashSet::new());
    let rewriter = PayloadRewriter::new(
        HttpUrl::parse("https://www.example.com/styles/main.css").unwrap(),
        Some("stylesheet"),
        None,
        &known,
        &modules,
        &rules,
    );
    assert_eq!(rewriter.mode(), Some(RewriteMode::Css));
}
