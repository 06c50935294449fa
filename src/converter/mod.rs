//! Two-pass conversion driver.
//!
//! Pass 1 walks the record stream and populates the canonical path set (and
//! the redirect map). Pass 2 re-reads the records, rewrites HTML/CSS/JS
//! payloads against that set and hands every finished entry to the sink;
//! redirects become aliases afterwards, when their target made it into the
//! bundle. Canonical-path collisions resolve first-writer-wins.
//!
//! The driver is strictly sequential and holds one payload in memory at a
//! time; record order is observable (module classification follows it).

pub mod dir_sink;
pub mod jsonl;
pub mod records;

pub use dir_sink::DirSink;
pub use jsonl::JsonlRecordSource;
pub use records::{ArchiveRecord, EntrySink, RecordSource, VecRecordSource};

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;

use anyhow::{bail, Context, Result};

use crate::config::ConversionConfig;
use crate::content_rewriting::{PayloadRewriter, RewriteMode};
use crate::errors::RewriteError;
use crate::url_rewriting::{normalize, ArticleUrlRewriter, HttpUrl, ZimPath};

/// Reserved prefix for the runtime helper assets; no canonical path coming
/// from a record may collide with it.
pub const STATIC_PREFIX: &str = "_zim_static/";

const PAYLOAD_STATUSES: &[u16] = &[200, 201, 202, 203];
const REDIRECT_STATUSES: &[u16] = &[301, 302, 306, 307];

const FALLBACK_MIME: &str = "application/octet-stream";

/// Browser-side fuzzy rule table, generated from `rules/rules.json`.
static FUZZY_RULES_JS: &str = include_str!(concat!(env!("OUT_DIR"), "/fuzzy_rules.js"));
/// The dynamic rewriter helper shipped into every bundle.
static BUNDLE_SETUP_JS: &str = include_str!("../statics/bundle_setup.js");

#[derive(Debug, Clone, Default)]
pub struct ConversionSummary {
    pub written: usize,
    pub aliased: usize,
    pub skipped: usize,
}

pub struct Converter {
    config: ConversionConfig,
    expected_paths: HashSet<ZimPath>,
    redirections: HashMap<ZimPath, ZimPath>,
    js_modules: RefCell<HashSet<ZimPath>>,
    added: HashSet<ZimPath>,
    total_records: usize,
    summary: ConversionSummary,
}

impl Converter {
    pub fn new(config: ConversionConfig) -> Self {
        Self {
            config,
            expected_paths: HashSet::new(),
            redirections: HashMap::new(),
            js_modules: RefCell::new(HashSet::new()),
            added: HashSet::new(),
            total_records: 0,
            summary: ConversionSummary::default(),
        }
    }

    /// Run both passes over `source`, emitting into `sink`.
    pub fn run(
        &mut self,
        source: &mut dyn RecordSource,
        sink: &mut dyn EntrySink,
    ) -> Result<ConversionSummary> {
        self.gather_expected_paths(source)
            .context("first pass over records failed")?;
        log::info!(
            "first pass done: {} records, {} distinct paths, {} redirects",
            self.total_records,
            self.expected_paths.len(),
            self.redirections.len()
        );

        self.emit_static_assets(sink)?;
        self.rewrite_and_emit(source, sink)
            .context("second pass over records failed")?;
        self.emit_aliases(sink)?;

        if let Some(main_url) = &self.config.main_url {
            let main_path = normalize(main_url, &self.config.fuzzy);
            if !self.added.contains(&main_path) {
                log::warn!("main page {main_path} is not part of the bundle");
            }
        }

        sink.finish()?;
        log::info!(
            "conversion done: {} written, {} aliased, {} skipped",
            self.summary.written,
            self.summary.aliased,
            self.summary.skipped
        );
        Ok(self.summary.clone())
    }

    fn gather_expected_paths(&mut self, source: &mut dyn RecordSource) -> Result<()> {
        for record in source.records()? {
            let record = record?;
            self.total_records += 1;

            let url = match HttpUrl::parse(&record.url) {
                Ok(url) => url,
                Err(err) => {
                    log::warn!("skipping record: {err}");
                    continue;
                }
            };

            if PAYLOAD_STATUSES.contains(&record.status) {
                let path = normalize(&url, &self.config.fuzzy);
                if path.value().starts_with(STATIC_PREFIX) {
                    bail!("record path {path} collides with the reserved {STATIC_PREFIX} prefix");
                }
                self.expected_paths.insert(path);
            } else if REDIRECT_STATUSES.contains(&record.status) {
                let Some(location) = record.location.as_deref() else {
                    continue;
                };
                let source_path = normalize(&url, &self.config.fuzzy);
                let target_path = url
                    .join(location.trim())
                    .ok()
                    .and_then(|resolved| HttpUrl::from_url(resolved).ok())
                    .map(|target| normalize(&target, &self.config.fuzzy));
                match target_path {
                    Some(target) if target != source_path => {
                        self.redirections.insert(source_path, target);
                    }
                    Some(_) => {}
                    None => log::warn!("unresolvable redirect target {location:?} for {url}"),
                }
            }
        }
        Ok(())
    }

    fn emit_static_assets(&mut self, sink: &mut dyn EntrySink) -> Result<()> {
        sink.add_entry(
            &ZimPath::new(format!("{STATIC_PREFIX}fuzzy_rules.js")),
            "text/javascript",
            "",
            FUZZY_RULES_JS.as_bytes(),
            false,
        )?;
        sink.add_entry(
            &ZimPath::new(format!("{STATIC_PREFIX}bundle_setup.js")),
            "text/javascript",
            "",
            BUNDLE_SETUP_JS.as_bytes(),
            false,
        )?;
        if let Some(css) = &self.config.custom_css {
            sink.add_entry(
                &ZimPath::new(format!("{STATIC_PREFIX}custom.css")),
                "text/css",
                "",
                css,
                false,
            )?;
        }
        Ok(())
    }

    fn rewrite_and_emit(
        &mut self,
        source: &mut dyn RecordSource,
        sink: &mut dyn EntrySink,
    ) -> Result<()> {
        for record in source.records()? {
            let record = record?;

            if !PAYLOAD_STATUSES.contains(&record.status) {
                if !REDIRECT_STATUSES.contains(&record.status) {
                    self.summary.skipped += 1;
                }
                continue;
            }
            let url = match HttpUrl::parse(&record.url) {
                Ok(url) => url,
                Err(err) => {
                    log::warn!("skipping record: {err}");
                    self.summary.skipped += 1;
                    continue;
                }
            };

            let rewriter = PayloadRewriter::new(
                url,
                record.resource_type.as_deref(),
                record.media_type.as_deref(),
                &self.expected_paths,
                &self.js_modules,
                &self.config.fuzzy,
            );
            let path = rewriter.path().clone();
            let mode = rewriter.mode();

            if self.added.contains(&path) {
                log::warn!(
                    "ignoring later record for {}: {}",
                    record.url,
                    RewriteError::Collision(path.value().to_string())
                );
                self.summary.skipped += 1;
                continue;
            }
            if record.payload.is_empty() {
                log::debug!("dropping {path}: {}", RewriteError::EmptyPayload);
                self.summary.skipped += 1;
                continue;
            }

            let (pre_head, post_head) = if mode == Some(RewriteMode::Html) {
                self.head_inserts(rewriter.url_rewriter(), &path)
            } else {
                (String::new(), None)
            };
            let outcome = rewriter.rewrite(&record.payload, &pre_head, post_head.as_deref());
            drop(rewriter);

            let media_type = record
                .media_type
                .as_deref()
                .map(str::trim)
                .filter(|mime| !mime.is_empty())
                .unwrap_or(FALLBACK_MIME);
            sink.add_entry(
                &path,
                media_type,
                &outcome.title,
                &outcome.content,
                mode == Some(RewriteMode::Html),
            )?;
            self.added.insert(path);
            self.summary.written += 1;
            self.update_progress()?;
        }
        Ok(())
    }

    fn emit_aliases(&mut self, sink: &mut dyn EntrySink) -> Result<()> {
        for (path, target) in &self.redirections {
            if self.added.contains(path) {
                continue;
            }
            if self.added.contains(target) {
                sink.add_alias(path, target)?;
                self.summary.aliased += 1;
            } else {
                // Aliases may only point at entries that exist.
                log::debug!("dropping redirect {path} -> {target}: target not in bundle");
                self.summary.skipped += 1;
            }
        }
        Ok(())
    }

    /// Build the snippet inserted at the very top of `<head>` (helper
    /// bootstrap carrying the document's original scheme, host and URL) and,
    /// when a custom stylesheet is configured, the link appended at its end.
    fn head_inserts(
        &self,
        rewriter: &ArticleUrlRewriter<'_>,
        path: &ZimPath,
    ) -> (String, Option<String>) {
        let rules_link =
            rewriter.link_to_path(&ZimPath::new(format!("{STATIC_PREFIX}fuzzy_rules.js")));
        let setup_link =
            rewriter.link_to_path(&ZimPath::new(format!("{STATIC_PREFIX}bundle_setup.js")));
        let static_prefix = rewriter.link_to_path(&ZimPath::new(STATIC_PREFIX));

        let orig = rewriter.article_url().as_url();
        let orig_host = match orig.port() {
            Some(port) => format!("{}:{port}", orig.host_str().unwrap_or_default()),
            None => orig.host_str().unwrap_or_default().to_string(),
        };
        let init = serde_json::json!({
            "path": path.value(),
            "staticPrefix": static_prefix,
            "origUrl": rewriter.article_url().as_str(),
            "origScheme": orig.scheme(),
            "origHost": orig_host,
        })
        .to_string()
        // Keep the inline script parser from seeing a closing tag.
        .replace("</", "<\\/");

        let pre_head = format!(
            "<script src=\"{rules_link}\"></script>\
             <script src=\"{setup_link}\"></script>\
             <script>if (window.bundleSetup) {{ bundleSetup.init({init}); }}</script>"
        );
        let post_head = self.config.custom_css.as_ref().map(|_| {
            let css_link =
                rewriter.link_to_path(&ZimPath::new(format!("{STATIC_PREFIX}custom.css")));
            format!("<link rel=\"stylesheet\" href=\"{css_link}\">")
        });
        (pre_head, post_head)
    }

    fn update_progress(&self) -> Result<()> {
        let Some(progress_file) = &self.config.progress_file else {
            return Ok(());
        };
        let stats = serde_json::json!({
            "written": self.summary.written,
            "total": self.total_records,
        });
        fs::write(progress_file, stats.to_string())
            .with_context(|| format!("cannot write progress file {}", progress_file.display()))?;
        Ok(())
    }
}
