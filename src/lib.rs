//! offzim converts captured web-archive records into a single offline
//! content bundle that renders in a modern browser without any live server.
//!
//! The core is the content rewriting and path canonicalization engine:
//!
//! 1. every captured resource gets a canonical, decoded, host-prefixed path
//!    ([`url_rewriting`]);
//! 2. equivalent URLs are merged by an ordered fuzzy rule list, authored once
//!    in `rules/rules.json` and compiled for both the offline engine and the
//!    in-browser helper ([`url_rewriting::fuzzy`]);
//! 3. HTML, CSS and JS payloads are rewritten so every reference resolves
//!    inside the bundle as a relative link ([`content_rewriting`]);
//! 4. a small runtime module shipped under `_zim_static/` performs the same
//!    rewriting for URLs synthesized by scripts at replay time
//!    (`src/statics/bundle_setup.js`).
//!
//! [`converter::Converter`] drives the two passes over the record stream:
//! pass 1 collects the canonical path set, pass 2 rewrites and emits.

pub mod config;
pub mod content_rewriting;
pub mod converter;
pub mod errors;
pub mod url_rewriting;

pub use config::ConversionConfig;
pub use converter::records::{ArchiveRecord, EntrySink, RecordSource};
pub use converter::{ConversionSummary, Converter, DirSink, JsonlRecordSource};
pub use errors::RewriteError;
pub use url_rewriting::{
    encode_canonical_path, normalize, ArticleUrlRewriter, FuzzyRules, HttpUrl, ZimPath,
};
