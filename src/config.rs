//! Conversion configuration.

use std::path::PathBuf;

use crate::url_rewriting::{FuzzyRules, HttpUrl};

/// Static configuration of one conversion, immutable once the run starts.
///
/// The fuzzy rule list is injected here rather than read from any global so
/// tests (and embedders) can substitute alternate tables.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub(crate) main_url: Option<HttpUrl>,
    pub(crate) custom_css: Option<Vec<u8>>,
    pub(crate) progress_file: Option<PathBuf>,
    pub(crate) fuzzy: FuzzyRules,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            main_url: None,
            custom_css: None,
            progress_file: None,
            fuzzy: FuzzyRules::default(),
        }
    }
}

impl ConversionConfig {
    /// URL of the entry meant as the bundle's main page; the converter warns
    /// when it does not end up in the bundle.
    #[must_use]
    pub fn with_main_url(mut self, url: HttpUrl) -> Self {
        self.main_url = Some(url);
        self
    }

    /// Extra stylesheet linked at the end of every document's `<head>`.
    #[must_use]
    pub fn with_custom_css(mut self, css: Vec<u8>) -> Self {
        self.custom_css = Some(css);
        self
    }

    /// File rewritten with `{"written": n, "total": m}` after each emission.
    #[must_use]
    pub fn with_progress_file(mut self, path: PathBuf) -> Self {
        self.progress_file = Some(path);
        self
    }

    #[must_use]
    pub fn with_fuzzy_rules(mut self, rules: FuzzyRules) -> Self {
        self.fuzzy = rules;
        self
    }
}
