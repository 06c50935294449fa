//! Fuzzy canonicalization rules.
//!
//! An ordered list of regex substitutions applied to decoded canonical paths
//! so equivalent URLs (video CDN shards, cache-busting query strings, …)
//! collapse onto one bundle entry. The default table is generated by
//! `build.rs` from `rules/rules.json`, the same file that produces the
//! browser-side table, so the offline and in-page engines cannot drift.
//!
//! The rule list is always injected; nothing in the crate reads it from a
//! process-wide singleton, which lets tests substitute alternate lists.

use std::borrow::Cow;

use regex::Regex;

include!(concat!(env!("OUT_DIR"), "/fuzzy_rules.rs"));

/// One `(match, replace)` rule. Patterns are start-anchored at compile time;
/// replace templates use `$1`-style group references.
#[derive(Debug, Clone)]
struct FuzzyRule {
    regex: Regex,
    replace: String,
}

/// Ordered, immutable rule list shared by a whole conversion.
#[derive(Debug, Clone)]
pub struct FuzzyRules {
    rules: Vec<FuzzyRule>,
}

impl FuzzyRules {
    /// Compile a rule table. Patterns must restrict themselves to syntax both
    /// this engine and ECMAScript `RegExp` support (no lookaround) and must
    /// consume the remainder of the input they intend to drop.
    pub fn from_table(table: &[(&str, &str)]) -> Result<Self, regex::Error> {
        let rules = table
            .iter()
            .map(|(pattern, replace)| {
                Ok(FuzzyRule {
                    regex: Regex::new(&format!("^(?:{pattern})"))?,
                    replace: (*replace).to_string(),
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// A rule list that never changes anything.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Apply the first rule that changes the path; otherwise return it as-is.
    pub fn reduce<'a>(&self, path: &'a str) -> Cow<'a, str> {
        for rule in &self.rules {
            if let Some(captures) = rule.regex.captures(path) {
                let mut reduced = String::with_capacity(path.len());
                captures.expand(&rule.replace, &mut reduced);
                if reduced != path {
                    return Cow::Owned(reduced);
                }
            }
        }
        Cow::Borrowed(path)
    }
}

impl Default for FuzzyRules {
    fn default() -> Self {
        Self::from_table(DEFAULT_RULE_TABLE).expect("generated rule table compiles")
    }
}
