//! Generic combined-regex text rewriter.
//!
//! Takes an ordered list of `(pattern, action)` rules and applies them in a
//! single pass: the patterns are combined into one alternation
//! `(p1)|(p2)|…`, each wrapped in its own capture group, and on every match
//! the group that participated selects the action to run on the matched
//! text. One pass over the payload instead of one per rule, and an earlier
//! rule matching a region prevents later rules from seeing it.
//!
//! Constraint: rule patterns must only contain non-capturing groups
//! (`(?:…)`), since the outer per-rule groups are how matches are attributed.
//! Actions that need finer splitting re-match their own sub-regex on the
//! matched text.

use regex::{Captures, Regex};

/// Options threaded through a rewrite call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOpts {
    /// The payload is an ES module (affects import handling).
    pub is_module: bool,
    /// The payload is inline in an HTML attribute (newlines are flattened).
    pub inline: bool,
}

pub type RewriteAction<'a> = Box<dyn Fn(&str, &RewriteOpts) -> String + 'a>;

pub struct TransformationRule<'a> {
    pub pattern: String,
    pub action: RewriteAction<'a>,
}

impl<'a> TransformationRule<'a> {
    pub fn new(pattern: impl Into<String>, action: RewriteAction<'a>) -> Self {
        Self {
            pattern: pattern.into(),
            action,
        }
    }
}

/// Build an action that replaces the whole match with a fixed string.
pub fn replace_all_with<'a>(text: &'a str) -> RewriteAction<'a> {
    Box::new(move |_, _| text.to_string())
}

/// Build an action that prepends a prefix to the match.
pub fn add_prefix<'a>(prefix: &'a str) -> RewriteAction<'a> {
    Box::new(move |matched, _| format!("{prefix}{matched}"))
}

/// Build an action that appends a suffix to the match.
pub fn add_suffix<'a>(suffix: &'a str) -> RewriteAction<'a> {
    Box::new(move |matched, _| format!("{matched}{suffix}"))
}

/// Build an action that wraps the match.
pub fn wrap_with<'a>(prefix: &'a str, suffix: &'a str) -> RewriteAction<'a> {
    Box::new(move |matched, _| format!("{prefix}{matched}{suffix}"))
}

pub struct RxRewriter<'a> {
    rules: Vec<TransformationRule<'a>>,
    compiled: Regex,
}

impl<'a> RxRewriter<'a> {
    pub fn new(rules: Vec<TransformationRule<'a>>) -> Result<Self, regex::Error> {
        let alternation = rules
            .iter()
            .map(|rule| format!("({})", rule.pattern))
            .collect::<Vec<_>>()
            .join("|");
        let compiled = Regex::new(&format!("(?m)(?:{alternation})"))?;
        Ok(Self { rules, compiled })
    }

    pub fn rewrite(&self, text: &str, opts: &RewriteOpts) -> String {
        let rewritten = self
            .compiled
            .replace_all(text, |caps: &Captures| {
                for (index, rule) in self.rules.iter().enumerate() {
                    if caps.get(index + 1).is_some() {
                        return (rule.action)(&caps[0], opts);
                    }
                }
                caps[0].to_string()
            })
            .into_owned();
        if opts.inline {
            rewritten.replace('\n', " ")
        } else {
            rewritten
        }
    }
}
