//! Error types shared by the canonicalizer, the rewriters and the converter.

use thiserror::Error;

/// Error conditions raised while canonicalizing URLs or rewriting payloads.
///
/// Reference-level failures are recovered in place (the reference is left
/// untouched and a warning is logged); record-level failures skip the record.
/// Only genuinely fatal conditions (I/O, sink errors) propagate further, as
/// `anyhow::Error`.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The URL is unparseable, lacks a host, or uses a non-http(s) scheme.
    #[error("invalid or non-http(s) URL: {0}")]
    InvalidUrl(String),

    /// The record's media class could not be established.
    #[error("unsupported media class: {0}")]
    UnsupportedMedia(String),

    /// An HTML/CSS/JS parser failed; the payload passes through unchanged.
    #[error("failed to parse {kind} payload of {path}")]
    ParseError { kind: &'static str, path: String },

    /// The canonical path was already written (first writer wins).
    #[error("canonical path already written: {0}")]
    Collision(String),

    /// Zero-length payloads are silently dropped.
    #[error("empty payload")]
    EmptyPayload,
}
