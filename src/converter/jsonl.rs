//! JSON-lines record source.
//!
//! A thin, testable stand-in for a WARC reader: one JSON object per line,
//! payload inline as text or base64. Blank lines and `#` comments are
//! skipped. The file is reopened for each pass.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use super::records::{ArchiveRecord, RecordSource};

#[derive(Debug, Deserialize)]
struct RecordLine {
    url: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    location: Option<String>,
    /// UTF-8 payload, convenient for hand-written manifests.
    #[serde(default)]
    payload: Option<String>,
    /// Base64 payload, for binary bodies.
    #[serde(default)]
    payload_base64: Option<String>,
}

fn default_status() -> u16 {
    200
}

pub struct JsonlRecordSource {
    path: PathBuf,
}

impl JsonlRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse_line(line: &str) -> Result<ArchiveRecord> {
        let parsed: RecordLine =
            serde_json::from_str(line).context("malformed record line")?;
        let payload = match (&parsed.payload, &parsed.payload_base64) {
            (Some(text), _) => text.clone().into_bytes(),
            (None, Some(encoded)) => BASE64
                .decode(encoded.trim())
                .context("malformed base64 payload")?,
            (None, None) => Vec::new(),
        };
        Ok(ArchiveRecord {
            url: parsed.url,
            media_type: parsed.media_type,
            resource_type: parsed.resource_type,
            status: parsed.status,
            location: parsed.location,
            payload,
        })
    }
}

impl RecordSource for JsonlRecordSource {
    fn records(&mut self) -> Result<Box<dyn Iterator<Item = Result<ArchiveRecord>> + '_>> {
        let file = File::open(&self.path)
            .with_context(|| format!("cannot open record manifest {}", self.path.display()))?;
        let lines = BufReader::new(file).lines();
        Ok(Box::new(lines.filter_map(|line| match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(Self::parse_line(trimmed))
                }
            }
            Err(err) => Some(Err(err.into())),
        })))
    }
}
