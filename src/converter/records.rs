//! Record stream and entry sink abstractions.
//!
//! The converter consumes an abstract stream of captured records and emits
//! entries into an abstract sink; WARC iteration and the actual bundle
//! writer live behind these traits.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::url_rewriting::ZimPath;

/// One captured HTTP exchange (or synthetic resource).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Original absolute URL of the capture.
    pub url: String,
    /// Declared media type, when known (e.g. `text/html; charset=utf-8`).
    #[serde(default)]
    pub media_type: Option<String>,
    /// Authoritative record-type hint, when the capturing tool provides one
    /// (`document`, `stylesheet`, `script`, `xhr`, `fetch`).
    #[serde(default)]
    pub resource_type: Option<String>,
    /// HTTP response status.
    pub status: u16,
    /// Redirect target, for 3xx records.
    #[serde(default)]
    pub location: Option<String>,
    /// Response body.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
}

/// A re-readable stream of records; `records()` is called once per pass.
pub trait RecordSource {
    fn records(&mut self) -> Result<Box<dyn Iterator<Item = Result<ArchiveRecord>> + '_>>;
}

/// Receiver of finished bundle entries. Deduplication is the converter's
/// job; a sink may assume each path arrives at most once.
pub trait EntrySink {
    fn add_entry(
        &mut self,
        path: &ZimPath,
        media_type: &str,
        title: &str,
        content: &[u8],
        is_front: bool,
    ) -> Result<()>;

    fn add_alias(&mut self, path: &ZimPath, target: &ZimPath) -> Result<()>;

    /// Called once after both passes completed.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory source, mainly for tests and embedding.
pub struct VecRecordSource {
    records: Vec<ArchiveRecord>,
}

impl VecRecordSource {
    pub fn new(records: Vec<ArchiveRecord>) -> Self {
        Self { records }
    }
}

impl RecordSource for VecRecordSource {
    fn records(&mut self) -> Result<Box<dyn Iterator<Item = Result<ArchiveRecord>> + '_>> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}
