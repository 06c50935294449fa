//! Directory-tree entry sink.
//!
//! Mirrors the bundle layout onto the filesystem: each entry's canonical
//! path becomes a file under the output directory, and a `manifest.json`
//! records media types, titles, the front-article flag and aliases. A
//! stand-in for the real bundle writer that keeps the converter exercisable
//! end-to-end.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use super::records::EntrySink;
use crate::url_rewriting::ZimPath;

#[derive(Debug, Serialize)]
struct ManifestEntry {
    path: String,
    media_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    title: String,
    is_front: bool,
}

#[derive(Debug, Serialize)]
struct ManifestAlias {
    path: String,
    target: String,
}

#[derive(Debug, Serialize)]
struct Manifest {
    entries: Vec<ManifestEntry>,
    aliases: Vec<ManifestAlias>,
}

pub struct DirSink {
    root: PathBuf,
    manifest: Manifest,
}

impl DirSink {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("cannot create output directory {}", root.display()))?;
        Ok(Self {
            root,
            manifest: Manifest {
                entries: Vec::new(),
                aliases: Vec::new(),
            },
        })
    }

    /// Map a canonical path onto a file below the output root. Dot-dot
    /// segments would escape the tree and are refused.
    fn file_for(&self, path: &ZimPath) -> Result<PathBuf> {
        let mut file = self.root.clone();
        for segment in path.value().split('/') {
            if segment == ".." {
                bail!("refusing to write outside the output tree: {path}");
            }
            file.push(segment);
        }
        // A trailing slash names a directory; store its listing page inside.
        if path.value().ends_with('/') {
            file.push("index");
        }
        Ok(file)
    }
}

impl EntrySink for DirSink {
    fn add_entry(
        &mut self,
        path: &ZimPath,
        media_type: &str,
        title: &str,
        content: &[u8],
        is_front: bool,
    ) -> Result<()> {
        let file = self.file_for(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        fs::write(&file, content).with_context(|| format!("cannot write {}", file.display()))?;
        self.manifest.entries.push(ManifestEntry {
            path: path.value().to_string(),
            media_type: media_type.to_string(),
            title: title.to_string(),
            is_front,
        });
        Ok(())
    }

    fn add_alias(&mut self, path: &ZimPath, target: &ZimPath) -> Result<()> {
        self.manifest.aliases.push(ManifestAlias {
            path: path.value().to_string(),
            target: target.value().to_string(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let manifest_path = self.root.join("manifest.json");
        let json = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(&manifest_path, json)
            .with_context(|| format!("cannot write {}", manifest_path.display()))?;
        Ok(())
    }
}
