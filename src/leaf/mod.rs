// src/leaf/mod.rs

//! Per-package leaves
//!
//! A leaf is the version listing for one package name: an ordered list of
//! `LeafRecord`s persisted at `<root>/<name>/index.json`, plus either a
//! rendered `index.html` or, in link-farm mode, one symlink per archive.
//!
//! Every leaf has its own lock. Locks live in a `DashMap` keyed by leaf
//! name; the entry API makes get-or-create atomic, so two threads asking
//! for the same name always get the same mutex. Locks are created on
//! first use and kept for the life of the index.
//!
//! Records are appended, never sorted: order is discovery order.

pub mod links;

pub use links::LinkCleanup;

use crate::archive::{self, Archive};
use crate::config::{Config, INDEX_DATA, INDEX_PAGE};
use crate::document;
use crate::error::{Error, Result};
use crate::packages::{MetadataExtractor, PackageInfo};
use crate::render::{LEAF_TEMPLATE, TemplateRenderer, join_url};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One archive in a leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub filename: String,
    pub md5: String,
    pub size: u64,
    pub name: String,
    pub version: String,
    pub mtime: f64,
    pub ctime: f64,
    pub atime: f64,
}

impl LeafRecord {
    pub fn new(archive: &Archive, info: &PackageInfo) -> Self {
        Self {
            filename: archive.filename.clone(),
            md5: archive.md5.clone(),
            size: archive.size,
            name: info.name.clone(),
            version: info.version.clone(),
            mtime: archive.mtime,
            ctime: archive.ctime,
            atime: archive.atime,
        }
    }
}

/// An archive and the metadata read from it, ready to be listed
#[derive(Debug, Clone)]
pub struct LeafVersion {
    pub info: PackageInfo,
    pub archive: Archive,
}

/// Leaf document loaded under its lock
///
/// The document is written back when the guard is persisted or, failing
/// that, when it is dropped, so a mutation that bails out halfway still
/// lands on disk.
struct LeafData {
    path: PathBuf,
    records: Vec<LeafRecord>,
    persisted: bool,
}

impl LeafData {
    fn load(path: PathBuf) -> Result<Self> {
        let records = document::read_json_or_default(&path)?;
        Ok(Self {
            path,
            records,
            persisted: false,
        })
    }

    fn persist(mut self) -> Result<()> {
        self.persisted = true;
        document::write_json(&self.path, &self.records)
    }
}

impl Drop for LeafData {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        if let Err(e) = document::write_json(&self.path, &self.records) {
            error!("Failed to persist {}: {}", self.path.display(), e);
        }
    }
}

/// All leaves under one repository root
pub struct LeafIndex {
    root: PathBuf,
    write_html: bool,
    archive_url_base: String,
    title: String,
    renderer: Arc<dyn TemplateRenderer>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LeafIndex {
    pub fn new(config: &Config, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            root: config.repository_root.clone(),
            write_html: config.write_html,
            archive_url_base: config.archive_url_base.clone(),
            title: config.title.clone(),
            renderer,
            locks: DashMap::new(),
        }
    }

    pub fn leaf_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Page serving a leaf: `index.html`, or the JSON document in link-farm
    /// mode
    pub fn page_path(&self, name: &str) -> PathBuf {
        let file = if self.write_html { INDEX_PAGE } else { INDEX_DATA };
        self.leaf_dir(name).join(file)
    }

    /// Whether the leaf directory for `name` exists
    pub fn exists(&self, name: &str) -> bool {
        self.leaf_dir(name).is_dir()
    }

    /// Records of a leaf; an absent leaf has none
    pub fn read(&self, name: &str) -> Result<Vec<LeafRecord>> {
        document::read_json_or_default(&self.leaf_dir(name).join(INDEX_DATA))
    }

    /// Lock for a leaf name, created on first use
    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks.entry(name.to_string()).or_default().clone()
    }

    /// Run `mutate` on a leaf's records under its lock
    ///
    /// The document is written back whatever `mutate` returns, and also if
    /// it panics.
    fn with_leaf_data<R, F>(&self, leaf_dir: &Path, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<LeafRecord>) -> Result<R>,
    {
        let name = leaf_name(leaf_dir)?;
        if leaf_dir.parent() != Some(self.root.as_path()) {
            return Err(Error::InvalidPath(format!(
                "{} is not a leaf of {}",
                leaf_dir.display(),
                self.root.display()
            )));
        }
        let lock = self.lock_for(name);
        let _guard = lock.lock();

        fs::create_dir_all(leaf_dir)?;
        let mut data = LeafData::load(leaf_dir.join(INDEX_DATA))?;
        let result = mutate(&mut data.records);
        data.persist()?;
        result
    }

    /// Append one archive to its package's leaf
    ///
    /// An archive whose filename is already listed is left alone. Returns
    /// whether a record was added.
    pub fn append_version(&self, archive: &Archive, info: &PackageInfo) -> Result<bool> {
        let leaf_dir = self.leaf_dir(&info.name);

        self.with_leaf_data(&leaf_dir, |records| {
            if records.iter().any(|r| r.filename == archive.filename) {
                warn!(
                    "Duplicate archive {} in leaf {}, skipping",
                    archive.filename, info.name
                );
                return Ok(false);
            }

            records.push(LeafRecord::new(archive, info));
            self.refresh_view(&leaf_dir, records)?;
            debug!("Appended {} to leaf {}", archive.filename, info.name);
            Ok(true)
        })
    }

    /// Rebuild a leaf from the archives on disk
    ///
    /// Every file in the root named `<name>-*` (or `<escaped_name>-*`, the
    /// wheel spelling of the name) is read; unreadable files are
    /// quarantined and files that turn out to belong to another package
    /// are skipped. `known` versions are listed even when their filename
    /// does not match, so an archive catalogued under this name always
    /// lands in the leaf.
    pub fn regenerate_leaf(
        &self,
        name: &str,
        extractor: &MetadataExtractor,
        known: &[LeafVersion],
    ) -> Result<PathBuf> {
        let prefixes = [format!("{}-", name), format!("{}-", wheel_escape(name))];
        let mut versions: Vec<LeafVersion> = Vec::new();

        for path in archive::list_files(&self.root)? {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| prefixes.iter().any(|p| n.starts_with(p.as_str())));
            if !matches {
                continue;
            }

            let Some(info) = extractor.extract(&path) else {
                continue;
            };
            if info.name != name {
                debug!("{} belongs to {}, not {}", path.display(), info.name, name);
                continue;
            }

            match Archive::open(&path) {
                Ok(archive) => versions.push(LeafVersion { info, archive }),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        for version in known {
            if !versions
                .iter()
                .any(|v| v.archive.filename == version.archive.filename)
            {
                versions.push(version.clone());
            }
        }

        info!("Regenerating leaf {} with {} versions", name, versions.len());
        self.write_leaf(&self.leaf_dir(name), &versions)
    }

    /// Replace a leaf's records with `versions` and rebuild its view
    ///
    /// Returns the page that serves the leaf.
    pub fn write_leaf(&self, leaf_dir: &Path, versions: &[LeafVersion]) -> Result<PathBuf> {
        let fresh: Vec<LeafRecord> = versions
            .iter()
            .map(|v| LeafRecord::new(&v.archive, &v.info))
            .collect();

        self.with_leaf_data(leaf_dir, |records| {
            *records = fresh;
            self.refresh_view(leaf_dir, records)
        })?;

        Ok(self.page_path(leaf_name(leaf_dir)?))
    }

    /// Remove orphan and broken links; broken links also lose their record
    pub fn cleanup_links(&self, leaf_dir: &Path, active: &HashSet<String>) -> Result<LinkCleanup> {
        self.with_leaf_data(leaf_dir, |records| {
            let cleanup = links::prune_links(leaf_dir, active)?;
            if !cleanup.broken.is_empty() {
                records.retain(|r| !cleanup.broken.contains(&r.filename));
            }
            Ok(cleanup)
        })
    }

    /// Drop records whose archive is no longer in the root
    ///
    /// Returns the filenames that were dropped.
    pub fn cleanup_leaf_data(&self, leaf_dir: &Path) -> Result<Vec<String>> {
        self.with_leaf_data(leaf_dir, |records| {
            let (kept, dropped): (Vec<LeafRecord>, Vec<LeafRecord>) = records
                .drain(..)
                .partition(|r| self.root.join(&r.filename).is_file());
            *records = kept;

            if dropped.is_empty() {
                return Ok(Vec::new());
            }

            let dropped: Vec<String> = dropped.into_iter().map(|r| r.filename).collect();
            info!(
                "Dropped {} records for missing archives from {}",
                dropped.len(),
                leaf_dir.display()
            );
            self.refresh_view(leaf_dir, records)?;
            Ok(dropped)
        })
    }

    /// Bring the HTML page or link farm in line with `records`
    fn refresh_view(&self, leaf_dir: &Path, records: &mut Vec<LeafRecord>) -> Result<()> {
        if self.write_html {
            return self.render_page(leaf_dir, records);
        }

        let active: HashSet<String> = records.iter().map(|r| r.filename.clone()).collect();
        let cleanup = links::prune_links(leaf_dir, &active)?;
        records.retain(|r| !cleanup.broken.contains(&r.filename));
        links::create_links(
            leaf_dir,
            &self.root,
            records.iter().map(|r| r.filename.as_str()),
        )?;
        Ok(())
    }

    fn render_page(&self, leaf_dir: &Path, records: &[LeafRecord]) -> Result<()> {
        let name = leaf_name(leaf_dir)?;
        let versions: Vec<_> = records
            .iter()
            .map(|r| {
                json!({
                    "url": join_url(&self.archive_url_base, &r.filename),
                    "name": r.filename,
                })
            })
            .collect();

        let html = self.renderer.render(
            LEAF_TEMPLATE,
            &json!({
                "title": format!("{}: {}", self.title, name),
                "package_title": name,
                "versions": versions,
            }),
        )?;
        document::write_text(&leaf_dir.join(INDEX_PAGE), &html)
    }
}

/// Wheel filenames spell `-` and `.` in the project name as `_`
fn wheel_escape(name: &str) -> String {
    name.replace(['-', '.'], "_")
}

fn leaf_name(leaf_dir: &Path) -> Result<&str> {
    leaf_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(leaf_dir.display().to_string()))
}
