// src/reconcile.rs

//! Bringing the catalog and leaves in line with the archives on disk
//!
//! Two paths lead into the index:
//! - `register`: one archive, catalogued immediately
//! - `bulk_reconcile`: scan the whole root, catalogue whatever is new,
//!   rebuild the leaves that gained versions and refresh the root page
//!
//! Both are idempotent. Running `bulk_reconcile` twice over an unchanged
//! root adds nothing the second time.

use crate::archive::{self, Archive};
use crate::catalog::{CatalogEntry, MasterCatalog, PackageMetadata};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::leaf::{LeafIndex, LeafVersion};
use crate::packages::{MetadataExtractor, PackageInfo};
use crate::pool::{self, WorkerPool};
use crate::root::RootIndex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of registering one archive
#[derive(Debug, Clone, PartialEq)]
pub struct Registered {
    pub md5: String,
    pub metadata: PackageMetadata,
    pub archive: Archive,
    /// False when the content hash was already in the catalog
    pub is_new: bool,
}

/// What a bulk reconciliation did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Archives found in the root
    pub scanned: usize,
    /// Catalog entries added by this run
    pub new_entries: Vec<CatalogEntry>,
    /// Leaves rebuilt, sorted by name
    pub touched_leaves: Vec<String>,
    /// Root page, when it was rewritten
    pub root_written: Option<PathBuf>,
}

/// Catalog, leaves and root page of one repository, plus the workers
/// that feed them
#[derive(Clone)]
pub struct Reconciler {
    root: PathBuf,
    write_html: bool,
    catalog: Arc<MasterCatalog>,
    leaves: Arc<LeafIndex>,
    root_index: Arc<RootIndex>,
    extractor: MetadataExtractor,
    workers: Arc<dyn WorkerPool>,
}

impl Reconciler {
    pub fn new(
        config: &Config,
        catalog: Arc<MasterCatalog>,
        leaves: Arc<LeafIndex>,
        root_index: Arc<RootIndex>,
        extractor: MetadataExtractor,
        workers: Arc<dyn WorkerPool>,
    ) -> Self {
        Self {
            root: config.repository_root.clone(),
            write_html: config.write_html,
            catalog,
            leaves,
            root_index,
            extractor,
            workers,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn write_html(&self) -> bool {
        self.write_html
    }

    pub fn catalog(&self) -> &MasterCatalog {
        &self.catalog
    }

    pub fn leaves(&self) -> &LeafIndex {
        &self.leaves
    }

    pub fn root_index(&self) -> &RootIndex {
        &self.root_index
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    pub fn workers(&self) -> &dyn WorkerPool {
        self.workers.as_ref()
    }

    /// Catalogue a single archive
    ///
    /// Content already in the catalog is returned as stored. Unreadable
    /// archives are quarantined and yield `None`.
    pub fn register(&self, path: &Path) -> Result<Option<Registered>> {
        let archive = Archive::open(path)?;

        if let Some(metadata) = self.catalog.get(&archive.md5)? {
            debug!("{} already catalogued as {}", archive.filename, archive.md5);
            return Ok(Some(Registered {
                md5: archive.md5.clone(),
                metadata,
                archive,
                is_new: false,
            }));
        }

        let Some(info) = self.extractor.extract(path) else {
            return Ok(None);
        };

        let entry = self.catalog.entry_for(&archive, info);
        self.catalog.merge_and_persist(std::slice::from_ref(&entry))?;
        info!(
            "Registered {} as {} {}",
            archive.filename, entry.metadata.name, entry.metadata.version
        );

        Ok(Some(Registered {
            md5: entry.md5,
            metadata: entry.metadata,
            archive,
            is_new: true,
        }))
    }

    /// Hash every classifiable archive in the root
    ///
    /// Files that disappear before they are hashed are skipped.
    pub fn scan_archives(&self) -> Result<Vec<Archive>> {
        let paths = archive::archive_paths(&self.root)?;
        let opened = pool::map(self.workers(), paths, |path| Archive::open(&path))?;

        let mut archives = Vec::with_capacity(opened.len());
        for result in opened {
            match result {
                Ok(archive) => archives.push(archive),
                Err(Error::MissingFile(path)) => {
                    warn!("{} vanished during scan, skipping", path);
                }
                Err(e) => return Err(e),
            }
        }
        debug!("Scanned {} archives in {}", archives.len(), self.root.display());
        Ok(archives)
    }

    /// Rebuild the leaf of every package named in `entries`
    ///
    /// Each entry whose archive is among `archives` is listed in its leaf
    /// even when the filename does not start with the package name.
    /// Returns the rebuilt names, sorted.
    pub fn regenerate_leaves(
        &self,
        entries: &[CatalogEntry],
        archives: &[Archive],
    ) -> Result<Vec<String>> {
        let by_md5: HashMap<&str, &Archive> =
            archives.iter().map(|a| (a.md5.as_str(), a)).collect();

        let mut known: BTreeMap<&str, Vec<LeafVersion>> = BTreeMap::new();
        for entry in entries {
            let versions = known.entry(entry.metadata.name.as_str()).or_default();
            if let Some(archive) = by_md5.get(entry.md5.as_str()) {
                versions.push(LeafVersion {
                    info: PackageInfo::new(&entry.metadata.name, &entry.metadata.version),
                    archive: (*archive).clone(),
                });
            }
        }

        let mut touched = Vec::with_capacity(known.len());
        for (name, versions) in known {
            self.leaves.regenerate_leaf(name, &self.extractor, &versions)?;
            touched.push(name.to_string());
        }
        Ok(touched)
    }

    /// Catalogue everything new in the root and refresh what it affects
    pub fn bulk_reconcile(&self) -> Result<ReconcileReport> {
        info!("Reconciling {}", self.root.display());

        let archives = self.scan_archives()?;
        let new_entries = self
            .catalog
            .rebuild(&archives, &self.extractor, self.workers())?;
        let touched_leaves = self.regenerate_leaves(&new_entries, &archives)?;

        let root_written = if self.write_html
            && (!self.root_index.exists() || !touched_leaves.is_empty())
        {
            Some(self.regenerate_root()?)
        } else {
            None
        };

        info!(
            "Reconciled {} archives: {} new, {} leaves rebuilt",
            archives.len(),
            new_entries.len(),
            touched_leaves.len()
        );
        Ok(ReconcileReport {
            scanned: archives.len(),
            new_entries,
            touched_leaves,
            root_written,
        })
    }

    /// Rewrite the root page from a full scan of the root
    pub fn regenerate_root(&self) -> Result<PathBuf> {
        let names = self
            .root_index
            .projects_from_archives(&self.extractor, self.workers())?;
        self.root_index.write(names)
    }
}
