// src/catalog.rs

//! Master catalog: content hash -> package metadata
//!
//! The catalog is one JSON document at `<root>/index.json` mapping each
//! archive's MD5 to `{name, version, filename, added}`. A hash that is
//! missing means the archive has not been processed; quarantined archives
//! never get an entry.
//!
//! All writes go through `merge_and_persist`, which holds a single lock
//! for the reload-merge-rewrite cycle. Entries are keyed by content hash,
//! so merges commute and batches may land in any order.

use crate::archive::Archive;
use crate::clock::Clock;
use crate::document;
use crate::error::Result;
use crate::packages::{MetadataExtractor, PackageInfo};
use crate::pool::{self, WorkerPool};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Catalog value for one archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub filename: String,
    /// Seconds since the Unix epoch when the entry was created
    pub added: f64,
}

/// A catalog entry together with its key
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub md5: String,
    pub metadata: PackageMetadata,
}

/// On-disk catalog document
pub type CatalogDocument = BTreeMap<String, PackageMetadata>;

/// Batch size for a rebuild over `candidates` archives
///
/// Large rebuilds are split so the catalog lock is never held for long
/// and progress is persisted as it is made.
pub fn batch_size(candidates: usize) -> usize {
    if candidates > 1000 {
        100
    } else if candidates > 100 {
        10
    } else {
        candidates.max(1)
    }
}

pub struct MasterCatalog {
    path: PathBuf,
    lock: Mutex<()>,
    lock_acquisitions: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl MasterCatalog {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            lock_acquisitions: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A catalog at another path sharing this one's clock
    pub fn at(&self, path: impl Into<PathBuf>) -> Self {
        Self::new(path, self.clock.clone())
    }

    /// Read the catalog; a missing document is an empty catalog
    pub fn load(&self) -> Result<CatalogDocument> {
        document::read_json_or_default(&self.path)
    }

    /// Metadata stored for a content hash
    pub fn get(&self, md5: &str) -> Result<Option<PackageMetadata>> {
        Ok(self.load()?.remove(md5))
    }

    /// All entries recorded under `filename`
    pub fn find_by_filename(&self, filename: &str) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|(_, meta)| meta.filename == filename)
            .map(|(md5, metadata)| CatalogEntry { md5, metadata })
            .collect())
    }

    /// Build an entry for `archive`, stamped with the current time
    pub fn entry_for(&self, archive: &Archive, info: PackageInfo) -> CatalogEntry {
        CatalogEntry {
            md5: archive.md5.clone(),
            metadata: PackageMetadata {
                name: info.name,
                version: info.version,
                filename: archive.filename.clone(),
                added: self.clock.timestamp(),
            },
        }
    }

    /// Merge entries into the document and rewrite it under the catalog lock
    ///
    /// Returns the number of entries in the catalog afterwards. An empty
    /// batch does not touch the lock or the file.
    pub fn merge_and_persist(&self, entries: &[CatalogEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock.lock();
        self.lock_acquisitions.fetch_add(1, Ordering::SeqCst);

        let mut doc = self.load()?;
        for entry in entries {
            doc.insert(entry.md5.clone(), entry.metadata.clone());
        }
        document::write_json(&self.path, &doc)?;

        debug!(
            "Merged {} entries into {} ({} total)",
            entries.len(),
            self.path.display(),
            doc.len()
        );
        Ok(doc.len())
    }

    /// Drop every entry recorded under `filename`
    ///
    /// Used once an archive has vanished from disk. Returns the removed
    /// entries.
    pub fn forget_filename(&self, filename: &str) -> Result<Vec<CatalogEntry>> {
        let _guard = self.lock.lock();
        self.lock_acquisitions.fetch_add(1, Ordering::SeqCst);

        let mut doc = self.load()?;
        let stale: Vec<String> = doc
            .iter()
            .filter(|(_, meta)| meta.filename == filename)
            .map(|(md5, _)| md5.clone())
            .collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let removed: Vec<CatalogEntry> = stale
            .into_iter()
            .filter_map(|md5| doc.remove(&md5).map(|metadata| CatalogEntry { md5, metadata }))
            .collect();
        document::write_json(&self.path, &doc)?;

        info!("Removed {} catalog entries for {}", removed.len(), filename);
        Ok(removed)
    }

    /// Catalog every archive whose hash is not in the catalog yet
    ///
    /// Extraction runs on `workers`; failures are quarantined by `extractor`
    /// and simply produce no entry. Each batch is persisted on its own.
    /// Only the newly added entries are returned.
    pub fn rebuild(
        &self,
        archives: &[Archive],
        extractor: &MetadataExtractor,
        workers: &dyn WorkerPool,
    ) -> Result<Vec<CatalogEntry>> {
        let known = self.load()?;
        let mut seen = HashSet::new();
        let candidates: Vec<&Archive> = archives
            .iter()
            .filter(|a| !known.contains_key(&a.md5))
            .filter(|a| seen.insert(a.md5.as_str()))
            .collect();

        if candidates.is_empty() {
            debug!("Catalog is up to date ({} entries)", known.len());
            return Ok(Vec::new());
        }

        let size = batch_size(candidates.len());
        let batches = candidates.len().div_ceil(size);
        info!(
            "Cataloguing {} new archives in {} batches of up to {}",
            candidates.len(),
            batches,
            size
        );

        let mut added = Vec::new();
        for (n, batch) in candidates.chunks(size).enumerate() {
            let extracted = pool::map(workers, batch.to_vec(), |archive| {
                extractor
                    .extract(&archive.path)
                    .map(|info| self.entry_for(archive, info))
            })?;

            let entries: Vec<CatalogEntry> = extracted.into_iter().flatten().collect();
            self.merge_and_persist(&entries)?;
            debug!(
                "Batch {}/{}: {} of {} archives catalogued",
                n + 1,
                batches,
                entries.len(),
                batch.len()
            );
            added.extend(entries);
        }

        info!("Catalogued {} new archives", added.len());
        Ok(added)
    }

    /// Number of times the catalog lock has been taken for a write
    pub fn lock_acquisitions(&self) -> usize {
        self.lock_acquisitions.load(Ordering::SeqCst)
    }
}
