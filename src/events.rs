// src/events.rs

//! Index events and their handling
//!
//! The HTTP layer (or the CLI) reports what happened to the repository as
//! an `IndexEvent`. `EventPipeline::dispatch` runs the built-in handling
//! first and then every subscribed handler with the event and its outcome.
//! Handlers run on the dispatching thread, in subscription order.

use crate::archive::{self, Archive};
use crate::catalog::CatalogEntry;
use crate::error::Result;
use crate::leaf::LeafVersion;
use crate::packages::{PackageInfo, check_package_name};
use crate::reconcile::{Reconciler, Registered};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Something that happened to the repository
#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// An archive was uploaded; name and version, when known, override
    /// what is read from the file
    ArchiveAdded {
        path: PathBuf,
        name: Option<String>,
        version: Option<String>,
    },
    /// An archive was deleted from the root
    ArchiveRemoved { path: PathBuf },
    /// Catalogue and re-list a set of archives, or the whole root when
    /// `pending` is `None`
    BulkUpdateRequested {
        catalog_path: PathBuf,
        pending: Option<Vec<Archive>>,
    },
}

impl IndexEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            IndexEvent::ArchiveAdded { .. } => "archive_added",
            IndexEvent::ArchiveRemoved { .. } => "archive_removed",
            IndexEvent::BulkUpdateRequested { .. } => "bulk_update_requested",
        }
    }
}

/// What the built-in handling of an event did
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Added {
        /// `None` when the archive was quarantined
        registered: Option<Registered>,
        /// Page or document of the leaf that now lists the archive
        leaf: Option<PathBuf>,
    },
    Removed {
        forgotten: Vec<CatalogEntry>,
        touched_leaves: Vec<String>,
    },
    BulkUpdated {
        touched_leaves: Vec<String>,
        processed: Vec<PathBuf>,
        root_written: Option<PathBuf>,
    },
}

type Handler = Box<dyn Fn(&IndexEvent, &EventOutcome) + Send + Sync>;

pub struct EventPipeline {
    reconciler: Arc<Reconciler>,
    handlers: RwLock<Vec<Handler>>,
}

impl EventPipeline {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler called after every successfully handled event
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&IndexEvent, &EventOutcome) + Send + Sync + 'static,
    {
        self.handlers.write().push(Box::new(handler));
    }

    /// Handle `event` and notify subscribers
    pub fn dispatch(&self, event: IndexEvent) -> Result<EventOutcome> {
        debug!("Dispatching {}", event.kind());

        let outcome = match &event {
            IndexEvent::ArchiveAdded {
                path,
                name,
                version,
            } => self.archive_added(path, name.as_deref(), version.as_deref())?,
            IndexEvent::ArchiveRemoved { path } => self.archive_removed(path)?,
            IndexEvent::BulkUpdateRequested {
                catalog_path,
                pending,
            } => self.bulk_update(catalog_path, pending.as_deref())?,
        };

        for handler in self.handlers.read().iter() {
            handler(&event, &outcome);
        }
        Ok(outcome)
    }

    fn archive_added(
        &self,
        path: &Path,
        name: Option<&str>,
        version: Option<&str>,
    ) -> Result<EventOutcome> {
        let Some(registered) = self.reconciler.register(path)? else {
            return Ok(EventOutcome::Added {
                registered: None,
                leaf: None,
            });
        };

        let info = PackageInfo::new(
            name.unwrap_or(&registered.metadata.name),
            version.unwrap_or(&registered.metadata.version),
        );
        check_package_name(&info.name)?;
        let leaves = self.reconciler.leaves();

        let leaf = if leaves.exists(&info.name) {
            leaves.append_version(&registered.archive, &info)?;
            leaves.page_path(&info.name)
        } else {
            let known = LeafVersion {
                info: info.clone(),
                archive: registered.archive.clone(),
            };
            let page = leaves.regenerate_leaf(
                &info.name,
                self.reconciler.extractor(),
                std::slice::from_ref(&known),
            )?;
            // a new leaf needs a link on the root page
            if self.reconciler.write_html() {
                self.reconciler.regenerate_root()?;
            }
            page
        };

        info!("Added {} to leaf {}", registered.archive.filename, info.name);
        Ok(EventOutcome::Added {
            registered: Some(registered),
            leaf: Some(leaf),
        })
    }

    fn archive_removed(&self, path: &Path) -> Result<EventOutcome> {
        if path.exists() {
            debug!("{} is still on disk, nothing to remove", path.display());
            return Ok(EventOutcome::Removed {
                forgotten: Vec::new(),
                touched_leaves: Vec::new(),
            });
        }

        let filename = archive::file_name_of(path)?;
        let forgotten = self.reconciler.catalog().forget_filename(&filename)?;

        let leaves = self.reconciler.leaves();
        let names: BTreeSet<&str> = forgotten.iter().map(|e| e.metadata.name.as_str()).collect();
        let mut touched_leaves = Vec::new();
        for name in names {
            if !leaves.exists(name) {
                continue;
            }
            let dropped = leaves.cleanup_leaf_data(&leaves.leaf_dir(name))?;
            if !dropped.is_empty() {
                touched_leaves.push(name.to_string());
            }
        }

        if self.reconciler.write_html() && !touched_leaves.is_empty() {
            self.reconciler.regenerate_root()?;
        }

        info!(
            "Removed {}: {} catalog entries, {} leaves cleaned",
            filename,
            forgotten.len(),
            touched_leaves.len()
        );
        Ok(EventOutcome::Removed {
            forgotten,
            touched_leaves,
        })
    }

    fn bulk_update(
        &self,
        catalog_path: &Path,
        pending: Option<&[Archive]>,
    ) -> Result<EventOutcome> {
        let scanned;
        let archives = match pending {
            Some(archives) => archives,
            None => {
                scanned = self.reconciler.scan_archives()?;
                &scanned[..]
            }
        };

        let own = self.reconciler.catalog();
        let other;
        let catalog = if catalog_path == own.path() {
            own
        } else {
            other = own.at(catalog_path);
            &other
        };

        let new_entries =
            catalog.rebuild(archives, self.reconciler.extractor(), self.reconciler.workers())?;
        let touched_leaves = self.reconciler.regenerate_leaves(&new_entries, archives)?;

        let root_written = if self.reconciler.write_html() {
            Some(self.reconciler.regenerate_root()?)
        } else {
            None
        };

        let paths: HashMap<&str, &PathBuf> =
            archives.iter().map(|a| (a.md5.as_str(), &a.path)).collect();
        let processed = new_entries
            .iter()
            .filter_map(|e| paths.get(e.md5.as_str()).map(|p| (*p).clone()))
            .collect();

        Ok(EventOutcome::BulkUpdated {
            touched_leaves,
            processed,
            root_written,
        })
    }
}
