// src/index.rs

//! `PackageIndex`: one repository root and everything that indexes it
//!
//! This is the surface the serving layer talks to. It owns the catalog,
//! the leaf and root listings, the worker pool and the event pipeline,
//! and turns calls into events so subscribers see every change.

use crate::catalog::{MasterCatalog, PackageMetadata};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{EventOutcome, EventPipeline, IndexEvent};
use crate::leaf::{LeafIndex, LeafRecord};
use crate::packages::{ArchiveMetadataReader, MetadataExtractor, PackageMetadataReader};
use crate::pool::{RayonPool, WorkerPool};
use crate::quarantine::Quarantine;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::render::{HandlebarsRenderer, TemplateRenderer};
use crate::root::RootIndex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

/// How the startup reconciliation ran
pub enum Startup {
    Completed(ReconcileReport),
    Background(JoinHandle<Result<ReconcileReport>>),
}

/// Records dropped from one leaf by `PackageIndex::cleanup`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCleanup {
    pub name: String,
    pub dropped: Vec<String>,
}

/// Builder for `PackageIndex`; every collaborator has a default
pub struct PackageIndexBuilder {
    config: Config,
    reader: Option<Arc<dyn PackageMetadataReader>>,
    pool: Option<Arc<dyn WorkerPool>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PackageIndexBuilder {
    pub fn with_reader(mut self, reader: Arc<dyn PackageMetadataReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<PackageIndex> {
        let config = self.config;
        config.validate()?;

        let root = &config.repository_root;
        if !root.is_dir() {
            return Err(Error::InitError(format!(
                "Repository root {} is not a directory",
                root.display()
            )));
        }

        let renderer: Arc<dyn TemplateRenderer> = match self.renderer {
            Some(renderer) => renderer,
            None => Arc::new(HandlebarsRenderer::new()?),
        };
        let pool: Arc<dyn WorkerPool> = match self.pool {
            Some(pool) => pool,
            None => Arc::new(RayonPool::new(config.worker_count())?),
        };
        let reader: Arc<dyn PackageMetadataReader> = match self.reader {
            Some(reader) => reader,
            None => Arc::new(ArchiveMetadataReader),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let quarantine =
            Quarantine::new(root, &config.error_folder_name).with_clock(clock.clone());
        let extractor = MetadataExtractor::new(reader, quarantine);
        let reconciler = Arc::new(Reconciler::new(
            &config,
            Arc::new(MasterCatalog::new(config.catalog_path(), clock)),
            Arc::new(LeafIndex::new(&config, renderer.clone())),
            Arc::new(RootIndex::new(&config, renderer)),
            extractor,
            pool,
        ));

        info!(
            "Opened package index at {} ({} mode, {} workers)",
            root.display(),
            if config.write_html { "html" } else { "link-farm" },
            reconciler.workers().parallelism()
        );
        Ok(PackageIndex {
            events: EventPipeline::new(reconciler.clone()),
            reconciler,
            config,
        })
    }
}

pub struct PackageIndex {
    config: Config,
    reconciler: Arc<Reconciler>,
    events: EventPipeline,
}

impl PackageIndex {
    pub fn builder(config: Config) -> PackageIndexBuilder {
        PackageIndexBuilder {
            config,
            reader: None,
            pool: None,
            renderer: None,
            clock: None,
        }
    }

    /// Open with the default collaborators
    pub fn open(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn events(&self) -> &EventPipeline {
        &self.events
    }

    /// Names of every package with a leaf, sorted
    pub fn list_packages(&self) -> Result<Vec<String>> {
        self.reconciler.root_index().list_packages()
    }

    /// Records of one package, or `None` when it has no leaf
    pub fn get_leaf(&self, name: &str) -> Result<Option<Vec<LeafRecord>>> {
        let leaves = self.reconciler.leaves();
        if !leaves.exists(name) {
            return Ok(None);
        }
        leaves.read(name).map(Some)
    }

    /// Catalogue an archive and list it in its leaf
    ///
    /// Returns the stored metadata and content hash, or `None` when the
    /// archive was quarantined.
    pub fn register_archive(&self, path: &Path) -> Result<Option<(PackageMetadata, String)>> {
        let outcome = self.events.dispatch(IndexEvent::ArchiveAdded {
            path: path.to_path_buf(),
            name: None,
            version: None,
        })?;

        match outcome {
            EventOutcome::Added {
                registered: Some(registered),
                ..
            } => Ok(Some((registered.metadata, registered.md5))),
            _ => Ok(None),
        }
    }

    /// Catalogue and re-list everything in the root
    pub fn trigger_bulk_update(&self) -> Result<EventOutcome> {
        self.events.dispatch(IndexEvent::BulkUpdateRequested {
            catalog_path: self.config.catalog_path(),
            pending: None,
        })
    }

    /// Forget an archive that was deleted from the root
    pub fn archive_removed(&self, path: &Path) -> Result<EventOutcome> {
        self.events.dispatch(IndexEvent::ArchiveRemoved {
            path: path.to_path_buf(),
        })
    }

    pub fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconciler.bulk_reconcile()
    }

    /// Drop records, links and catalog entries of archives that vanished
    pub fn cleanup(&self) -> Result<Vec<LeafCleanup>> {
        let leaves = self.reconciler.leaves();
        let mut report = Vec::new();

        for name in self.list_packages()? {
            let leaf_dir = leaves.leaf_dir(&name);
            let mut dropped = Vec::new();

            if !self.config.write_html {
                let active: HashSet<String> =
                    leaves.read(&name)?.into_iter().map(|r| r.filename).collect();
                dropped.extend(leaves.cleanup_links(&leaf_dir, &active)?.broken);
            }
            dropped.extend(leaves.cleanup_leaf_data(&leaf_dir)?);

            for filename in &dropped {
                self.reconciler.catalog().forget_filename(filename)?;
            }
            if !dropped.is_empty() {
                report.push(LeafCleanup { name, dropped });
            }
        }

        if self.config.write_html && !report.is_empty() {
            self.reconciler.regenerate_root()?;
        }
        Ok(report)
    }

    /// Run the startup reconciliation
    ///
    /// With `async_startup_reconcile` it runs on a background thread and
    /// the handle is returned at once.
    pub fn startup(&self) -> Result<Startup> {
        if !self.config.async_startup_reconcile {
            return self.reconciler.bulk_reconcile().map(Startup::Completed);
        }

        let reconciler = self.reconciler.clone();
        let handle = std::thread::Builder::new()
            .name("prism-startup".to_string())
            .spawn(move || {
                let result = reconciler.bulk_reconcile();
                if let Err(e) = &result {
                    error!("Startup reconciliation failed: {}", e);
                }
                result
            })
            .map_err(|e| Error::InitError(format!("Failed to spawn startup thread: {}", e)))?;

        info!("Startup reconciliation running in the background");
        Ok(Startup::Background(handle))
    }

    pub fn root(&self) -> &Path {
        &self.config.repository_root
    }
}
