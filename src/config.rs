// src/config.rs

//! Indexer configuration
//!
//! Every field has a default, so a config file only needs the keys it
//! changes. Files are JSON:
//!
//! ```json
//! { "repository_root": "/srv/index", "write_html": false, "workers": 8 }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Catalog and leaf document file name
pub const INDEX_DATA: &str = "index.json";

/// Rendered page file name (root and leaves)
pub const INDEX_PAGE: &str = "index.html";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the archives and all derived documents
    pub repository_root: PathBuf,

    /// Prefix for package links on the root page
    pub url_base: String,

    /// Prefix for archive links on leaf pages
    pub archive_url_base: String,

    /// Render HTML pages; when false, leaves are symlink farms
    pub write_html: bool,

    /// Quarantine folder name, relative to the repository root
    pub error_folder_name: String,

    /// Run the startup reconciliation on a background thread
    pub async_startup_reconcile: bool,

    /// Page title
    pub title: String,

    /// Worker threads for extraction; defaults to available parallelism
    pub workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository_root: PathBuf::from("."),
            url_base: "..".to_string(),
            archive_url_base: "/index/".to_string(),
            write_html: true,
            error_folder_name: "_errors".to_string(),
            async_startup_reconcile: false,
            title: "Package Index".to_string(),
            workers: None,
        }
    }
}

impl Config {
    /// Defaults rooted at `repository_root`
    pub fn new(repository_root: impl Into<PathBuf>) -> Self {
        Self {
            repository_root: repository_root.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the indexer cannot work with
    pub fn validate(&self) -> Result<()> {
        let folder = self.error_folder_name.as_str();
        if folder.is_empty() || folder.contains('/') || folder == "." || folder == ".." {
            return Err(Error::ConfigError(format!(
                "error_folder_name must be a plain directory name, got {:?}",
                folder
            )));
        }
        if self.workers == Some(0) {
            return Err(Error::ConfigError("workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Path of the master catalog document
    pub fn catalog_path(&self) -> PathBuf {
        self.repository_root.join(INDEX_DATA)
    }
}
