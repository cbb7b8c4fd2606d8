// src/root.rs

//! Root listing: every package in the repository, sorted by name

use crate::archive;
use crate::config::{Config, INDEX_DATA, INDEX_PAGE};
use crate::document;
use crate::error::Result;
use crate::packages::MetadataExtractor;
use crate::pool::{self, WorkerPool};
use crate::render::{ROOT_TEMPLATE, TemplateRenderer, join_url};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// One link on the root page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootEntry {
    pub name: String,
    pub url: String,
}

pub struct RootIndex {
    root: PathBuf,
    url_base: String,
    title: String,
    error_folder_name: String,
    renderer: Arc<dyn TemplateRenderer>,
}

impl RootIndex {
    pub fn new(config: &Config, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            root: config.repository_root.clone(),
            url_base: config.url_base.clone(),
            title: config.title.clone(),
            error_folder_name: config.error_folder_name.clone(),
            renderer,
        }
    }

    pub fn page_path(&self) -> PathBuf {
        self.root.join(INDEX_PAGE)
    }

    /// Whether the root page has been written
    pub fn exists(&self) -> bool {
        self.page_path().is_file()
    }

    /// Sorted, de-duplicated entries for `names`
    pub fn entries<I>(&self, names: I) -> Vec<RootEntry>
    where
        I: IntoIterator<Item = String>,
    {
        names
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|name| RootEntry {
                url: join_url(&self.url_base, &name),
                name,
            })
            .collect()
    }

    /// Render and write the root page listing `names`
    pub fn write<I>(&self, names: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = String>,
    {
        let packages = self.entries(names);
        let html = self.renderer.render(
            ROOT_TEMPLATE,
            &json!({
                "title": self.title,
                "packages": packages,
            }),
        )?;

        let path = self.page_path();
        document::write_text(&path, &html)?;
        info!("Wrote root index with {} packages", packages.len());
        Ok(path)
    }

    /// Package names of every classifiable archive in the root
    ///
    /// Archives whose metadata cannot be read are quarantined.
    pub fn projects_from_archives(
        &self,
        extractor: &MetadataExtractor,
        workers: &dyn WorkerPool,
    ) -> Result<BTreeSet<String>> {
        let paths = archive::archive_paths(&self.root)?;
        let names = pool::map(workers, paths, |path| extractor.extract(&path))?;
        Ok(names.into_iter().flatten().map(|info| info.name).collect())
    }

    /// Names of all leaves that have a document, sorted
    pub fn list_packages(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name == self.error_folder_name || name.starts_with('.') {
                continue;
            }
            if entry.path().join(INDEX_DATA).is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
