// src/leaf/links.rs

//! Symlink farm maintenance for leaves in link-farm mode
//!
//! Each leaf directory holds one symlink per archive, named after the
//! archive and pointing at `../<archive>` in the repository root. The
//! filesystem is the source of truth: a link whose target is gone is
//! broken and gets removed along with its record.
//!
//! Callers hold the leaf lock.

use crate::error::Result;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Links removed by a cleanup pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkCleanup {
    /// Links with no matching entry in the active set
    pub orphans: Vec<String>,
    /// Links whose target archive no longer exists
    pub broken: Vec<String>,
}

impl LinkCleanup {
    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty() && self.broken.is_empty()
    }
}

/// Remove orphan and broken links from `leaf_dir`
pub(crate) fn prune_links(leaf_dir: &Path, active: &HashSet<String>) -> Result<LinkCleanup> {
    let mut cleanup = LinkCleanup::default();

    let entries = match fs::read_dir(leaf_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(cleanup),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_symlink() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let link = entry.path();

        if !active.contains(&name) {
            fs::remove_file(&link)?;
            debug!("Removed orphan link {}", link.display());
            cleanup.orphans.push(name);
        } else if !link.exists() {
            fs::remove_file(&link)?;
            debug!("Removed broken link {}", link.display());
            cleanup.broken.push(name);
        }
    }

    if !cleanup.is_empty() {
        info!(
            "Pruned {} orphan and {} broken links in {}",
            cleanup.orphans.len(),
            cleanup.broken.len(),
            leaf_dir.display()
        );
    }
    Ok(cleanup)
}

/// Create links in `leaf_dir` for archives in `root` that lack one
///
/// `leaf_dir` must be a direct child of `root`; links are relative so the
/// tree can be moved. Archives that are not on disk get no link. Returns
/// the number of links created.
pub(crate) fn create_links<'a, I>(leaf_dir: &Path, root: &Path, filenames: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut created = 0;
    for filename in filenames {
        let link = leaf_dir.join(filename);
        if fs::symlink_metadata(&link).is_ok() {
            continue;
        }
        let archive = root.join(filename);
        if !archive.exists() {
            debug!("Not linking missing archive {}", archive.display());
            continue;
        }
        symlink(&Path::new("..").join(filename), &link)?;
        created += 1;
    }
    Ok(created)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
