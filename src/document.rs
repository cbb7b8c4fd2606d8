// src/document.rs

//! Whole-document persistence
//!
//! Catalog and leaf documents are small JSON files rewritten in full on
//! every change. Writes go to a temporary file in the same directory and
//! are renamed over the target, so readers never see a torn document.

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read a JSON document, treating a missing file as the default value
pub fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist yet, starting empty", path.display());
            return Ok(T::default());
        }
        Err(e) => {
            return Err(Error::PersistenceError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        Error::PersistenceError(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Atomically replace `path` with `value` as pretty JSON
pub fn write_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_bytes(path, &bytes)
}

/// Atomically replace `path` with `text`
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    write_bytes(path, text.as_bytes())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;

    let persist_error =
        |e: io::Error| Error::PersistenceError(format!("Failed to write {}: {}", path.display(), e));

    let mut temp = NamedTempFile::new_in(parent).map_err(persist_error)?;
    temp.write_all(bytes).map_err(persist_error)?;
    temp.as_file().sync_all().map_err(persist_error)?;
    temp.persist(path).map_err(|e| persist_error(e.error))?;

    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
