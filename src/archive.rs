// src/archive.rs

//! Archive files in the repository root
//!
//! An `Archive` is the on-disk half of an index entry: where the file is,
//! what it hashes to, and its stat times. Hashing is MD5, which keys the
//! catalog; it identifies content, it does not authenticate it.

use crate::error::{Error, Result};
use crate::packages::{ArchiveKind, classify};
use std::fs::{self, File, Metadata};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Read buffer for hashing
const HASH_CHUNK: usize = 64 * 1024;

/// A versioned package build file
#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    pub path: PathBuf,
    pub filename: String,
    pub md5: String,
    pub size: u64,
    pub mtime: f64,
    pub ctime: f64,
    pub atime: f64,
    pub kind: ArchiveKind,
}

impl Archive {
    /// Stat and hash an archive
    ///
    /// A file that does not exist is `Error::MissingFile`.
    pub fn open(path: &Path) -> Result<Self> {
        let filename = file_name_of(path)?;

        let metadata = fs::metadata(path).map_err(|e| missing_or_io(path, e))?;
        let md5 = md5_file(path)?;
        let (mtime, ctime, atime) = timestamps(&metadata);

        Ok(Self {
            path: path.to_path_buf(),
            kind: classify(path),
            filename,
            md5,
            size: metadata.len(),
            mtime,
            ctime,
            atime,
        })
    }

    /// Whether the file is still on disk
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Hex MD5 digest of a file's content
pub fn md5_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| missing_or_io(path, e))?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; HASH_CHUNK];

    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        context.consume(&buf[..read]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// File name of `path` as UTF-8
pub fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))
}

/// Regular files directly inside `root`, in directory-listing order
///
/// Dotfiles are skipped. Nothing is sorted: listing order is preserved.
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        // is_file follows symlinks, so a link to an archive counts
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Files in `root` whose extension classifies as a package archive
pub fn archive_paths(root: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files(root)?
        .into_iter()
        .filter(|path| classify(path).is_recognized())
        .collect())
}

fn missing_or_io(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::MissingFile(path.display().to_string())
    } else {
        Error::Io(e)
    }
}

fn seconds(time: io::Result<SystemTime>) -> f64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(unix)]
fn timestamps(metadata: &Metadata) -> (f64, f64, f64) {
    use std::os::unix::fs::MetadataExt;

    let ctime = metadata.ctime() as f64 + metadata.ctime_nsec() as f64 / 1e9;
    (
        seconds(metadata.modified()),
        ctime,
        seconds(metadata.accessed()),
    )
}

#[cfg(not(unix))]
fn timestamps(metadata: &Metadata) -> (f64, f64, f64) {
    (
        seconds(metadata.modified()),
        seconds(metadata.created()),
        seconds(metadata.accessed()),
    )
}
