// src/quarantine.rs

//! Quarantine for archives that fail classification or extraction
//!
//! Bad archives are moved out of the repository root into an error folder
//! so later scans do not trip over them again. Nothing here returns an
//! error: a failed move is logged and the batch carries on.
//!
//! A file already quarantined under the same name is kept; the newcomer
//! gets a `.quarantined-<secs>` suffix instead.

use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

/// Destination folder for archives that could not be indexed
#[derive(Clone)]
pub struct Quarantine {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl Quarantine {
    /// Quarantine into `<root>/<folder_name>`
    pub fn new(root: &Path, folder_name: &str) -> Self {
        Self {
            dir: root.join(folder_name),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for the suffixes of displaced and duplicate files
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move `path` into the quarantine folder, logging `cause`
    ///
    /// Returns the new location when the move succeeded.
    pub fn isolate(&self, path: &Path, cause: &Error) -> Option<PathBuf> {
        error!(
            "Quarantining {}: {} ({:?})",
            path.display(),
            cause,
            cause
        );

        match self.move_into_quarantine(path) {
            Ok(dest) => {
                warn!("Moved {} to {}", path.display(), dest.display());
                Some(dest)
            }
            Err(e) => {
                error!(
                    "Failed to move {} into {}: {}",
                    path.display(),
                    self.dir.display(),
                    e
                );
                None
            }
        }
    }

    fn move_into_quarantine(&self, path: &Path) -> io::Result<PathBuf> {
        self.ensure_dir()?;
        let filename = path.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
        })?;

        let mut dest = self.dir.join(filename);
        if occupied(&dest) {
            dest = self.free_sibling(&dest, "quarantined");
            warn!(
                "{} is already quarantined; keeping both",
                filename.to_string_lossy()
            );
        }
        fs::rename(path, &dest)?;
        Ok(dest)
    }

    /// Create the folder, renaming aside anything else occupying its path
    fn ensure_dir(&self) -> io::Result<()> {
        match fs::symlink_metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => {
                let aside = self.free_sibling(&self.dir, "displaced");
                warn!(
                    "{} is not a directory; renaming it to {}",
                    self.dir.display(),
                    aside.display()
                );
                fs::rename(&self.dir, &aside)?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::create_dir_all(&self.dir)
    }

    /// First unused `<path>.<label>-<secs>`, then `...-<secs>-1`, `-2`, ...
    fn free_sibling(&self, path: &Path, label: &str) -> PathBuf {
        let base = path.file_name().unwrap_or(OsStr::new("")).to_os_string();
        let stamp = format!(".{}-{}", label, self.clock.now().timestamp());

        let mut attempt = 0u32;
        loop {
            let mut name = base.clone();
            name.push(&stamp);
            if attempt > 0 {
                name.push(format!("-{}", attempt));
            }
            let candidate = path.with_file_name(name);
            if !occupied(&candidate) {
                return candidate;
            }
            attempt += 1;
        }
    }
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn quarantine(root: &Path) -> Quarantine {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        Quarantine::new(root, "_errors").with_clock(Arc::new(clock))
    }

    #[test]
    fn test_isolate_creates_folder_and_moves_file() {
        let root = TempDir::new().unwrap();
        let bad = root.path().join("notes.txt");
        fs::write(&bad, b"hello").unwrap();

        let quarantine = Quarantine::new(root.path(), "_errors");
        let dest = quarantine
            .isolate(&bad, &Error::UnrecognizedFormat("notes.txt".to_string()))
            .unwrap();

        assert!(!bad.exists());
        assert_eq!(dest, root.path().join("_errors").join("notes.txt"));
        assert_eq!(fs::read(&dest).unwrap(), b"hello");
    }

    #[test]
    fn test_file_in_the_way_is_renamed_aside() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("_errors"), b"squatter").unwrap();
        let bad = root.path().join("broken-1.0.tar.gz");
        fs::write(&bad, b"junk").unwrap();

        quarantine(root.path())
            .isolate(&bad, &Error::ExtractionError("junk".to_string()))
            .unwrap();

        assert!(root.path().join("_errors").is_dir());
        assert!(root.path().join("_errors").join("broken-1.0.tar.gz").exists());
        let displaced = root.path().join("_errors.displaced-1714564800");
        assert_eq!(fs::read(displaced).unwrap(), b"squatter");
    }

    #[test]
    fn test_same_name_quarantined_twice_keeps_both() {
        let root = TempDir::new().unwrap();
        let quarantine = quarantine(root.path());
        let bad = root.path().join("broken-1.0.tar.gz");
        let cause = Error::ExtractionError("junk".to_string());

        let mut moved = Vec::new();
        for upload in ["first upload", "second upload", "third upload"] {
            fs::write(&bad, upload).unwrap();
            moved.push(quarantine.isolate(&bad, &cause).unwrap());
        }

        let errors = root.path().join("_errors");
        assert_eq!(
            moved,
            vec![
                errors.join("broken-1.0.tar.gz"),
                errors.join("broken-1.0.tar.gz.quarantined-1714564800"),
                errors.join("broken-1.0.tar.gz.quarantined-1714564800-1"),
            ]
        );
        assert_eq!(fs::read_to_string(&moved[0]).unwrap(), "first upload");
        assert_eq!(fs::read_to_string(&moved[1]).unwrap(), "second upload");
        assert_eq!(fs::read_to_string(&moved[2]).unwrap(), "third upload");
    }

    #[test]
    fn test_missing_file_does_not_panic() {
        let root = TempDir::new().unwrap();
        let quarantine = Quarantine::new(root.path(), "_errors");
        let moved = quarantine.isolate(
            &root.path().join("gone.zip"),
            &Error::MissingFile("gone.zip".to_string()),
        );
        assert!(moved.is_none());
    }
}
