//! Private point-in-time copies of the data file.
//!
//! The canonical data file may be rewritten by an external updater at any time.
//! Loading from a snapshot inside a process-owned directory keeps the active
//! generation independent of those writes. The snapshot is byte-exact as of the
//! read; a writer racing the read is not synchronized against.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;

const STAGING_DIR_PREFIX: &str = "ipi-on-premise";

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Failed to create staging directory: {0}")]
    CreateDir(#[source] std::io::Error),

    #[error("Failed to read data file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create snapshot in {dir}: {source}")]
    Create {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A staged snapshot: directory plus generated file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub dir: PathBuf,
    pub file_name: String,
}

impl StagedFile {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Copy `source` into a new, uniquely named file inside `temp_dir`.
pub fn copy_to_temp(source: &Path, temp_dir: &Path) -> Result<StagedFile, StagingError> {
    let data = std::fs::read(source).map_err(|e| StagingError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;

    let prefix = source
        .file_name()
        .map(|n| format!("{}.", n.to_string_lossy()))
        .unwrap_or_else(|| "data.".to_string());

    let mut file = tempfile::Builder::new()
        .prefix(&prefix)
        .tempfile_in(temp_dir)
        .map_err(|e| StagingError::Create { dir: temp_dir.to_path_buf(), source: e })?;

    let write_err = |path: &Path, e: std::io::Error| StagingError::Write {
        path: path.to_path_buf(),
        source: e,
    };
    file.write_all(&data).map_err(|e| write_err(file.path(), e))?;
    file.flush().map_err(|e| write_err(file.path(), e))?;

    let (_, path) = file.keep().map_err(|e| write_err(e.file.path(), e.error))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(StagedFile { dir: temp_dir.to_path_buf(), file_name })
}

/// Process-owned directory holding the live snapshot.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh directory, inside `base` when given, else the system temp dir.
    pub fn create(base: Option<&Path>) -> Result<Self, StagingError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_DIR_PREFIX);
        let dir = match base {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
        .map_err(StagingError::CreateDir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Whether `path` is a snapshot of this area.
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.path())
    }

    pub fn stage(&self, source: &Path) -> Result<StagedFile, StagingError> {
        copy_to_temp(source, self.dir.path())
    }

    /// Remove a snapshot. Paths outside the area are left alone and report `false`.
    pub fn remove_snapshot(&self, path: &Path) -> std::io::Result<bool> {
        if !self.owns(path) {
            return Ok(false);
        }
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Number of snapshots currently on disk.
    pub fn snapshot_count(&self) -> usize {
        std::fs::read_dir(self.dir.path())
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }

    /// Delete the directory and everything in it.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_is_byte_exact_and_unique() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("ipi.table");
        std::fs::write(&source, b"\x00\x01payload\xff").unwrap();

        let area = StagingArea::create(None).unwrap();
        let a = area.stage(&source).unwrap();
        let b = area.stage(&source).unwrap();

        assert_ne!(a.file_name, b.file_name);
        assert!(a.file_name.starts_with("ipi.table."));
        assert_eq!(std::fs::read(a.path()).unwrap(), b"\x00\x01payload\xff");
        assert_eq!(area.snapshot_count(), 2);
    }

    #[test]
    fn test_missing_source_is_read_error() {
        let area = StagingArea::create(None).unwrap();
        let err = area.stage(Path::new("/nonexistent/ipi.table")).unwrap_err();
        assert!(matches!(err, StagingError::Read { .. }));
        assert_eq!(area.snapshot_count(), 0);
    }

    #[test]
    fn test_missing_destination_is_create_error() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("ipi.table");
        std::fs::write(&source, b"x").unwrap();

        let err = copy_to_temp(&source, &src_dir.path().join("gone")).unwrap_err();
        assert!(matches!(err, StagingError::Create { .. }));
    }

    #[test]
    fn test_remove_snapshot_ignores_foreign_paths() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("ipi.table");
        std::fs::write(&source, b"x").unwrap();

        let area = StagingArea::create(None).unwrap();
        assert!(!area.remove_snapshot(&source).unwrap());
        assert!(source.exists());

        let staged = area.stage(&source).unwrap();
        assert!(area.remove_snapshot(&staged.path()).unwrap());
        assert!(!staged.path().exists());
    }

    #[test]
    fn test_close_removes_directory() {
        let base = tempfile::tempdir().unwrap();
        let area = StagingArea::create(Some(base.path())).unwrap();
        let dir = area.path().to_path_buf();
        assert!(dir.starts_with(base.path()));
        area.close().unwrap();
        assert!(!dir.exists());
    }
}
