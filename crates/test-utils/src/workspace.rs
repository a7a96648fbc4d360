//! Temporary data roots for pipeline tests.
//!
//! A [`TestDataRoot`] is a scratch directory that is removed on drop.
//! Files are created relative to it so tests can mirror the real
//! directory layout without touching the working tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Scratch data root, deleted when dropped.
pub struct TestDataRoot {
    dir: TempDir,
}

impl TestDataRoot {
    /// Create a fresh, empty data root.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("biomass-test-").tempdir()?,
        })
    }

    /// Root directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `relative` under the root.
    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Create an empty placeholder file at `relative`.
    pub fn touch(&self, relative: impl AsRef<Path>) -> io::Result<PathBuf> {
        self.write(relative, b"")
    }

    /// Create a directory (and parents) at `relative`.
    pub fn mkdir(&self, relative: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = self.join(relative);
        fs::create_dir_all(&path)?;
        Ok(path)
    }
}
