//! Temporary project trees for integration tests.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::Value;
use tempfile::TempDir;

/// Project tree in a temporary directory, removed on drop.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    /// Canonical root of the fixture.
    pub fn root(&self) -> PathBuf {
        self.dir
            .path()
            .canonicalize()
            .unwrap_or_else(|_| self.dir.path().to_path_buf())
    }

    /// Absolute path for a relative location.
    pub fn path<P: AsRef<Path>>(&self, rel: P) -> PathBuf {
        self.root().join(rel)
    }

    /// Write a file creating parent directories.
    pub fn file<P: AsRef<Path>>(
        &self,
        rel: P,
        content: &str,
    ) -> Result<PathBuf> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Write a `package.json` into a directory.
    pub fn manifest<P: AsRef<Path>>(
        &self,
        dir: P,
        value: Value,
    ) -> Result<PathBuf> {
        let rel = dir.as_ref().join("package.json");
        self.file(rel, &serde_json::to_string_pretty(&value)?)
    }

    /// Create a symbolic link at `rel` pointing to `target`, the
    /// target is written as given.
    #[cfg(unix)]
    pub fn symlink<P: AsRef<Path>, T: AsRef<Path>>(
        &self,
        rel: P,
        target: T,
    ) -> Result<PathBuf> {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(target, &path)?;
        Ok(path)
    }
}
