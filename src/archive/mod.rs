//! Assemble the bundle archive.
//!
//! Entries are collected first, deduplicated by their name inside the
//! archive and then written in sorted order. The archive is written to a
//! `.partial` file which is only renamed once the writer has finished so
//! an archive with the final name is always complete.
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use glob::MatchOptions;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::helpers::{diff_paths, is_glob, relative_to, to_slash, trim_relative};

pub mod writer;

use writer::{ArchiveWriter, TarWriter, ZipArchiveWriter};

/// Highest supported compression level.
pub const MAX_LEVEL: u32 = 9;

const PARTIAL: &str = "partial";
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Archive container format.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Zip archive.
    Zip,
    /// Gzip compressed tar archive.
    Tgz,
}

impl ArchiveFormat {
    /// File extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tgz => "tgz",
        }
    }
}

impl Default for ArchiveFormat {
    fn default() -> Self {
        ArchiveFormat::Zip
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zip" => Ok(ArchiveFormat::Zip),
            "tgz" | "tar.gz" => Ok(ArchiveFormat::Tgz),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Summary of a written archive.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    /// Final location of the archive.
    pub path: PathBuf,
    /// Size of the archive file.
    pub bytes_written: u64,
    /// Number of entries written.
    pub entries: usize,
}

#[derive(Debug, Clone)]
enum Entry {
    File(PathBuf),
    Symlink(String),
    Directory,
}

/// Collects entries and writes the archive.
pub struct Assembler {
    root: PathBuf,
    entries: BTreeMap<String, Entry>,
}

impl Assembler {
    /// Create an assembler for paths relative to `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            entries: BTreeMap::new(),
        }
    }

    /// Number of collected entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determine if no entries were collected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the collected entries in archive order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Add regular files relative to the root.
    pub fn add_files<I, S>(&mut self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for file in files {
            let name = trim_relative(file.as_ref());
            self.entries
                .insert(name.to_string(), Entry::File(self.root.join(name)));
        }
    }

    /// Add a generated file with an explicit archive name.
    pub fn add_generated<P: AsRef<Path>>(&mut self, name: &str, source: P) {
        self.entries.insert(
            trim_relative(name).to_string(),
            Entry::File(source.as_ref().to_path_buf()),
        );
    }

    /// Add every file below a generated directory using `prefix`
    /// as the archive location of the directory.
    pub fn add_generated_dir<P: AsRef<Path>>(
        &mut self,
        prefix: &str,
        dir: P,
    ) -> Result<()> {
        let dir = dir.as_ref();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = to_slash(
                entry.path().strip_prefix(dir).unwrap_or(entry.path()),
            );
            let name = join_name(prefix, &rel);
            self.add_generated(&name, entry.path());
        }
        Ok(())
    }

    /// Add relative paths or glob patterns.
    ///
    /// Existing files, directories and symbolic links are added, missing
    /// paths that contain a wildcard are expanded against the root and
    /// anything else is skipped with a warning.
    pub fn add_extras<I, S>(&mut self, extras: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for extra in extras {
            let extra = extra.as_ref();
            let name = trim_relative(extra);
            let path = self.root.join(name);
            match fs::symlink_metadata(&path) {
                Ok(_) => self.add_existing(&path)?,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if is_glob(name) {
                        self.add_pattern(name)?;
                    } else {
                        log::warn!("Skip missing extra {}", extra);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn add_pattern(&mut self, pattern: &str) -> Result<()> {
        let prefix = glob::Pattern::escape(&self.root.to_string_lossy());
        let pattern = format!("{}/{}", prefix, pattern);
        let options = MatchOptions {
            require_literal_separator: true,
            ..Default::default()
        };
        let mut matched = false;
        for entry in glob::glob_with(&pattern, options)? {
            match entry {
                Ok(path) => {
                    matched = true;
                    self.add_existing(&path)?;
                }
                Err(e) => log::warn!("{}", e),
            }
        }
        if !matched {
            log::warn!("No matches for extra pattern {}", pattern);
        }
        Ok(())
    }

    fn add_existing(&mut self, path: &Path) -> Result<()> {
        let name = relative_to(path, &self.root)?;
        let metadata = fs::symlink_metadata(path)?;
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            self.add_symlink(&name, path)
        } else if file_type.is_dir() {
            self.add_tree(&name, path)
        } else {
            self.entries.insert(name, Entry::File(path.to_path_buf()));
            Ok(())
        }
    }

    /// Add a directory tree, `name` is the archive location of `dir`.
    fn add_tree(&mut self, name: &str, dir: &Path) -> Result<()> {
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            let rel = to_slash(
                entry.path().strip_prefix(dir).unwrap_or(entry.path()),
            );
            let entry_name = join_name(name, &rel);
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                self.add_symlink(&entry_name, entry.path())?;
            } else if file_type.is_dir() {
                self.entries.insert(entry_name, Entry::Directory);
            } else {
                let source = entry.path().to_path_buf();
                self.entries.insert(entry_name, Entry::File(source));
            }
        }
        Ok(())
    }

    /// Recreate a symbolic link with a target relative to the archive
    /// location of the link, targets outside the root are archived as
    /// content.
    fn add_symlink(&mut self, name: &str, link: &Path) -> Result<()> {
        let target = match link.canonicalize() {
            Ok(target) => target,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Skip dangling link {}", name);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match relative_to(&target, &self.root) {
            Ok(target_name) => {
                let base =
                    Path::new(name).parent().unwrap_or_else(|| Path::new(""));
                let relative =
                    to_slash(diff_paths(Path::new(&target_name), base));
                self.entries
                    .insert(name.to_string(), Entry::Symlink(relative));
                Ok(())
            }
            Err(_) => {
                log::debug!(
                    "Link {} points outside of {}, archive content",
                    name,
                    self.root.display()
                );
                if target.is_dir() {
                    self.add_tree(name, &target)
                } else {
                    self.entries.insert(name.to_string(), Entry::File(target));
                    Ok(())
                }
            }
        }
    }

    /// Write the archive to `destination`.
    pub fn write<P: AsRef<Path>>(
        &self,
        destination: P,
        format: ArchiveFormat,
        level: u32,
    ) -> Result<ArchiveSummary> {
        if level > MAX_LEVEL {
            return Err(Error::InvalidCompressionLevel(level));
        }

        let destination = destination.as_ref();
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial = partial_path(destination);
        let entries = match self.write_entries(&partial, format, level) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, destination)?;

        let bytes_written = fs::metadata(destination)?.len();
        log::info!(
            "Wrote {} ({} entries, {} bytes)",
            destination.display(),
            entries,
            bytes_written
        );
        Ok(ArchiveSummary {
            path: destination.to_path_buf(),
            bytes_written,
            entries,
        })
    }

    fn write_entries(
        &self,
        partial: &Path,
        format: ArchiveFormat,
        level: u32,
    ) -> Result<usize> {
        let file = fs::File::create(partial)?;
        let mut writer: Box<dyn ArchiveWriter> = match format {
            ArchiveFormat::Zip => Box::new(ZipArchiveWriter::new(file, level)),
            ArchiveFormat::Tgz => Box::new(TarWriter::new(file, level)),
        };

        let total = self.entries.len();
        let mut written = 0;
        let mut last_report = Instant::now();
        for (name, entry) in self.entries.iter() {
            let result = match entry {
                Entry::File(source) => writer.add_file(name, source),
                Entry::Symlink(target) => writer.add_symlink(name, target),
                Entry::Directory => writer.add_directory(&format!("{}/", name)),
            };
            match result {
                Ok(_) => written += 1,
                Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    log::warn!("Skip {}, file no longer exists", name);
                }
                Err(e) => return Err(e),
            }

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                log::info!("Archived {}/{} entries", written, total);
                last_report = Instant::now();
            }
        }

        let file = writer.finish()?;
        file.sync_all()?;
        Ok(written)
    }
}

fn join_name(prefix: &str, rel: &str) -> String {
    let prefix = trim_relative(prefix);
    match (prefix.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, rel),
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL);
    destination.with_file_name(name)
}
