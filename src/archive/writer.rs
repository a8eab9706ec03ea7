//! Archive writers for the supported container formats.
use std::fs::File;
use std::io;
use std::path::Path;

use flate2::{write::GzEncoder, Compression};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::error::Result;

/// Emits entries into an archive container.
pub trait ArchiveWriter {
    /// Add a regular file read from `source`.
    fn add_file(&mut self, name: &str, source: &Path) -> Result<()>;

    /// Add a symbolic link pointing at `target`.
    fn add_symlink(&mut self, name: &str, target: &str) -> Result<()>;

    /// Add a directory.
    fn add_directory(&mut self, name: &str) -> Result<()>;

    /// Flush pending data and return the underlying file.
    fn finish(self: Box<Self>) -> Result<File>;
}

/// Gzip compressed tar archive.
pub struct TarWriter {
    builder: tar::Builder<GzEncoder<File>>,
}

impl TarWriter {
    pub fn new(file: File, level: u32) -> Self {
        let encoder = GzEncoder::new(file, Compression::new(level));
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        Self { builder }
    }
}

impl ArchiveWriter for TarWriter {
    fn add_file(&mut self, name: &str, source: &Path) -> Result<()> {
        let mut file = File::open(source)?;
        self.builder.append_file(name, &mut file)?;
        Ok(())
    }

    fn add_symlink(&mut self, name: &str, target: &str) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        self.builder.append_link(&mut header, name, target)?;
        Ok(())
    }

    fn add_directory(&mut self, name: &str) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        self.builder.append_data(&mut header, name, io::empty())?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<File> {
        let encoder = self.builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

/// Zip archive, deflated unless the level is zero.
pub struct ZipArchiveWriter {
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
}

impl ZipArchiveWriter {
    pub fn new(file: File, level: u32) -> Self {
        let options = if level == 0 {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(level as i64))
        };
        Self {
            zip: ZipWriter::new(file),
            options,
        }
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn add_file(&mut self, name: &str, source: &Path) -> Result<()> {
        let mut file = File::open(source)?;
        let options = {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = file.metadata()?.permissions().mode();
                self.options.unix_permissions(mode)
            }
            #[cfg(not(unix))]
            {
                self.options
            }
        };
        self.zip.start_file(name, options)?;
        io::copy(&mut file, &mut self.zip)?;
        Ok(())
    }

    fn add_symlink(&mut self, name: &str, target: &str) -> Result<()> {
        self.zip.add_symlink(name, target, self.options)?;
        Ok(())
    }

    fn add_directory(&mut self, name: &str) -> Result<()> {
        self.zip.add_directory(name, self.options)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<File> {
        Ok(self.zip.finish()?)
    }
}
