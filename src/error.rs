//! Error type for resolution, tracing and archiving.
use std::path::PathBuf;

use thiserror::Error;

/// Result type for the core modules.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while packaging an application.
#[derive(Debug, Error)]
pub enum Error {
    /// No entry points were given to the bundle operation.
    #[error("no entry points were given")]
    NoEntries,

    /// No output directory was given to the bundle operation.
    #[error("no output directory was given")]
    NoOutputDir,

    /// Compression level is outside of the supported range.
    #[error("invalid compression level {0}, expected a value from 0 to 9")]
    InvalidCompressionLevel(u32),

    /// Archive format name is not recognised.
    #[error("unknown archive format '{0}', expected zip or tgz")]
    UnknownFormat(String),

    /// Module source type name is not recognised.
    #[error("unknown source type '{0}', expected commonjs or module")]
    UnknownSourceType(String),

    /// A module could not be located from the given base.
    #[error("cannot find module '{name}' from {}", .base.display())]
    ModuleNotFound { name: String, base: PathBuf },

    /// A required dependency of a forced module could not be located.
    #[error("cannot find module '{name}' required by {chain}")]
    MissingDependency { name: String, chain: String },

    /// A manifest is required at a location but does not exist.
    #[error("no package.json found at {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// A manifest exists but could not be parsed.
    #[error("failed to parse {}: {source}", .path.display())]
    ManifestInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A path cannot be expressed relative to the workspace root.
    #[error(
        "{} is outside of the workspace root {}",
        .path.display(),
        .root.display()
    )]
    OutsideWorkspace { path: PathBuf, root: PathBuf },

    /// The compiler did not produce any output files.
    #[error("compilation produced no output files")]
    EmptyOutput,

    /// The compiler failed for an entry point.
    #[error("failed to compile {}: {message}", .file.display())]
    Compile { file: PathBuf, message: String },

    /// Strict tracing found references it could not resolve.
    #[error(
        "trace is incomplete, {} reference(s) could not be resolved:\n{}",
        .0.len(),
        .0.join("\n")
    )]
    TraceIncomplete(Vec<String>),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Determine if this error means a module could not be located.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ModuleNotFound { .. })
    }
}
