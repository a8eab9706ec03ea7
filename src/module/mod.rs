//! Module resolution.
use std::path::PathBuf;

pub mod base;
pub mod builtins;
pub mod resolver;

/// Outcome of resolving the root directory of a module.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResolvedModule {
    /// Module provided by the runtime, it has no files.
    Builtin(String),
    /// Root directory of the installed package.
    Path(PathBuf),
}
