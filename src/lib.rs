//! Package Node.js services into deployable archives.
//!
//! Compiled entry points are traced to find every file required at
//! runtime, modules that static analysis cannot see are expanded from
//! their manifests and the result is written to a zip or tgz archive.
pub mod archive;
pub mod bundle;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod expand;
pub mod helpers;
pub mod manifest;
pub mod module;
pub mod printer;
pub mod session;
pub mod swc_utils;
pub mod trace;
pub mod workspace;

pub use bundle::{bundle, BundleReport};
pub use error::{Error, Result};
pub use session::Session;
