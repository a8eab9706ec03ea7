//! Resolution session holding the state for a single bundle run.
//!
//! The manifest cache, the workspace root and the module resolution
//! strategy are owned by a session so that concurrent runs (and tests)
//! never share state.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use swc_common::FileName;
use swc_ecma_loader::resolve::Resolve;

use crate::error::{Error, Result};
use crate::helpers::relative_to;
use crate::manifest::{ManifestCache, MANIFEST};
use crate::module::{
    base::module_root_directory,
    resolver::{NodeResolver, Resolution},
    ResolvedModule,
};
use crate::workspace::find_workspace_root;

/// State for one resolution run.
pub struct Session {
    manifests: Arc<ManifestCache>,
    resolver: Box<dyn Resolve>,
    start: PathBuf,
    root: PathBuf,
}

impl Session {
    /// Create a session for a project directory using the default
    /// node resolver.
    pub fn new<P: AsRef<Path>>(start: P) -> Result<Self> {
        let manifests = Arc::new(ManifestCache::new());
        let resolver = NodeResolver::new(Arc::clone(&manifests));
        Self::with_resolver(start, manifests, Box::new(resolver))
    }

    /// Create a session with a custom module resolution strategy.
    pub fn with_resolver<P: AsRef<Path>>(
        start: P,
        manifests: Arc<ManifestCache>,
        resolver: Box<dyn Resolve>,
    ) -> Result<Self> {
        let start = start.as_ref().canonicalize()?;
        let root = find_workspace_root(&manifests, &start)?;
        log::info!("Workspace root {}", root.display());
        Ok(Self {
            manifests,
            resolver,
            start,
            root,
        })
    }

    /// Project directory the session was created for.
    pub fn start(&self) -> &Path {
        &self.start
    }

    /// Workspace root for the session.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest cache for the session.
    pub fn manifests(&self) -> &ManifestCache {
        &self.manifests
    }

    /// Express a path relative to the workspace root.
    pub fn relative<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        relative_to(path, &self.root)
    }

    /// Resolve a specifier from a file or directory.
    pub fn resolve(&self, base: &Path, specifier: &str) -> Result<Resolution> {
        let not_found = || Error::ModuleNotFound {
            name: specifier.to_string(),
            base: base.to_path_buf(),
        };
        match self
            .resolver
            .resolve(&FileName::Real(base.to_path_buf()), specifier)
        {
            Ok(FileName::Real(path)) => Ok(Resolution::File(path)),
            Ok(FileName::Custom(name)) if name == specifier => {
                Ok(Resolution::Builtin(name))
            }
            Ok(_) => Err(not_found()),
            Err(e) => match e.downcast::<Error>() {
                Ok(Error::ModuleNotFound { .. }) => Err(not_found()),
                Ok(e) => Err(e),
                Err(e) => {
                    log::debug!("{}", e);
                    Err(not_found())
                }
            },
        }
    }

    /// Resolve the root directory of an installed module.
    ///
    /// Resolution is attempted from the parent module root first (when
    /// given) so nested installs win over hoisted installs.
    pub fn resolve_module_root(
        &self,
        name: &str,
        base: &Path,
        from_module: Option<&Path>,
    ) -> Result<ResolvedModule> {
        let resolution = match from_module {
            Some(parent) => match self.resolve_entry(parent, name) {
                Err(e) if e.is_not_found() => self.resolve_entry(base, name),
                result => result,
            },
            None => self.resolve_entry(base, name),
        }?;

        match resolution {
            Resolution::Builtin(name) => Ok(ResolvedModule::Builtin(name)),
            Resolution::File(entry) => {
                module_root_directory(&self.manifests, name, &entry)
                    .map(ResolvedModule::Path)
                    .ok_or_else(|| Error::ModuleNotFound {
                        name: name.to_string(),
                        base: base.to_path_buf(),
                    })
            }
        }
    }

    /// Resolve the package entry for a module, packages without a
    /// runnable entry resolve to their manifest.
    fn resolve_entry(&self, base: &Path, name: &str) -> Result<Resolution> {
        match self.resolve(base, name) {
            Err(e) if e.is_not_found() => {
                self.resolve(base, &format!("{}/{}", name, MANIFEST))
                    .map_err(|_| e)
            }
            result => result,
        }
    }
}
