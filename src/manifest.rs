//! Loads `package.json` manifests and caches them by location.
//!
//! Manifests are read heavily during recursive resolution so every
//! lookup, including a lookup that found nothing, is memoized using the
//! exact location that was requested. The content of a manifest is
//! treated as immutable for the lifetime of the cache.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// File name for package manifests.
pub const MANIFEST: &str = "package.json";

/// Workspace declaration which may be a list of patterns or
/// an object with a `packages` list.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Workspaces {
    /// `"workspaces": ["packages/*"]`
    List(Vec<String>),
    /// `"workspaces": { "packages": ["packages/*"] }`
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

/// Parsed package descriptor.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Package name.
    pub name: Option<String>,
    /// Package version.
    pub version: Option<String>,
    /// License expression (or legacy license object).
    pub license: Option<Value>,
    /// Whether the package is private.
    pub private: Option<bool>,
    /// Main entry file.
    pub main: Option<String>,
    /// Module type, `module` or `commonjs`.
    #[serde(rename = "type")]
    pub module_type: Option<String>,
    /// File patterns published with the package.
    pub files: Option<Vec<String>>,
    /// Runtime dependencies in declaration order.
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    /// Optional runtime dependencies in declaration order.
    #[serde(default)]
    pub optional_dependencies: IndexMap<String, String>,
    /// Workspace membership patterns.
    pub workspaces: Option<Workspaces>,
    /// Package exports map.
    pub exports: Option<Value>,
    /// Script commands.
    #[serde(default)]
    pub scripts: IndexMap<String, String>,

    #[serde(skip)]
    path: PathBuf,
}

impl Manifest {
    /// Parse manifest content read from `path`.
    pub fn parse<P: AsRef<Path>>(path: P, content: &str) -> Result<Self> {
        let mut manifest: Manifest =
            serde_json::from_str(content).map_err(|source| {
                Error::ManifestInvalid {
                    path: path.as_ref().to_path_buf(),
                    source,
                }
            })?;
        manifest.path = path.as_ref().to_path_buf();
        Ok(manifest)
    }

    /// Path to the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the manifest file.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Package name or the empty string.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Package version or the empty string.
    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }

    /// Workspace membership patterns when declared.
    pub fn workspace_patterns(&self) -> Option<&[String]> {
        match &self.workspaces {
            Some(Workspaces::List(patterns)) => Some(patterns),
            Some(Workspaces::Object { packages }) => Some(packages),
            None => None,
        }
    }

    /// Runtime and optional dependency names in declaration order.
    pub fn dependency_names(&self) -> impl Iterator<Item = &String> {
        self.dependencies
            .keys()
            .chain(self.optional_dependencies.keys())
    }

    /// Determine if a dependency is declared as optional.
    pub fn is_optional(&self, name: &str) -> bool {
        self.optional_dependencies.contains_key(name)
    }
}

/// Get the manifest file for a directory or manifest file location.
pub fn manifest_file<P: AsRef<Path>>(location: P) -> PathBuf {
    let location = location.as_ref();
    if location.file_name().map(|n| n == MANIFEST).unwrap_or(false) {
        location.to_path_buf()
    } else {
        location.join(MANIFEST)
    }
}

/// Memoized manifest loader.
///
/// Shared between the resolution session and the module resolver which
/// must be `Send + Sync`, hence the concurrent map.
#[derive(Debug, Default)]
pub struct ManifestCache {
    entries: DashMap<PathBuf, Option<Arc<Manifest>>>,
}

impl ManifestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Default::default()
    }

    /// Load the manifest for a directory or manifest file.
    ///
    /// Absence is reported as `Ok(None)`.
    pub fn load<P: AsRef<Path>>(
        &self,
        location: P,
    ) -> Result<Option<Arc<Manifest>>> {
        let key = location.as_ref().to_path_buf();
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.value().clone());
        }

        let file = manifest_file(&key);
        let manifest = if file.is_file() {
            let content = std::fs::read_to_string(&file)?;
            Some(Arc::new(Manifest::parse(&file, &content)?))
        } else {
            None
        };

        log::trace!(
            "Loaded manifest {} ({})",
            file.display(),
            manifest.is_some()
        );
        self.entries.insert(key, manifest.clone());
        Ok(manifest)
    }

    /// Load a manifest that must exist.
    pub fn require<P: AsRef<Path>>(
        &self,
        location: P,
    ) -> Result<Arc<Manifest>> {
        self.load(location.as_ref())?.ok_or_else(|| {
            Error::ManifestNotFound(manifest_file(location.as_ref()))
        })
    }

    /// Number of memoized locations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determine if nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
