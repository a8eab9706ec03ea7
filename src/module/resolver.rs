//! Node module resolution strategy.
//!
//! Implements the `swc_ecma_loader` resolver trait so the strategy can be
//! swapped for another implementation. File, directory and `node_modules`
//! lookups go through `NodeModulesResolver`, this wrapper adds package
//! `exports`, extra search paths and a pluggable built in predicate. Built
//! in modules resolve to `FileName::Custom` with the specifier unchanged,
//! everything else resolves to the real (canonical) path of a file.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use serde_json::Value;
use swc_common::FileName;
use swc_ecma_ast::TargetEnv;
use swc_ecma_loader::{resolve::Resolve, resolvers::node::NodeModulesResolver};

use super::builtins::{
    is_builtin_module, is_local_module, split_package_specifier,
};
use crate::error::{Error, Result};
use crate::manifest::ManifestCache;

/// Predicate used to detect built in modules.
pub type BuiltinPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

const NODE_MODULES: &str = "node_modules";

/// Outcome of resolving a specifier.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Resolution {
    /// Module provided by the runtime.
    Builtin(String),
    /// Real path to a file on disc.
    File(PathBuf),
}

/// Resolver using the node `node_modules` lookup algorithm.
pub struct NodeResolver {
    manifests: Arc<ManifestCache>,
    modules: NodeModulesResolver,
    search_paths: Vec<PathBuf>,
    conditions: Vec<String>,
    is_builtin: BuiltinPredicate,
}

impl NodeResolver {
    /// Create a resolver sharing a manifest cache.
    pub fn new(manifests: Arc<ManifestCache>) -> Self {
        Self {
            manifests,
            modules: NodeModulesResolver::new(
                TargetEnv::Node,
                Default::default(),
            ),
            search_paths: Vec::new(),
            conditions: vec![String::from("node"), String::from("require")],
            is_builtin: Box::new(is_builtin_module),
        }
    }

    /// Directories searched for packages after the `node_modules`
    /// ancestors of the importing file.
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    /// Conditions used for package `exports`, `default` always matches.
    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }

    /// Replace the predicate used to detect built in modules.
    pub fn with_builtins<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.is_builtin = Box::new(predicate);
        self
    }

    /// Resolve a specifier imported from a file in `base_dir`.
    pub fn resolve_specifier(
        &self,
        base_dir: &Path,
        specifier: &str,
    ) -> Result<Resolution> {
        if (self.is_builtin)(specifier) {
            return Ok(Resolution::Builtin(specifier.to_string()));
        }

        let resolved = if is_local_module(specifier) {
            self.delegate(base_dir, specifier)
        } else {
            self.resolve_package(base_dir, specifier)?
        };

        match resolved {
            Some(FileName::Real(path)) => Ok(Resolution::File(path)),
            Some(_) => Ok(Resolution::Builtin(specifier.to_string())),
            None => Err(Error::ModuleNotFound {
                name: specifier.to_string(),
                base: base_dir.to_path_buf(),
            }),
        }
    }

    fn resolve_package(
        &self,
        base_dir: &Path,
        specifier: &str,
    ) -> Result<Option<FileName>> {
        let (name, subpath) = split_package_specifier(specifier);
        if let Some(package_dir) = self.find_package_dir(base_dir, name) {
            if let Some(file) = self.resolve_exported(&package_dir, subpath)? {
                return Ok(Some(file));
            }
        }

        if let Some(file) = self.delegate(base_dir, specifier) {
            return Ok(Some(file));
        }

        let relative = format!("./{}", specifier);
        Ok(self
            .search_paths
            .iter()
            .filter(|modules| modules.join(name).is_dir())
            .find_map(|modules| self.delegate(modules, &relative)))
    }

    /// Nearest installed directory for a package, including the extra
    /// search paths.
    fn find_package_dir(&self, base_dir: &Path, name: &str) -> Option<PathBuf> {
        base_dir
            .ancestors()
            .filter(|dir| {
                dir.file_name().map(|n| n != NODE_MODULES).unwrap_or(true)
            })
            .map(|dir| dir.join(NODE_MODULES))
            .chain(self.search_paths.iter().cloned())
            .map(|modules| modules.join(name))
            .find(|dir| dir.is_dir())
    }

    fn resolve_exported(
        &self,
        package_dir: &Path,
        subpath: Option<&str>,
    ) -> Result<Option<FileName>> {
        let manifest = match self.manifests.load(package_dir)? {
            Some(manifest) => manifest,
            None => return Ok(None),
        };
        let exports = match &manifest.exports {
            Some(exports) => exports,
            None => return Ok(None),
        };
        let key = match subpath {
            Some(subpath) => format!("./{}", subpath),
            None => String::from("."),
        };
        let target = match resolve_exports(exports, &key, &self.conditions) {
            Some(target) if is_local_module(&target) => target,
            Some(target) => format!("./{}", target),
            None => return Ok(None),
        };
        Ok(self.delegate(package_dir, &target))
    }

    /// File, directory and `node_modules` lookup relative to a directory.
    fn delegate(&self, base_dir: &Path, specifier: &str) -> Option<FileName> {
        let base = FileName::Real(base_dir.to_path_buf());
        match self.modules.resolve(&base, specifier) {
            Ok(file) => Some(file),
            Err(e) => {
                log::debug!("{} from {}: {}", specifier, base_dir.display(), e);
                None
            }
        }
    }
}

impl Resolve for NodeResolver {
    fn resolve(
        &self,
        base: &FileName,
        module_specifier: &str,
    ) -> Result<FileName, anyhow::Error> {
        let base = match base {
            FileName::Real(path) => path,
            _ => bail!(
                "cannot resolve '{}' from {}",
                module_specifier,
                base
            ),
        };
        let base_dir = if base.is_dir() {
            base.as_path()
        } else {
            base.parent().unwrap_or(base)
        };
        Ok(match self.resolve_specifier(base_dir, module_specifier)? {
            Resolution::Builtin(name) => FileName::Custom(name),
            Resolution::File(path) => FileName::Real(path),
        })
    }
}

/// Resolve a key (`.` or `./sub/path`) against a package `exports` value.
pub fn resolve_exports(
    exports: &Value,
    key: &str,
    conditions: &[String],
) -> Option<String> {
    let is_sugar = match exports {
        Value::Object(map) => map.keys().all(|k| !k.starts_with('.')),
        _ => true,
    };
    if is_sugar {
        return if key == "." {
            resolve_target(exports, conditions, None)
        } else {
            None
        };
    }

    let map = exports.as_object()?;
    if let Some(target) = map.get(key) {
        return resolve_target(target, conditions, None);
    }

    // Longest matching subpath pattern wins
    let mut best: Option<(&str, &Value, &str)> = None;
    for (pattern, target) in map.iter() {
        if let Some(star) = pattern.find('*') {
            let (prefix, suffix) = (&pattern[..star], &pattern[star + 1..]);
            if key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
            {
                let matched = &key[prefix.len()..key.len() - suffix.len()];
                if best.map(|(p, _, _)| prefix.len() > p.len()).unwrap_or(true)
                {
                    best = Some((prefix, target, matched));
                }
            }
        } else if pattern.ends_with('/') && key.starts_with(pattern.as_str())
        {
            let rest = &key[pattern.len()..];
            return resolve_target(target, conditions, None)
                .map(|t| format!("{}{}", t, rest));
        }
    }

    best.and_then(|(_, target, matched)| {
        resolve_target(target, conditions, Some(matched))
    })
}

fn resolve_target(
    target: &Value,
    conditions: &[String],
    pattern_match: Option<&str>,
) -> Option<String> {
    match target {
        Value::String(s) => Some(match pattern_match {
            Some(matched) => s.replace('*', matched),
            None => s.clone(),
        }),
        Value::Array(list) => list
            .iter()
            .find_map(|t| resolve_target(t, conditions, pattern_match)),
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| {
                k.as_str() == "default" || conditions.iter().any(|c| c == *k)
            })
            .find_map(|(_, t)| resolve_target(t, conditions, pattern_match)),
        _ => None,
    }
}
