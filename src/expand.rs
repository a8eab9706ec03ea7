//! Expand the files contributed by a module using manifest metadata.
//!
//! Used for modules that static analysis cannot discover, native addons
//! and optional requires for example. The dependency graph declared by
//! the manifests is walked serially, each module root is visited once.
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::helpers::trim_relative;
use crate::manifest::{Manifest, MANIFEST};
use crate::module::{
    base::locate_package_dir, resolver::Resolution, ResolvedModule,
};
use crate::session::Session;

const TYPES_SCOPE: &str = "@types/";
const DECLARATION_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Workspace relative paths collected by the expander.
#[derive(Debug, Default, Clone)]
pub struct Inclusions {
    /// Regular files.
    pub files: BTreeSet<String>,
    /// Symbolic links to recreate in the archive.
    pub extras: BTreeSet<String>,
}

impl Inclusions {
    /// Number of collected paths.
    pub fn len(&self) -> usize {
        self.files.len() + self.extras.len()
    }

    /// Determine if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.extras.is_empty()
    }
}

/// Options for the expander.
#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Modules that may be missing without failing.
    pub optional_modules: Vec<String>,
    /// Modules that are never expanded.
    pub exclude: Vec<String>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            optional_modules: vec![String::from("fsevents")],
            exclude: Vec::new(),
        }
    }
}

/// Walks the manifest declared dependencies of modules.
pub struct Expander<'a> {
    session: &'a Session,
    options: ExpandOptions,
    visited: HashSet<PathBuf>,
    warnings: Vec<String>,
}

impl<'a> Expander<'a> {
    /// Create an expander.
    pub fn new(session: &'a Session, options: ExpandOptions) -> Self {
        Self {
            session,
            options,
            visited: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Warnings for modules that were skipped.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Module roots visited so far.
    pub fn visited(&self) -> &HashSet<PathBuf> {
        &self.visited
    }

    /// Expand a module resolved from `base` and everything it depends on.
    ///
    /// The `parents` chain is only used for diagnostics. Calling this
    /// again for a module that was already visited adds nothing.
    pub fn expand(
        &mut self,
        name: &str,
        base: &Path,
        parents: &[String],
        inclusions: &mut Inclusions,
    ) -> Result<()> {
        self.expand_module(name, base, None, None, parents.to_vec(), inclusions)
    }

    fn expand_module(
        &mut self,
        name: &str,
        base: &Path,
        from_module: Option<&Path>,
        parent: Option<&Manifest>,
        parents: Vec<String>,
        inclusions: &mut Inclusions,
    ) -> Result<()> {
        if self.options.exclude.iter().any(|n| n == name) {
            log::debug!("Exclude {}", name);
            return Ok(());
        }

        let resolved =
            self.session.resolve_module_root(name, base, from_module);
        let root = match resolved {
            Ok(ResolvedModule::Builtin(_)) => return Ok(()),
            Ok(ResolvedModule::Path(root)) => root,
            Err(e) if e.is_not_found() => {
                let chain = chain(&parents, name);
                if self.is_allowed_missing(name, parent) {
                    let message = format!("skip missing module {}", chain);
                    log::warn!("{}", message);
                    self.warnings.push(message);
                    return Ok(());
                }
                return Err(Error::MissingDependency {
                    name: name.to_string(),
                    chain,
                });
            }
            Err(e) => return Err(e),
        };

        if !self.visited.insert(root.clone()) {
            return Ok(());
        }

        log::debug!("Expand {} ({})", name, root.display());

        let manifest = self.session.manifests().require(&root)?;
        self.include_files(&root, &manifest, inclusions)?;

        let lookup = from_module.unwrap_or(base);
        if let Some(location) = locate_package_dir(name, lookup) {
            let is_link = location
                .symlink_metadata()
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                inclusions.extras.insert(self.session.relative(&location)?);
            }
        }

        let mut lineage = parents;
        lineage.push(name.to_string());
        let dependencies: Vec<String> =
            manifest.dependency_names().cloned().collect();
        for dependency in dependencies {
            self.expand_module(
                &dependency,
                base,
                Some(&root),
                Some(manifest.as_ref()),
                lineage.clone(),
                inclusions,
            )?;
        }
        Ok(())
    }

    fn include_files(
        &self,
        root: &Path,
        manifest: &Manifest,
        inclusions: &mut Inclusions,
    ) -> Result<()> {
        match &manifest.files {
            Some(patterns) => {
                let mut negated = Vec::new();
                let mut matched = BTreeSet::new();
                let prefix = Pattern::escape(&root.to_string_lossy());
                for pattern in patterns {
                    if let Some(pattern) = pattern.strip_prefix('!') {
                        negated.push(Pattern::new(trim_relative(pattern))?);
                        continue;
                    }
                    let pattern =
                        format!("{}/{}", prefix, trim_relative(pattern));
                    for entry in glob::glob_with(&pattern, MATCH_OPTIONS)? {
                        match entry {
                            Ok(path) => {
                                matched.insert(path);
                            }
                            Err(e) => log::warn!("{}", e),
                        }
                    }
                }
                for path in matched {
                    self.include_path(root, &path, &negated, inclusions)?;
                }
            }
            None => self.include_path(root, root, &[], inclusions)?,
        }

        inclusions
            .files
            .insert(self.session.relative(root.join(MANIFEST))?);

        let main = manifest.main.as_deref().unwrap_or("index.js");
        let specifier = format!("./{}", trim_relative(main));
        match self.session.resolve(root, &specifier) {
            Ok(Resolution::File(path)) if path.starts_with(root) => {
                inclusions.files.insert(self.session.relative(path)?);
            }
            _ => log::debug!("No main file for {}", manifest.name()),
        }
        Ok(())
    }

    /// Include a file or every file below a directory.
    fn include_path(
        &self,
        root: &Path,
        path: &Path,
        negated: &[Pattern],
        inclusions: &mut Inclusions,
    ) -> Result<()> {
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            let entry_path = entry.path();
            if is_declaration_file(entry_path) {
                continue;
            }
            let local = entry_path.strip_prefix(root).unwrap_or(entry_path);
            if negated.iter().any(|p| p.matches_path_with(local, MATCH_OPTIONS))
            {
                continue;
            }
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                inclusions.extras.insert(self.session.relative(entry_path)?);
            } else if file_type.is_file() {
                inclusions.files.insert(self.session.relative(entry_path)?);
            }
        }
        Ok(())
    }

    fn is_allowed_missing(
        &self,
        name: &str,
        parent: Option<&Manifest>,
    ) -> bool {
        name.starts_with(TYPES_SCOPE)
            || self.options.optional_modules.iter().any(|n| n == name)
            || parent.map(|p| p.is_optional(name)).unwrap_or(false)
    }
}

fn chain(parents: &[String], name: &str) -> String {
    parents
        .iter()
        .map(|s| s.as_str())
        .chain(std::iter::once(name))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Determine if a path is a generated type declaration file.
pub fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| DECLARATION_SUFFIXES.iter().any(|s| n.ends_with(s)))
        .unwrap_or(false)
}
