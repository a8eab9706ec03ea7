//! Trace the files required at runtime by a set of entry files.
//!
//! Starting from the entry files every reachable module is parsed (never
//! executed) and the static references are resolved and followed until
//! the closure is complete. References that cannot be resolved or that
//! are computed at runtime are reported as warnings, in strict mode they
//! fail the trace once the traversal has finished.
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use swc_common::{comments::SingleThreadedComments, SourceMap};

use crate::error::{Error, Result};
use crate::manifest::MANIFEST;
use crate::module::{
    base::{is_installed_package, locate_package_dir, module_root_directory},
    builtins::{is_dependent_module, is_local_module, split_package_specifier},
    resolver::Resolution,
};
use crate::session::Session;
use crate::swc_utils::parse_source;

pub mod analyzer;

use analyzer::{analyze_module, ModuleAnalysis, ReferenceKind};

/// Options for a trace.
#[derive(Debug, Default, Clone)]
pub struct TraceOptions {
    /// Patterns for workspace relative paths that are not traced.
    pub ignore_paths: Vec<Pattern>,
    /// Packages that are not traced.
    pub ignore_packages: Vec<String>,
    /// Directories holding generated files, their files are traced
    /// but are not part of the result.
    pub emitted_dirs: Vec<PathBuf>,
    /// Fail when any reference could not be followed.
    pub strict: bool,
}

/// Why a file was included.
#[derive(Serialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ReasonKind {
    /// The file is an entry point.
    Entry,
    /// Static import or re-export.
    Import,
    /// Call to `require()`.
    Require,
    /// Call to `require.resolve()`.
    Resolve,
    /// Call to `import()`.
    DynamicImport,
    /// Manifest of a package that was referenced.
    Manifest,
    /// Installed location of a linked package.
    Link,
}

impl From<ReferenceKind> for ReasonKind {
    fn from(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::Import => ReasonKind::Import,
            ReferenceKind::Require => ReasonKind::Require,
            ReferenceKind::Resolve => ReasonKind::Resolve,
            ReferenceKind::DynamicImport => ReasonKind::DynamicImport,
        }
    }
}

/// Reason metadata for a traced file.
#[derive(Serialize, Debug, Clone)]
pub struct Reason {
    /// How the file was first reached.
    pub kind: ReasonKind,
    /// Files that reference this file.
    pub parents: IndexSet<String>,
}

impl Reason {
    fn new(kind: ReasonKind) -> Self {
        Self {
            kind,
            parents: IndexSet::new(),
        }
    }
}

/// Kind of trace warning.
#[derive(Serialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum WarningKind {
    /// A specifier could not be resolved.
    Unresolved,
    /// A specifier is computed at runtime.
    Dynamic,
    /// A file could not be parsed.
    Parse,
}

/// Non-fatal problem found while tracing.
#[derive(Serialize, Debug, Clone)]
pub struct TraceWarning {
    /// Kind of problem.
    pub kind: WarningKind,
    /// Workspace relative file containing the reference.
    pub file: String,
    /// Specifier when known.
    pub specifier: Option<String>,
    /// Description of the problem.
    pub message: String,
}

impl fmt::Display for TraceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.specifier {
            Some(specifier) => {
                write!(f, "{}: '{}' {}", self.file, specifier, self.message)
            }
            None => write!(f, "{}: {}", self.file, self.message),
        }
    }
}

/// Result of a trace.
#[derive(Serialize, Debug, Default)]
pub struct TraceResult {
    /// Workspace relative files required at runtime, entry files and
    /// emitted files are not included.
    pub files: BTreeSet<String>,
    /// Workspace relative locations of linked packages.
    pub links: BTreeSet<String>,
    /// Reason for every visited path, including entry files.
    pub reasons: IndexMap<String, Reason>,
    /// Problems found while tracing.
    pub warnings: Vec<TraceWarning>,
}

impl TraceResult {
    fn reason(
        &mut self,
        path: String,
        kind: ReasonKind,
        parent: Option<&str>,
    ) {
        let reason = self
            .reasons
            .entry(path)
            .or_insert_with(|| Reason::new(kind));
        if let Some(parent) = parent {
            reason.parents.insert(parent.to_string());
        }
    }

    fn warn(&mut self, warning: TraceWarning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Computes the runtime file closure for entry files.
pub struct Tracer<'a> {
    session: &'a Session,
    options: TraceOptions,
}

impl<'a> Tracer<'a> {
    /// Create a tracer.
    pub fn new(session: &'a Session, mut options: TraceOptions) -> Self {
        options.emitted_dirs = options
            .emitted_dirs
            .into_iter()
            .map(|dir| dir.canonicalize().unwrap_or(dir))
            .collect();
        Self { session, options }
    }

    /// Trace the entry files.
    pub fn trace<P: AsRef<Path>>(&self, entries: &[P]) -> Result<TraceResult> {
        let mut result: TraceResult = Default::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut queue: VecDeque<PathBuf> = VecDeque::new();
        let mut entry_keys: HashSet<String> = HashSet::new();

        for entry in entries {
            let path = entry.as_ref().canonicalize()?;
            let rel = self.session.relative(&path)?;
            result.reason(rel.clone(), ReasonKind::Entry, None);
            entry_keys.insert(rel);
            if seen.insert(path.clone()) {
                queue.push_back(path);
            }
        }

        while let Some(file) = queue.pop_front() {
            let rel = self.session.relative(&file)?;
            self.include_manifests(&file, &rel, &mut result)?;
            if !is_javascript(&file) {
                continue;
            }

            let (analysis, source_map) = match analyze_file(&file) {
                Ok(analysis) => analysis,
                Err(message) => {
                    result.warn(TraceWarning {
                        kind: WarningKind::Parse,
                        file: rel.clone(),
                        specifier: None,
                        message,
                    });
                    continue;
                }
            };

            for dynamic in analysis.dynamic.iter() {
                let loc = source_map.lookup_char_pos(dynamic.pos);
                result.warn(TraceWarning {
                    kind: WarningKind::Dynamic,
                    file: rel.clone(),
                    specifier: None,
                    message: format!(
                        "computed {:?} on line {} cannot be traced",
                        dynamic.kind, loc.line
                    ),
                });
            }

            for reference in analysis.references {
                let specifier = &reference.specifier;
                let target = match self.session.resolve(&file, specifier) {
                    Ok(Resolution::Builtin(_)) => continue,
                    Ok(Resolution::File(target)) => target,
                    Err(e) if e.is_not_found() => {
                        result.warn(TraceWarning {
                            kind: WarningKind::Unresolved,
                            file: rel.clone(),
                            specifier: Some(specifier.clone()),
                            message: String::from("could not be resolved"),
                        });
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let target_rel = self.session.relative(&target)?;
                if self.is_ignored(specifier, &target_rel) {
                    log::debug!("Ignore {} ({})", target_rel, specifier);
                    continue;
                }

                self.include_directory_manifest(
                    &file,
                    specifier,
                    &rel,
                    &mut result,
                )?;
                if is_dependent_module(specifier) {
                    self.include_package(
                        specifier,
                        &file,
                        &target,
                        &rel,
                        &mut result,
                    )?;
                }

                result.reason(
                    target_rel,
                    reference.kind.into(),
                    Some(&rel),
                );
                if seen.insert(target.clone()) {
                    queue.push_back(target);
                }
            }
        }

        for (path, reason) in result.reasons.iter() {
            match reason.kind {
                ReasonKind::Entry => {}
                ReasonKind::Link => {
                    result.links.insert(path.clone());
                }
                _ => {
                    if !entry_keys.contains(path) && !self.is_emitted(path) {
                        result.files.insert(path.clone());
                    }
                }
            }
        }

        log::info!(
            "Traced {} file(s) from {} entry point(s)",
            result.files.len(),
            entry_keys.len()
        );

        if self.options.strict && !result.warnings.is_empty() {
            return Err(Error::TraceIncomplete(
                result.warnings.iter().map(|w| w.to_string()).collect(),
            ));
        }

        Ok(result)
    }

    /// Include the manifest of a referenced package and record the
    /// installed location when the package is linked.
    fn include_package(
        &self,
        specifier: &str,
        file: &Path,
        target: &Path,
        parent: &str,
        result: &mut TraceResult,
    ) -> Result<()> {
        let (name, _) = split_package_specifier(specifier);
        let manifests = self.session.manifests();
        if let Some(root) = module_root_directory(manifests, name, target) {
            let manifest = self.session.relative(root.join(MANIFEST))?;
            result.reason(manifest, ReasonKind::Manifest, Some(parent));
        }

        let base = file.parent().unwrap_or(file);
        if let Some(location) = locate_package_dir(name, base) {
            let is_link = location
                .symlink_metadata()
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                let link = self.session.relative(&location)?;
                result.reason(link, ReasonKind::Link, Some(parent));
            }
        }
        Ok(())
    }

    /// Include every manifest between a file and the root of the package
    /// owning it, the runtime reads them for `main` and `type`.
    fn include_manifests(
        &self,
        file: &Path,
        parent: &str,
        result: &mut TraceResult,
    ) -> Result<()> {
        let root = self.session.root();
        for dir in file.ancestors().skip(1) {
            if !dir.starts_with(root) {
                break;
            }
            if let Some(manifest) = self.session.manifests().load(dir)? {
                let rel = self.session.relative(dir.join(MANIFEST))?;
                result.reason(rel, ReasonKind::Manifest, Some(parent));
                if manifest.name.is_some() {
                    break;
                }
            }
            if dir == root || is_installed_package(dir) {
                break;
            }
        }
        Ok(())
    }

    /// Include the manifest of a directory named by a specifier, the
    /// runtime reads its `main` when resolving the directory.
    fn include_directory_manifest(
        &self,
        file: &Path,
        specifier: &str,
        parent: &str,
        result: &mut TraceResult,
    ) -> Result<()> {
        let base = file.parent().unwrap_or(file);
        let dir = if is_local_module(specifier) {
            base.join(specifier)
        } else {
            match split_package_specifier(specifier) {
                (name, Some(subpath)) => match locate_package_dir(name, base) {
                    Some(location) => location.join(subpath),
                    None => return Ok(()),
                },
                _ => return Ok(()),
            }
        };
        if !dir.is_dir() {
            return Ok(());
        }
        let dir = dir.canonicalize()?;
        if self.session.manifests().load(&dir)?.is_some() {
            let rel = self.session.relative(dir.join(MANIFEST))?;
            result.reason(rel, ReasonKind::Manifest, Some(parent));
        }
        Ok(())
    }

    fn is_ignored(&self, specifier: &str, rel: &str) -> bool {
        if self.options.ignore_paths.iter().any(|p| p.matches(rel)) {
            return true;
        }
        let (name, _) = split_package_specifier(specifier);
        self.options.ignore_packages.iter().any(|pkg| {
            (is_dependent_module(specifier) && pkg == name)
                || rel.starts_with(&format!("node_modules/{}/", pkg))
                || rel.contains(&format!("/node_modules/{}/", pkg))
        })
    }

    fn is_emitted(&self, rel: &str) -> bool {
        let path = self.session.root().join(rel);
        self.options
            .emitted_dirs
            .iter()
            .any(|dir| path.starts_with(dir))
    }
}

/// Determine if a file should be parsed for references.
fn is_javascript(file: &Path) -> bool {
    match file.extension().and_then(|e| e.to_str()) {
        Some(extension) => matches!(extension, "js" | "mjs" | "cjs" | "jsx"),
        None => true,
    }
}

fn analyze_file(
    file: &Path,
) -> std::result::Result<(ModuleAnalysis, Arc<SourceMap>), String> {
    let source_map: Arc<SourceMap> = Arc::new(Default::default());
    let fm = source_map.load_file(file).map_err(|e| e.to_string())?;
    let comments: SingleThreadedComments = Default::default();
    let module = parse_source(&fm, &comments)?;
    Ok((analyze_module(&module, &comments), source_map))
}
