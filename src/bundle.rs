//! Package a service into a deployable archive.
//!
//! The entry points are compiled into a working directory inside the
//! service, the runtime files are traced from the compiled output, forced
//! modules are expanded from their manifests and everything is written to
//! a single archive together with a rewritten manifest.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::Pattern;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::archive::{ArchiveSummary, Assembler, MAX_LEVEL};
use crate::compiler::{Compile, CompileOutput, CompileRequest, SourceType};
use crate::config::BundleOptions;
use crate::error::{Error, Result};
use crate::expand::{ExpandOptions, Expander, Inclusions};
use crate::helpers::{relative_to, trim_relative};
use crate::manifest::{Manifest, ManifestCache, MANIFEST};
use crate::module::resolver::NodeResolver;
use crate::session::Session;
use crate::trace::{TraceOptions, Tracer};
use crate::workspace::find_workspace_root;

const NODE_MODULES: &str = "node_modules";

/// Report for a bundle run.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
    /// The written archive.
    pub archive: ArchiveSummary,
    /// Number of compiled entry points.
    pub compiled: usize,
    /// Number of traced files.
    pub traced: usize,
    /// Number of files contributed by forced modules.
    pub expanded: usize,
    /// Warnings from tracing and expanding.
    pub warnings: Vec<String>,
}

/// Bundle a service.
pub fn bundle(
    options: &BundleOptions,
    compiler: &dyn Compile,
) -> Result<BundleReport> {
    if options.entries.is_empty() {
        return Err(Error::NoEntries);
    }
    let output = options.output.as_ref().ok_or(Error::NoOutputDir)?;
    if options.level > MAX_LEVEL {
        return Err(Error::InvalidCompressionLevel(options.level));
    }

    let service_dir = options.service_dir.canonicalize()?;
    let session = create_session(&service_dir, options.source_type)?;

    let work_dir = service_dir.join(&options.build_dir);
    if work_dir.exists() {
        fs::remove_dir_all(&work_dir)?;
    }

    let request = CompileRequest {
        entries: options.entries.clone(),
        externals: options.externals.clone(),
        format: options.source_type,
        root: service_dir.clone(),
        out_dir: work_dir.clone(),
    };
    let compiled = compiler.compile(&request);

    let result = compiled.and_then(|compiled| {
        if compiled.outputs.is_empty() {
            return Err(Error::EmptyOutput);
        }
        package(&session, options, &compiled, output)
    });

    if !options.keep_build && work_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&work_dir) {
            log::warn!("Failed to remove {}: {}", work_dir.display(), e);
        }
    }

    result
}

/// Create a session resolving modules the way the runtime will.
fn create_session(
    service_dir: &Path,
    source_type: SourceType,
) -> Result<Session> {
    let manifests = Arc::new(ManifestCache::new());
    let root = find_workspace_root(&manifests, service_dir)?;
    let resolver = NodeResolver::new(Arc::clone(&manifests))
        .with_conditions(source_type.conditions())
        .with_search_paths(vec![
            service_dir.join(NODE_MODULES),
            root.join(NODE_MODULES),
        ]);
    Session::with_resolver(service_dir, manifests, Box::new(resolver))
}

fn package(
    session: &Session,
    options: &BundleOptions,
    compiled: &CompileOutput,
    output: &Path,
) -> Result<BundleReport> {
    let service_dir = session.start();
    let mut warnings = Vec::new();

    let ignore_paths = options
        .ignore_paths
        .iter()
        .map(|p| Pattern::new(trim_relative(p)))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut ignore_packages = options.force_include.clone();
    ignore_packages.extend(options.exclude.iter().cloned());

    let tracer = Tracer::new(
        session,
        TraceOptions {
            ignore_paths,
            ignore_packages,
            emitted_dirs: vec![compiled.work_dir.clone()],
            strict: options.strict,
        },
    );
    let entries: Vec<&PathBuf> =
        compiled.outputs.iter().map(|(_, path)| path).collect();
    let traced = tracer.trace(&entries)?;
    warnings.extend(traced.warnings.iter().map(|w| w.to_string()));

    let mut inclusions = Inclusions::default();
    let mut expander = Expander::new(
        session,
        ExpandOptions {
            optional_modules: options.optional_modules.clone(),
            exclude: options.exclude.clone(),
        },
    );
    for name in options.force_include.iter() {
        expander.expand(name, service_dir, &[], &mut inclusions)?;
    }
    warnings.extend(expander.warnings().iter().cloned());

    let manifest = session.manifests().require(service_dir)?;
    let rewritten = rewrite_manifest(
        &manifest,
        &compiled.outputs,
        &compiled.work_dir,
        options.source_type,
    )?;
    fs::write(
        compiled.work_dir.join(MANIFEST),
        serde_json::to_string_pretty(&rewritten)?,
    )?;

    let service_rel = session.relative(service_dir)?;
    let mut assembler = Assembler::new(session.root());
    assembler.add_files(traced.files.iter());
    assembler.add_extras(traced.links.iter())?;
    assembler.add_files(inclusions.files.iter());
    assembler.add_extras(inclusions.extras.iter())?;
    assembler.add_generated_dir(&service_rel, &compiled.work_dir)?;
    assembler.add_extras(
        options
            .extras
            .iter()
            .map(|extra| join_relative(&service_rel, extra)),
    )?;

    let file_name = format!(
        "{}.{}",
        archive_name(&manifest, service_dir),
        options.format.extension()
    );
    let archive = assembler.write(
        output.join(file_name),
        options.format,
        options.level,
    )?;

    Ok(BundleReport {
        archive,
        compiled: compiled.outputs.len(),
        traced: traced.files.len(),
        expanded: inclusions.len(),
        warnings,
    })
}

/// Manifest for the archive with the fields needed at runtime and a
/// start script for every entry point.
pub fn rewrite_manifest(
    manifest: &Manifest,
    outputs: &[(String, PathBuf)],
    work_dir: &Path,
    source_type: SourceType,
) -> Result<Value> {
    let mut value = Map::new();
    if let Some(name) = &manifest.name {
        value.insert(String::from("name"), json!(name));
    }
    if let Some(version) = &manifest.version {
        value.insert(String::from("version"), json!(version));
    }
    if let Some(license) = &manifest.license {
        value.insert(String::from("license"), license.clone());
    }
    if let Some(private) = manifest.private {
        value.insert(String::from("private"), json!(private));
    }
    if source_type == SourceType::Module {
        value.insert(String::from("type"), json!("module"));
    }

    let mut scripts = Map::new();
    for (name, path) in outputs {
        let command = format!("node {}", relative_to(path, work_dir)?);
        let key = if outputs.len() == 1 {
            String::from("start")
        } else {
            format!("start:{}", name)
        };
        scripts.insert(key, Value::String(command));
    }
    value.insert(String::from("scripts"), Value::Object(scripts));
    Ok(Value::Object(value))
}

/// Archive file name for a package, `@scope/name` becomes `scope-name`.
pub fn normalize_name(name: &str) -> String {
    name.trim_start_matches('@').replace('/', "-")
}

fn archive_name(manifest: &Manifest, service_dir: &Path) -> String {
    match &manifest.name {
        Some(name) if !name.is_empty() => normalize_name(name),
        _ => service_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("bundle")),
    }
}

fn join_relative(prefix: &str, path: &str) -> String {
    let path = trim_relative(path);
    if prefix.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}
