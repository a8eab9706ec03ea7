//! Compile entry points into the working directory.
//!
//! The bundle operation treats compilation as a black box behind the
//! `Compile` trait, `SwcCompiler` is the default implementation which
//! strips types and converts module syntax without bundling, bare module
//! specifiers stay runtime imports for the tracer to follow.
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;

use swc::{config::Options, Compiler};
use swc_common::{
    errors::{emitter::ColorConfig, Handler},
    SourceMap,
};

use crate::error::{Error, Result};
use crate::helpers::to_slash;
use crate::module::builtins::is_local_module;
use crate::swc_utils::load_code;
use crate::trace::analyzer::analyze_module;

const SCRIPT_EXTENSIONS: &[&str] =
    &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];
const TYPESCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts"];

/// Module format of the compiled output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// CommonJS modules.
    CommonJs,
    /// ECMAScript modules.
    Module,
}

impl SourceType {
    /// Extension for compiled files.
    pub fn extension(&self) -> &'static str {
        match self {
            SourceType::CommonJs => "js",
            SourceType::Module => "mjs",
        }
    }

    /// Conditions used to resolve package exports at runtime.
    pub fn conditions(&self) -> Vec<String> {
        let condition = match self {
            SourceType::CommonJs => "require",
            SourceType::Module => "import",
        };
        vec![String::from("node"), String::from(condition)]
    }
}

impl Default for SourceType {
    fn default() -> Self {
        SourceType::CommonJs
    }
}

impl FromStr for SourceType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "commonjs" | "cjs" => Ok(SourceType::CommonJs),
            "module" | "esm" => Ok(SourceType::Module),
            _ => Err(Error::UnknownSourceType(s.to_string())),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::CommonJs => write!(f, "commonjs"),
            SourceType::Module => write!(f, "module"),
        }
    }
}

/// Request to compile entry points.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Output name mapped to the entry source file.
    pub entries: IndexMap<String, PathBuf>,
    /// Modules that must stay runtime imports. Compilers that do not
    /// bundle, like `SwcCompiler`, leave every bare specifier external.
    pub externals: Vec<String>,
    /// Module format of the output.
    pub format: SourceType,
    /// Service directory containing the sources.
    pub root: PathBuf,
    /// Working directory for the output.
    pub out_dir: PathBuf,
}

/// Compiled entry points.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Output name mapped to the compiled file.
    pub outputs: Vec<(String, PathBuf)>,
    /// Directory holding the compiled files.
    pub work_dir: PathBuf,
}

/// Compiles entry points.
pub trait Compile {
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutput>;
}

/// Compiler that transpiles each module with swc.
#[derive(Default)]
pub struct SwcCompiler;

impl SwcCompiler {
    pub fn new() -> Self {
        Self
    }

    fn transpile(&self, source: &Path, format: SourceType) -> Result<String> {
        let sm: Arc<SourceMap> = Arc::new(Default::default());
        let handler = Handler::with_tty_emitter(
            ColorConfig::Auto,
            true,
            false,
            Some(sm.clone()),
        );
        let compiler = Compiler::new(sm.clone());
        let fm = sm.load_file(source)?;
        let options = transpile_options(source, format).map_err(|e| {
            Error::Compile {
                file: source.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        let output = compiler.process_js_file(fm, &handler, &options).map_err(|e| {
            Error::Compile {
                file: source.to_path_buf(),
                message: e.to_string(),
            }
        })?;
        Ok(output.code)
    }

    /// Find local modules imported by compiled code.
    fn local_imports(&self, code: &str, source: &Path) -> Vec<PathBuf> {
        let (_, module, comments) = match load_code(code) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("{}: {}", source.display(), e);
                return Vec::new();
            }
        };
        let dir = source.parent().unwrap_or(source);
        analyze_module(&module, &comments)
            .references
            .into_iter()
            .filter(|r| is_local_module(&r.specifier))
            .filter_map(|r| resolve_local(&dir.join(&r.specifier)))
            .collect()
    }
}

impl Compile for SwcCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<CompileOutput> {
        let root = request.root.canonicalize()?;
        fs::create_dir_all(&request.out_dir)?;
        let work_dir = request.out_dir.canonicalize()?;

        let mut outputs = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut queue: Vec<PathBuf> = Vec::new();

        for (name, source) in request.entries.iter() {
            let source = root.join(source).canonicalize()?;
            let output =
                output_path(&root, &work_dir, &source, request.format)?;
            outputs.push((name.clone(), output));
            if seen.insert(source.clone()) {
                queue.push(source);
            }
        }

        while let Some(source) = queue.pop() {
            let output =
                output_path(&root, &work_dir, &source, request.format)?;
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }

            if !is_script(&source) {
                fs::copy(&source, &output)?;
                continue;
            }

            log::debug!("Compile {}", source.display());
            let code = self.transpile(&source, request.format)?;
            for import in self.local_imports(&code, &source) {
                if !import.starts_with(&root) || import.starts_with(&work_dir) {
                    continue;
                }
                if seen.insert(import.clone()) {
                    queue.push(import);
                }
            }
            fs::write(&output, code)?;
        }

        if outputs.is_empty() {
            return Err(Error::EmptyOutput);
        }

        Ok(CompileOutput { outputs, work_dir })
    }
}

fn transpile_options(
    source: &Path,
    format: SourceType,
) -> serde_json::Result<Options> {
    let syntax = if is_typescript(source) {
        json!({
            "syntax": "typescript",
            "tsx": has_extension(source, &["tsx"])
        })
    } else {
        json!({
            "syntax": "ecmascript",
            "jsx": has_extension(source, &["jsx"])
        })
    };
    let mut options = json!({
        "swcrc": false,
        "isModule": true,
        "jsc": {
            "parser": syntax,
            "target": "es2019",
        },
    });
    if format == SourceType::CommonJs {
        options["module"] = json!({ "type": "commonjs" });
    }
    serde_json::from_value(options)
}

/// Location of the compiled file for a source file.
///
/// Scripts get the extension of the output format, other files keep
/// their name.
fn output_path(
    root: &Path,
    work_dir: &Path,
    source: &Path,
    format: SourceType,
) -> Result<PathBuf> {
    let rel = source.strip_prefix(root).map_err(|_| Error::Compile {
        file: source.to_path_buf(),
        message: format!("not inside {}", root.display()),
    })?;
    let rel = PathBuf::from(to_slash(rel));
    let output = work_dir.join(rel);
    if is_script(source) {
        Ok(output.with_extension(format.extension()))
    } else {
        Ok(output)
    }
}

/// Resolve a relative import to a source file.
fn resolve_local(target: &Path) -> Option<PathBuf> {
    if target.is_file() {
        return target.canonicalize().ok();
    }
    // Compiled code keeps the specifier written in the source which
    // may use the extension of the output.
    let stem = match target.extension().and_then(|e| e.to_str()) {
        Some(e) if SCRIPT_EXTENSIONS.contains(&e) => target.with_extension(""),
        _ => target.to_path_buf(),
    };
    let index = target.join("index");
    let candidates = SCRIPT_EXTENSIONS
        .iter()
        .map(|e| with_suffix(&stem, e))
        .chain(SCRIPT_EXTENSIONS.iter().map(|e| with_suffix(&index, e)))
        .chain(std::iter::once(with_suffix(&stem, "json")));
    for candidate in candidates {
        if candidate.is_file() {
            return candidate.canonicalize().ok();
        }
    }
    None
}

fn with_suffix(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e))
        .unwrap_or(false)
}

fn is_script(path: &Path) -> bool {
    has_extension(path, SCRIPT_EXTENSIONS)
}

fn is_typescript(path: &Path) -> bool {
    has_extension(path, TYPESCRIPT_EXTENSIONS)
}
