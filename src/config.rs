//! Bundle configuration.
//!
//! Configuration is read from an optional `pumice.json` file in the
//! service directory and command line options are merged on top of it.
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveFormat, MAX_LEVEL};
use crate::compiler::SourceType;

/// Name of the configuration file in a service directory.
pub const CONFIG_FILE: &str = "pumice.json";

/// Default directory for compiled output inside the service directory.
pub const BUILD_DIR: &str = ".pumice";

/// Trait for types that can be merged.
pub trait Merge {
    /// Apply overrides from `from`.
    fn merge(&mut self, from: &Self);
}

/// Bundle configuration where every field is optional.
#[derive(Serialize, Deserialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfig {
    /// Entry points keyed by output name.
    pub entries: Option<IndexMap<String, PathBuf>>,
    /// Output directory for the archive.
    pub output: Option<PathBuf>,
    /// Archive format.
    pub format: Option<ArchiveFormat>,
    /// Compression level.
    pub level: Option<u32>,
    /// Module format of the compiled output.
    pub source_type: Option<SourceType>,
    /// Modules the compiler leaves as runtime imports.
    pub externals: Option<Vec<String>>,
    /// Modules included with all their files.
    pub force_include: Option<Vec<String>>,
    /// Modules that are never included.
    pub exclude: Option<Vec<String>>,
    /// Extra paths or patterns relative to the service directory.
    pub extras: Option<Vec<String>>,
    /// Modules that may be missing.
    pub optional_modules: Option<Vec<String>>,
    /// Patterns for paths the tracer ignores.
    pub ignore_paths: Option<Vec<String>>,
    /// Directory for compiled output relative to the service directory.
    pub build_dir: Option<PathBuf>,
    /// Fail when the trace is incomplete.
    pub strict: Option<bool>,
    /// Keep the compiled output after archiving.
    pub keep_build: Option<bool>,
}

fn merge_list(target: &mut Option<Vec<String>>, from: &Option<Vec<String>>) {
    if let Some(from) = from {
        let list = target.get_or_insert_with(Vec::new);
        for item in from {
            if !list.contains(item) {
                list.push(item.clone());
            }
        }
    }
}

fn merge_value<T: Clone>(target: &mut Option<T>, from: &Option<T>) {
    if from.is_some() {
        *target = from.clone();
    }
}

impl Merge for BundleConfig {
    fn merge(&mut self, from: &Self) {
        if let Some(entries) = &from.entries {
            let target = self.entries.get_or_insert_with(IndexMap::new);
            for (k, v) in entries.iter() {
                target.insert(k.to_string(), v.clone());
            }
        }
        merge_value(&mut self.output, &from.output);
        merge_value(&mut self.format, &from.format);
        merge_value(&mut self.level, &from.level);
        merge_value(&mut self.source_type, &from.source_type);
        merge_list(&mut self.externals, &from.externals);
        merge_list(&mut self.force_include, &from.force_include);
        merge_list(&mut self.exclude, &from.exclude);
        merge_list(&mut self.extras, &from.extras);
        merge_list(&mut self.optional_modules, &from.optional_modules);
        merge_list(&mut self.ignore_paths, &from.ignore_paths);
        merge_value(&mut self.build_dir, &from.build_dir);
        merge_value(&mut self.strict, &from.strict);
        merge_value(&mut self.keep_build, &from.keep_build);
    }
}

impl BundleConfig {
    /// Load a configuration file.
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let f = File::open(file).context(format!(
            "Unable to open config file {}",
            file.display()
        ))?;
        let reader = BufReader::new(f);
        let config: BundleConfig = serde_json::from_reader(reader)
            .context(format!("Failed to parse JSON in {}", file.display()))?;
        Ok(config)
    }

    /// Load the configuration file in a service directory when it exists.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Option<Self>> {
        let file = dir.as_ref().join(CONFIG_FILE);
        if file.is_file() {
            log::debug!("Config {}", file.display());
            Ok(Some(Self::load(file)?))
        } else {
            Ok(None)
        }
    }

    /// Convert to bundle options for a service directory.
    pub fn into_options<P: AsRef<Path>>(self, service_dir: P) -> BundleOptions {
        let defaults = BundleOptions::new(service_dir);
        BundleOptions {
            entries: self.entries.unwrap_or(defaults.entries),
            output: self.output.or(defaults.output),
            format: self.format.unwrap_or(defaults.format),
            level: self.level.unwrap_or(defaults.level),
            source_type: self.source_type.unwrap_or(defaults.source_type),
            externals: self.externals.unwrap_or(defaults.externals),
            force_include: self.force_include.unwrap_or(defaults.force_include),
            exclude: self.exclude.unwrap_or(defaults.exclude),
            extras: self.extras.unwrap_or(defaults.extras),
            optional_modules: self
                .optional_modules
                .unwrap_or(defaults.optional_modules),
            ignore_paths: self.ignore_paths.unwrap_or(defaults.ignore_paths),
            build_dir: self.build_dir.unwrap_or(defaults.build_dir),
            strict: self.strict.unwrap_or(defaults.strict),
            keep_build: self.keep_build.unwrap_or(defaults.keep_build),
            service_dir: defaults.service_dir,
        }
    }
}

/// Options for the bundle operation.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Directory of the service being bundled.
    pub service_dir: PathBuf,
    /// Entry points keyed by output name, relative to the service directory.
    pub entries: IndexMap<String, PathBuf>,
    /// Output directory for the archive.
    pub output: Option<PathBuf>,
    pub format: ArchiveFormat,
    pub level: u32,
    pub source_type: SourceType,
    pub externals: Vec<String>,
    pub force_include: Vec<String>,
    pub exclude: Vec<String>,
    pub extras: Vec<String>,
    pub optional_modules: Vec<String>,
    pub ignore_paths: Vec<String>,
    pub build_dir: PathBuf,
    pub strict: bool,
    pub keep_build: bool,
}

impl BundleOptions {
    /// Create options with the defaults for a service directory.
    pub fn new<P: AsRef<Path>>(service_dir: P) -> Self {
        Self {
            service_dir: service_dir.as_ref().to_path_buf(),
            entries: IndexMap::new(),
            output: None,
            format: Default::default(),
            level: MAX_LEVEL,
            source_type: Default::default(),
            externals: Vec::new(),
            force_include: Vec::new(),
            exclude: Vec::new(),
            extras: Vec::new(),
            optional_modules: vec![String::from("fsevents")],
            ignore_paths: Vec::new(),
            build_dir: PathBuf::from(BUILD_DIR),
            strict: false,
            keep_build: false,
        }
    }
}

/// Parse an entry point declared as `name=path` or `path`, without a
/// name the file stem is used.
pub fn parse_entry(value: &str) -> (String, PathBuf) {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() => {
            (name.to_string(), PathBuf::from(path))
        }
        _ => {
            let path = PathBuf::from(value.trim_start_matches('='));
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| value.to_string());
            (name, path)
        }
    }
}
