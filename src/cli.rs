//! Command line parsing exposed via the library.
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use structopt::StructOpt;

use crate::archive::ArchiveFormat;
use crate::compiler::{SourceType, SwcCompiler};
use crate::config::{parse_entry, BundleConfig, Merge};
use crate::expand::{ExpandOptions, Expander, Inclusions};
use crate::printer::{PrintOptions, Printer};
use crate::session::Session;
use crate::trace::{TraceOptions, Tracer};

#[derive(StructOpt)]
#[structopt(about = "Package Node.js services into deployable archives")]
enum PumiceCommands {
    /// Compile, trace and archive a service
    Bundle {
        /// Service directory
        #[structopt(short = "C", long, default_value = ".", parse(from_os_str))]
        dir: PathBuf,
        /// Config file, defaults to pumice.json in the service directory
        #[structopt(short, long, parse(from_os_str))]
        config: Option<PathBuf>,
        /// Output directory for the archive
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
        /// Archive format (zip or tgz)
        #[structopt(short, long)]
        format: Option<ArchiveFormat>,
        /// Compression level from 0 to 9
        #[structopt(short, long)]
        level: Option<u32>,
        /// Module format of the compiled output (commonjs or module)
        #[structopt(short = "t", long)]
        source_type: Option<SourceType>,
        /// Modules left as runtime imports by the compiler
        #[structopt(long)]
        external: Vec<String>,
        /// Modules included with all their files
        #[structopt(long)]
        force_include: Vec<String>,
        /// Modules that are never included
        #[structopt(long)]
        exclude: Vec<String>,
        /// Extra paths or patterns relative to the service directory
        #[structopt(long)]
        extra: Vec<String>,
        /// Fail when a reference cannot be traced
        #[structopt(long)]
        strict: bool,
        /// Keep the compiled output
        #[structopt(long)]
        keep_build: bool,
        /// Entry points as `name=path` or `path`
        entries: Vec<String>,
    },

    /// Trace the files required by entry points
    Trace {
        /// Print the reason tree
        #[structopt(long)]
        tree: bool,
        /// Print the trace result as JSON
        #[structopt(short, long)]
        json: bool,
        /// Fail when a reference cannot be traced
        #[structopt(long)]
        strict: bool,
        /// Project directory, defaults to the directory of the first entry
        #[structopt(short = "C", long, parse(from_os_str))]
        dir: Option<PathBuf>,
        /// Entry files
        #[structopt(parse(from_os_str))]
        entries: Vec<PathBuf>,
    },

    /// Print the files a module contributes from its manifest
    Expand {
        /// Project directory
        #[structopt(short = "C", long, default_value = ".", parse(from_os_str))]
        dir: PathBuf,
        /// Module name
        module: String,
    },

    /// Print the workspace root for a directory
    Root {
        /// Start directory
        #[structopt(default_value = ".", parse(from_os_str))]
        dir: PathBuf,
    },
}

/// Parse the given arguments list or `std::env::os_args` and run the program.
pub fn run<T>(argv: Option<Vec<T>>) -> Result<()>
where
    T: Into<OsString> + Clone,
{
    if std::env::var("RUST_LOG").ok().is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init();

    let app = PumiceCommands::clap();
    let matches = if let Some(argv) = argv {
        app.get_matches_from(argv)
    } else {
        app.get_matches()
    };
    let args = PumiceCommands::from_clap(&matches);
    match args {
        PumiceCommands::Bundle {
            dir,
            config,
            output,
            format,
            level,
            source_type,
            external,
            force_include,
            exclude,
            extra,
            strict,
            keep_build,
            entries,
        } => {
            let overrides = BundleConfig {
                entries: non_empty(entries)
                    .map(|e| e.iter().map(|s| parse_entry(s)).collect()),
                output,
                format,
                level,
                source_type,
                externals: non_empty(external),
                force_include: non_empty(force_include),
                exclude: non_empty(exclude),
                extras: non_empty(extra),
                strict: if strict { Some(true) } else { None },
                keep_build: if keep_build { Some(true) } else { None },
                ..Default::default()
            };
            bundle(&dir, config, overrides)?;
        }
        PumiceCommands::Trace {
            tree,
            json,
            strict,
            dir,
            entries,
        } => {
            trace(entries, dir, tree, json, strict)?;
        }
        PumiceCommands::Expand { dir, module } => expand(&dir, &module)?,
        PumiceCommands::Root { dir } => {
            let session = Session::new(&dir)?;
            println!("{}", session.root().display());
        }
    }
    Ok(())
}

fn non_empty(list: Vec<String>) -> Option<Vec<String>> {
    if list.is_empty() {
        None
    } else {
        Some(list)
    }
}

fn bundle(
    dir: &Path,
    config: Option<PathBuf>,
    overrides: BundleConfig,
) -> Result<()> {
    let mut settings = match config {
        Some(file) => BundleConfig::load(file)?,
        None => BundleConfig::discover(dir)?.unwrap_or_default(),
    };
    settings.merge(&overrides);

    let options = settings.into_options(dir);
    let report = crate::bundle::bundle(&options, &SwcCompiler::new())
        .context(format!("Failed to bundle {}", dir.display()))?;

    for warning in report.warnings.iter() {
        log::warn!("{}", warning);
    }
    println!(
        "{} ({} entries, {} bytes)",
        report.archive.path.display(),
        report.archive.entries,
        report.archive.bytes_written
    );
    Ok(())
}

fn trace(
    entries: Vec<PathBuf>,
    dir: Option<PathBuf>,
    tree: bool,
    json: bool,
    strict: bool,
) -> Result<()> {
    for f in entries.iter() {
        if !f.is_file() {
            bail!("Entry point {:?} does not exist", f);
        }
    }
    let start = match dir {
        Some(dir) => dir,
        None => match entries.first().and_then(|f| f.parent()) {
            Some(parent) if !parent.as_os_str().is_empty() => {
                parent.to_path_buf()
            }
            Some(_) => PathBuf::from("."),
            None => bail!("No entry points given"),
        },
    };

    let session = Session::new(&start)?;
    let tracer = Tracer::new(
        &session,
        TraceOptions {
            strict,
            ..Default::default()
        },
    );
    let result = tracer.trace(&entries)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if tree {
        let printer = Printer::new(&result);
        printer.print(&mut io::stdout(), &PrintOptions { include_kind: true })?;
    } else {
        for file in result.files.iter() {
            println!("{}", file);
        }
    }
    Ok(())
}

fn expand(dir: &Path, module: &str) -> Result<()> {
    let session = Session::new(dir)?;
    let mut inclusions = Inclusions::default();
    let mut expander = Expander::new(&session, ExpandOptions::default());
    expander
        .expand(module, session.start(), &[], &mut inclusions)
        .context(format!("Failed to expand {}", module))?;
    for file in inclusions.files.iter().chain(inclusions.extras.iter()) {
        println!("{}", file);
    }
    Ok(())
}
