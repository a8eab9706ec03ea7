use std::collections::BTreeSet;

use anyhow::Result;
use glob::Pattern;
use serde_json::json;

use pumice::{
    trace::{ReasonKind, TraceOptions, Tracer, WarningKind},
    Error, Session,
};
use testing::Fixture;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn left_pad_fixture() -> Result<Fixture> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app", "dependencies": {"left-pad": "1"}}))?;
    fx.file(
        "index.js",
        r#"
        const util = require('./util');
        const pad = require('left-pad');
        module.exports = () => pad(util.name, 10);
        "#,
    )?;
    fx.file("util.js", "exports.name = 'util';")?;
    fx.manifest(
        "node_modules/left-pad",
        json!({"name": "left-pad", "files": ["index.js"]}),
    )?;
    fx.file(
        "node_modules/left-pad/index.js",
        "module.exports = function (s) { return s; };",
    )?;
    fx.file("node_modules/left-pad/README.md", "# left-pad")?;
    Ok(fx)
}

#[test]
fn trace_left_pad() -> Result<()> {
    let fx = left_pad_fixture()?;
    let session = Session::new(fx.root())?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("index.js")])?;

    assert_eq!(
        set(&[
            "node_modules/left-pad/index.js",
            "node_modules/left-pad/package.json",
            "package.json",
            "util.js",
        ]),
        result.files
    );
    assert!(result.warnings.is_empty());

    assert_eq!(ReasonKind::Entry, result.reasons["index.js"].kind);
    let util = &result.reasons["util.js"];
    assert_eq!(ReasonKind::Require, util.kind);
    assert!(util.parents.contains("index.js"));
    assert_eq!(
        ReasonKind::Manifest,
        result.reasons["node_modules/left-pad/package.json"].kind
    );
    Ok(())
}

#[test]
fn trace_esm_closure() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app", "type": "module"}))?;
    fx.file(
        "src/main.mjs",
        r#"
        import { a } from './a.mjs';
        import fs from 'fs';
        const later = () => import('./lazy/c.mjs');
        export default a;
        "#,
    )?;
    fx.file("src/a.mjs", "export * from './b.mjs';\nexport const a = 1;")?;
    fx.file(
        "src/b.mjs",
        "import data from '../data.json';\nexport const b = data;",
    )?;
    fx.file(
        "src/lazy/c.mjs",
        "import { a } from '../a.mjs';\nexport const c = a;",
    )?;
    fx.file("data.json", "{}")?;

    let session = Session::new(fx.root())?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("src/main.mjs")])?;

    assert_eq!(
        set(&[
            "data.json",
            "package.json",
            "src/a.mjs",
            "src/b.mjs",
            "src/lazy/c.mjs",
        ]),
        result.files
    );
    assert!(!result.files.contains("src/main.mjs"));
    assert!(result.files.iter().all(|f| !f.starts_with("..")));
    assert_eq!(
        ReasonKind::DynamicImport,
        result.reasons["src/lazy/c.mjs"].kind
    );
    assert!(result.warnings.is_empty());
    Ok(())
}

#[test]
fn trace_dynamic_and_unresolved_warnings() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.file(
        "index.js",
        r#"
        const name = 'plugin-' + process.env.PLUGIN;
        const plugin = require(name);
        const missing = require('not-installed');
        const local = require('./local');
        "#,
    )?;
    fx.file("local.js", "module.exports = 1;")?;

    let session = Session::new(fx.root())?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("index.js")])?;

    assert_eq!(set(&["local.js", "package.json"]), result.files);
    assert_eq!(2, result.warnings.len());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::Dynamic && w.file == "index.js"));
    assert!(result.warnings.iter().any(|w| {
        w.kind == WarningKind::Unresolved
            && w.specifier.as_deref() == Some("not-installed")
    }));
    Ok(())
}

#[test]
fn trace_strict_fails_after_traversal() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.file("index.js", "require('./local'); require('not-installed');")?;
    fx.file("local.js", "module.exports = 1;")?;

    let session = Session::new(fx.root())?;
    let options = TraceOptions {
        strict: true,
        ..Default::default()
    };
    let result = Tracer::new(&session, options).trace(&[fx.path("index.js")]);
    match result {
        Err(Error::TraceIncomplete(misses)) => {
            assert_eq!(1, misses.len());
            assert!(misses[0].contains("not-installed"));
        }
        _ => panic!("expected an incomplete trace"),
    }
    Ok(())
}

#[test]
fn trace_builtins_are_skipped() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.file(
        "index.js",
        r#"
        const fs = require('fs');
        const path = require('node:path');
        const p = require('fs/promises');
        "#,
    )?;

    let session = Session::new(fx.root())?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("index.js")])?;
    assert_eq!(set(&["package.json"]), result.files);
    assert!(result.warnings.is_empty());
    Ok(())
}

#[test]
fn trace_ignored_packages_and_paths() -> Result<()> {
    let fx = left_pad_fixture()?;
    fx.file(
        "index.js",
        "require('./util'); require('./fixtures/big'); require('left-pad');",
    )?;
    fx.file("fixtures/big.js", "module.exports = 'big';")?;

    let session = Session::new(fx.root())?;
    let options = TraceOptions {
        ignore_packages: vec![String::from("left-pad")],
        ignore_paths: vec![Pattern::new("fixtures/**")?],
        ..Default::default()
    };
    let result = Tracer::new(&session, options).trace(&[fx.path("index.js")])?;
    assert_eq!(set(&["package.json", "util.js"]), result.files);
    Ok(())
}

#[test]
fn trace_emitted_files_are_excluded() -> Result<()> {
    let fx = left_pad_fixture()?;
    fx.file("build/index.js", "require('./chunk'); require('left-pad');")?;
    fx.file("build/chunk.js", "require('../util');")?;

    let session = Session::new(fx.root())?;
    let options = TraceOptions {
        emitted_dirs: vec![fx.path("build")],
        ..Default::default()
    };
    let result =
        Tracer::new(&session, options).trace(&[fx.path("build/index.js")])?;
    assert_eq!(
        set(&[
            "node_modules/left-pad/index.js",
            "node_modules/left-pad/package.json",
            "package.json",
            "util.js",
        ]),
        result.files
    );
    assert!(result.reasons.contains_key("build/chunk.js"));
    Ok(())
}

#[test]
fn trace_cycles_terminate() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.file("index.js", "require('./a');")?;
    fx.file("a.js", "require('./b'); require('./index');")?;
    fx.file("b.js", "require('./a');")?;

    let session = Session::new(fx.root())?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("index.js")])?;
    assert_eq!(set(&["a.js", "b.js", "package.json"]), result.files);
    assert!(result.reasons["a.js"].parents.contains("b.js"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn trace_linked_package() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "mono", "workspaces": ["packages/*"]}))?;
    fx.manifest("packages/api", json!({"name": "api"}))?;
    fx.file("packages/api/index.js", "require('@acme/lib');")?;
    fx.manifest("packages/lib", json!({"name": "@acme/lib"}))?;
    fx.file("packages/lib/index.js", "module.exports = {};")?;
    fx.symlink("node_modules/@acme/lib", "../../packages/lib")?;

    let session = Session::new(fx.path("packages/api"))?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("packages/api/index.js")])?;
    assert_eq!(
        set(&[
            "packages/api/package.json",
            "packages/lib/index.js",
            "packages/lib/package.json",
        ]),
        result.files
    );
    assert_eq!(set(&["node_modules/@acme/lib"]), result.links);
    Ok(())
}

#[test]
fn trace_tree_printer() -> Result<()> {
    let fx = left_pad_fixture()?;
    let session = Session::new(fx.root())?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("index.js")])?;

    let printer = pumice::printer::Printer::new(&result);
    let mut out = Vec::new();
    printer.print(&mut out, &Default::default())?;
    let tree = String::from_utf8(out)?;
    let lines: Vec<&str> = tree.lines().collect();
    assert_eq!("index.js", lines[0]);
    assert!(lines.iter().any(|l| l.ends_with("util.js")));
    assert!(lines
        .iter()
        .any(|l| l.ends_with("node_modules/left-pad/package.json")));
    Ok(())
}

#[test]
fn trace_outside_workspace_is_fatal() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("app", json!({"name": "app"}))?;
    fx.file("app/index.js", "require('../shared');")?;
    fx.file("shared.js", "module.exports = {};")?;

    let session = Session::new(fx.path("app"))?;
    assert_eq!(fx.path("app"), session.root());
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("app/index.js")]);
    assert!(matches!(result, Err(Error::OutsideWorkspace { .. })));
    Ok(())
}

#[test]
fn trace_directory_manifests() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.file("index.js", "require('./lib'); require('rx/operators');")?;
    fx.manifest("lib", json!({"main": "src/entry.js"}))?;
    fx.file("lib/src/entry.js", "module.exports = 1;")?;
    fx.manifest("node_modules/rx", json!({"name": "rx"}))?;
    fx.file("node_modules/rx/index.js", "module.exports = {};")?;
    fx.manifest(
        "node_modules/rx/operators",
        json!({"main": "../dist/operators.js"}),
    )?;
    fx.file("node_modules/rx/dist/operators.js", "require('./esm/map');")?;
    fx.manifest("node_modules/rx/dist/esm", json!({"type": "module"}))?;
    fx.file("node_modules/rx/dist/esm/map.js", "export const map = 1;")?;

    let session = Session::new(fx.root())?;
    let result = Tracer::new(&session, Default::default())
        .trace(&[fx.path("index.js")])?;

    assert_eq!(
        set(&[
            "lib/package.json",
            "lib/src/entry.js",
            "node_modules/rx/dist/esm/map.js",
            "node_modules/rx/dist/esm/package.json",
            "node_modules/rx/dist/operators.js",
            "node_modules/rx/operators/package.json",
            "node_modules/rx/package.json",
            "package.json",
        ]),
        result.files
    );
    assert_eq!(
        ReasonKind::Manifest,
        result.reasons["lib/package.json"].kind
    );
    assert!(result.reasons["node_modules/rx/operators/package.json"]
        .parents
        .contains("index.js"));
    assert!(result.reasons["node_modules/rx/dist/esm/package.json"]
        .parents
        .contains("node_modules/rx/dist/esm/map.js"));
    assert!(result.warnings.is_empty());
    Ok(())
}

#[test]
fn trace_plain_template_require() -> Result<()> {
    let fx = left_pad_fixture()?;
    fx.file("index.js", "const util = require(`./util`);")?;

    let session = Session::new(fx.root())?;
    let options = TraceOptions {
        strict: true,
        ..Default::default()
    };
    let result = Tracer::new(&session, options).trace(&[fx.path("index.js")])?;
    assert_eq!(set(&["package.json", "util.js"]), result.files);
    assert_eq!(ReasonKind::Require, result.reasons["util.js"].kind);
    Ok(())
}
