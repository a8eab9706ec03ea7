use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::json;

use pumice::{
    expand::{ExpandOptions, Expander, Inclusions},
    Error, Session,
};
use testing::Fixture;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn package(
    fx: &Fixture,
    name: &str,
    manifest: serde_json::Value,
) -> Result<()> {
    let dir = format!("node_modules/{}", name);
    fx.manifest(&dir, manifest)?;
    fx.file(format!("{}/index.js", dir), "module.exports = {};")?;
    Ok(())
}

#[test]
fn expand_circular_dependencies() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    package(
        &fx,
        "circular-pkg",
        json!({
            "name": "circular-pkg",
            "dependencies": {"circular-pkg-b": "1"}
        }),
    )?;
    package(
        &fx,
        "circular-pkg-b",
        json!({
            "name": "circular-pkg-b",
            "dependencies": {"circular-pkg": "1"}
        }),
    )?;

    let session = Session::new(fx.root())?;
    let mut expander = Expander::new(&session, Default::default());
    let mut inclusions = Inclusions::default();
    expander.expand("circular-pkg", &fx.root(), &[], &mut inclusions)?;

    assert_eq!(
        set(&[
            "node_modules/circular-pkg-b/index.js",
            "node_modules/circular-pkg-b/package.json",
            "node_modules/circular-pkg/index.js",
            "node_modules/circular-pkg/package.json",
        ]),
        inclusions.files
    );
    assert_eq!(2, expander.visited().len());

    let before = inclusions.clone();
    expander.expand("circular-pkg-b", &fx.root(), &[], &mut inclusions)?;
    assert_eq!(before.files, inclusions.files);
    assert_eq!(2, expander.visited().len());
    Ok(())
}

#[test]
fn expand_files_patterns() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.manifest(
        "node_modules/native",
        json!({
            "name": "native",
            "main": "lib/index.js",
            "files": ["lib", "build/Release/*.node", "index.d.ts"]
        }),
    )?;
    fx.file("node_modules/native/lib/index.js", "module.exports = {};")?;
    fx.file("node_modules/native/lib/index.d.ts", "export {};")?;
    fx.file("node_modules/native/lib/util/helpers.js", "")?;
    fx.file("node_modules/native/build/Release/addon.node", "")?;
    fx.file("node_modules/native/build/Release/obj/addon.o", "")?;
    fx.file("node_modules/native/README.md", "# native")?;

    let session = Session::new(fx.root())?;
    let mut expander = Expander::new(&session, Default::default());
    let mut inclusions = Inclusions::default();
    expander.expand("native", &fx.root(), &[], &mut inclusions)?;

    assert_eq!(
        set(&[
            "node_modules/native/build/Release/addon.node",
            "node_modules/native/lib/index.js",
            "node_modules/native/lib/util/helpers.js",
            "node_modules/native/package.json",
        ]),
        inclusions.files
    );
    assert!(inclusions.extras.is_empty());
    Ok(())
}

#[test]
fn expand_main_outside_files() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.manifest(
        "node_modules/sloppy",
        json!({"name": "sloppy", "main": "main", "files": ["dist"]}),
    )?;
    fx.file("node_modules/sloppy/main.js", "require('./dist/a');")?;
    fx.file("node_modules/sloppy/dist/a.js", "")?;

    let session = Session::new(fx.root())?;
    let mut expander = Expander::new(&session, Default::default());
    let mut inclusions = Inclusions::default();
    expander.expand("sloppy", &fx.root(), &[], &mut inclusions)?;

    assert_eq!(
        set(&[
            "node_modules/sloppy/dist/a.js",
            "node_modules/sloppy/main.js",
            "node_modules/sloppy/package.json",
        ]),
        inclusions.files
    );
    Ok(())
}

#[test]
fn expand_without_files_field() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    package(&fx, "plain", json!({"name": "plain"}))?;
    fx.file("node_modules/plain/lib/a.js", "")?;
    fx.file("node_modules/plain/index.d.ts", "export {};")?;

    let session = Session::new(fx.root())?;
    let mut expander = Expander::new(&session, Default::default());
    let mut inclusions = Inclusions::default();
    expander.expand("plain", &fx.root(), &[], &mut inclusions)?;

    assert_eq!(
        set(&[
            "node_modules/plain/index.js",
            "node_modules/plain/lib/a.js",
            "node_modules/plain/package.json",
        ]),
        inclusions.files
    );
    Ok(())
}

#[test]
fn expand_allowed_missing_modules() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    package(
        &fx,
        "watcher",
        json!({
            "name": "watcher",
            "dependencies": {"@types/node": "*", "fsevents": "2"},
            "optionalDependencies": {"native-helper": "1"}
        }),
    )?;

    let session = Session::new(fx.root())?;
    let mut expander = Expander::new(&session, Default::default());
    let mut inclusions = Inclusions::default();
    expander.expand("watcher", &fx.root(), &[], &mut inclusions)?;

    assert_eq!(3, expander.warnings().len());
    assert_eq!(2, inclusions.files.len());
    Ok(())
}

#[test]
fn expand_missing_dependency_is_fatal() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    package(
        &fx,
        "broken",
        json!({"name": "broken", "dependencies": {"ghost": "1"}}),
    )?;

    let session = Session::new(fx.root())?;
    let mut expander = Expander::new(&session, Default::default());
    let mut inclusions = Inclusions::default();
    let result = expander.expand("broken", &fx.root(), &[], &mut inclusions);
    match result {
        Err(Error::MissingDependency { name, chain }) => {
            assert_eq!("ghost", name);
            assert_eq!("broken -> ghost", chain);
        }
        _ => panic!("expected a missing dependency error"),
    }
    Ok(())
}

#[test]
fn expand_excluded_and_builtin_modules() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    package(
        &fx,
        "sdk-wrapper",
        json!({
            "name": "sdk-wrapper",
            "dependencies": {"aws-sdk": "2", "events": "3"}
        }),
    )?;
    package(&fx, "aws-sdk", json!({"name": "aws-sdk"}))?;

    let session = Session::new(fx.root())?;
    let options = ExpandOptions {
        exclude: vec![String::from("aws-sdk")],
        ..Default::default()
    };
    let mut expander = Expander::new(&session, options);
    let mut inclusions = Inclusions::default();
    expander.expand("sdk-wrapper", &fx.root(), &[], &mut inclusions)?;

    assert_eq!(
        set(&[
            "node_modules/sdk-wrapper/index.js",
            "node_modules/sdk-wrapper/package.json",
        ]),
        inclusions.files
    );
    assert!(expander.warnings().is_empty());
    Ok(())
}

#[cfg(unix)]
#[test]
fn expand_linked_package_alias() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "mono", "workspaces": ["packages/*"]}))?;
    fx.manifest("packages/api", json!({"name": "api"}))?;
    fx.manifest(
        "packages/lib",
        json!({"name": "@acme/lib", "files": ["index.js"]}),
    )?;
    fx.file("packages/lib/index.js", "module.exports = {};")?;
    fx.symlink("node_modules/@acme/lib", "../../packages/lib")?;

    let session = Session::new(fx.path("packages/api"))?;
    let mut expander = Expander::new(&session, Default::default());
    let mut inclusions = Inclusions::default();
    expander.expand("@acme/lib", session.start(), &[], &mut inclusions)?;

    assert_eq!(
        set(&["packages/lib/index.js", "packages/lib/package.json"]),
        inclusions.files
    );
    assert_eq!(set(&["node_modules/@acme/lib"]), inclusions.extras);
    Ok(())
}
