use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use swc_common::FileName;
use swc_ecma_loader::resolve::Resolve;

use pumice::{
    manifest::ManifestCache,
    module::{
        resolver::{NodeResolver, Resolution},
        ResolvedModule,
    },
    Session,
};
use testing::Fixture;

/// Resolver that counts lookups and only knows about built in modules.
struct CountingResolver {
    calls: Arc<AtomicUsize>,
}

impl Resolve for CountingResolver {
    fn resolve(
        &self,
        _base: &FileName,
        module_specifier: &str,
    ) -> Result<FileName, anyhow::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if pumice::module::builtins::is_builtin_module(module_specifier) {
            Ok(FileName::Custom(module_specifier.to_string()))
        } else {
            anyhow::bail!("not found")
        }
    }
}

#[test]
fn module_root_builtin_short_circuit() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;

    let calls = Arc::new(AtomicUsize::new(0));
    let resolver = CountingResolver {
        calls: Arc::clone(&calls),
    };
    let session = Session::with_resolver(
        fx.root(),
        Arc::new(ManifestCache::new()),
        Box::new(resolver),
    )?;

    let resolved = session.resolve_module_root("fs", &fx.root(), None)?;
    assert_eq!(ResolvedModule::Builtin(String::from("fs")), resolved);
    assert_eq!(1, calls.load(Ordering::SeqCst));

    let result = session.resolve_module_root("left-pad", &fx.root(), None);
    assert!(matches!(result, Err(ref e) if e.is_not_found()));
    Ok(())
}

#[test]
fn module_root_node_prefix_builtin() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    let session = Session::new(fx.root())?;
    assert_eq!(
        Resolution::Builtin(String::from("node:path")),
        session.resolve(&fx.root(), "node:path")?
    );
    Ok(())
}

#[test]
fn module_root_scoped_package() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.manifest(
        "node_modules/@acme/util",
        json!({"name": "@acme/util", "main": "lib/index.js"}),
    )?;
    fx.file("node_modules/@acme/util/lib/index.js", "module.exports = {};")?;

    let session = Session::new(fx.root())?;
    let resolved = session.resolve_module_root("@acme/util", &fx.root(), None)?;
    assert_eq!(
        ResolvedModule::Path(fx.path("node_modules/@acme/util")),
        resolved
    );
    Ok(())
}

#[test]
fn module_root_manifest_only_package() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.manifest("node_modules/@types/node", json!({"name": "@types/node"}))?;
    fx.file("node_modules/@types/node/index.d.ts", "export {};")?;

    let session = Session::new(fx.root())?;
    let resolved =
        session.resolve_module_root("@types/node", &fx.root(), None)?;
    assert_eq!(
        ResolvedModule::Path(fx.path("node_modules/@types/node")),
        resolved
    );
    Ok(())
}

#[test]
fn module_root_prefers_nested_install() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.manifest("node_modules/a", json!({"name": "a"}))?;
    fx.file("node_modules/a/index.js", "require('b');")?;
    fx.manifest("node_modules/b", json!({"name": "b", "version": "1.0.0"}))?;
    fx.file("node_modules/b/index.js", "")?;
    fx.manifest(
        "node_modules/a/node_modules/b",
        json!({"name": "b", "version": "2.0.0"}),
    )?;
    fx.file("node_modules/a/node_modules/b/index.js", "")?;

    let session = Session::new(fx.root())?;
    let parent = fx.path("node_modules/a");
    let resolved = session.resolve_module_root("b", &fx.root(), Some(&parent))?;
    assert_eq!(
        ResolvedModule::Path(fx.path("node_modules/a/node_modules/b")),
        resolved
    );

    let resolved = session.resolve_module_root("b", &fx.root(), None)?;
    assert_eq!(ResolvedModule::Path(fx.path("node_modules/b")), resolved);
    Ok(())
}

#[test]
fn module_root_exports_conditions() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "app"}))?;
    fx.manifest(
        "node_modules/dual",
        json!({
            "name": "dual",
            "exports": {
                ".": {"import": "./esm/index.mjs", "require": "./cjs/index.js"},
                "./feature": "./cjs/feature.js"
            }
        }),
    )?;
    fx.file("node_modules/dual/esm/index.mjs", "export default 1;")?;
    fx.file("node_modules/dual/cjs/index.js", "module.exports = 1;")?;
    fx.file("node_modules/dual/cjs/feature.js", "module.exports = 2;")?;

    let session = Session::new(fx.root())?;
    assert_eq!(
        Resolution::File(fx.path("node_modules/dual/cjs/index.js")),
        session.resolve(&fx.root(), "dual")?
    );
    assert_eq!(
        Resolution::File(fx.path("node_modules/dual/cjs/feature.js")),
        session.resolve(&fx.root(), "dual/feature")?
    );
    assert_eq!(
        ResolvedModule::Path(fx.path("node_modules/dual")),
        session.resolve_module_root("dual", &fx.root(), None)?
    );
    Ok(())
}

#[cfg(unix)]
#[test]
fn module_root_linked_workspace_package() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("", json!({"name": "mono", "workspaces": ["packages/*"]}))?;
    fx.manifest("packages/api", json!({"name": "api"}))?;
    fx.manifest("packages/lib-core", json!({"name": "@acme/lib"}))?;
    fx.file("packages/lib-core/index.js", "module.exports = {};")?;
    fx.symlink("node_modules/@acme/lib", "../../packages/lib-core")?;

    let session = Session::new(fx.path("packages/api"))?;
    assert_eq!(fx.root(), session.root());
    let resolved =
        session.resolve_module_root("@acme/lib", session.start(), None)?;
    assert_eq!(ResolvedModule::Path(fx.path("packages/lib-core")), resolved);
    Ok(())
}

#[test]
fn module_root_search_paths_and_builtins() -> Result<()> {
    let fx = Fixture::new()?;
    fx.manifest("app", json!({"name": "app"}))?;
    fx.file("app/index.js", "require('util-pkg');")?;
    fx.manifest(
        "shared/node_modules/util-pkg",
        json!({"name": "util-pkg", "main": "lib/main"}),
    )?;
    fx.file("shared/node_modules/util-pkg/lib/main.js", "")?;

    let manifests = Arc::new(ManifestCache::new());
    let resolver = NodeResolver::new(Arc::clone(&manifests))
        .with_search_paths(vec![fx.path("shared/node_modules")])
        .with_builtins(|s| s == "electron");
    let session =
        Session::with_resolver(fx.path("app"), manifests, Box::new(resolver))?;

    let from = fx.path("app/index.js");
    assert_eq!(
        Resolution::File(fx.path("shared/node_modules/util-pkg/lib/main.js")),
        session.resolve(&from, "util-pkg")?
    );
    assert_eq!(
        Resolution::Builtin(String::from("electron")),
        session.resolve(&from, "electron")?
    );

    let resolved = session.resolve_module_root("util-pkg", &from, None)?;
    assert_eq!(
        ResolvedModule::Path(fx.path("shared/node_modules/util-pkg")),
        resolved
    );
    Ok(())
}
