//! Helpers to determine the base directory for a module.
use std::path::{Path, PathBuf};

use super::builtins::package_basename;
use crate::manifest::ManifestCache;

/// Find the root directory for a module using the module name and the
/// resolved entry file for the module.
///
/// Walks up from the entry looking for a directory named after the last
/// segment of the module name that contains a manifest. The nearest
/// manifest is not enough as deeply nested or linked packages would
/// otherwise resolve to the manifest of a parent package.
pub fn module_root_directory(
    manifests: &ManifestCache,
    name: &str,
    entry: &Path,
) -> Option<PathBuf> {
    let basename = package_basename(name);
    let start = if entry.is_dir() { entry } else { entry.parent()? };
    start
        .ancestors()
        .find(|dir| {
            dir.file_name().map(|n| n == basename).unwrap_or(false)
                && has_manifest(manifests, dir)
        })
        .or_else(|| {
            start
                .ancestors()
                .find(|dir| declares_name(manifests, dir, name))
        })
        .map(|dir| dir.to_path_buf())
}

fn has_manifest(manifests: &ManifestCache, dir: &Path) -> bool {
    matches!(manifests.load(dir), Ok(Some(_)))
}

/// Linked workspace packages may live in a directory that is not
/// named after the package.
fn declares_name(manifests: &ManifestCache, dir: &Path, name: &str) -> bool {
    match manifests.load(dir) {
        Ok(Some(manifest)) => manifest.name() == name,
        _ => false,
    }
}

/// Locate the installed `node_modules/<name>` location for a package by
/// walking up from `base`.
///
/// The location is returned as found, links are not followed.
pub fn locate_package_dir(name: &str, base: &Path) -> Option<PathBuf> {
    base.ancestors()
        .filter(|dir| {
            dir.file_name().map(|n| n != "node_modules").unwrap_or(true)
        })
        .map(|dir| dir.join("node_modules").join(name))
        .find(|candidate| candidate.symlink_metadata().is_ok())
}

/// Determine if a directory is an installed package location,
/// `node_modules/<name>` or `node_modules/@scope/<name>`.
pub fn is_installed_package(dir: &Path) -> bool {
    let is_modules =
        |p: &Path| p.file_name().map(|n| n == "node_modules").unwrap_or(false);
    match dir.parent() {
        Some(parent) if is_modules(parent) => true,
        Some(parent) => {
            let is_scope = parent
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('@'))
                .unwrap_or(false);
            is_scope && parent.parent().map(is_modules).unwrap_or(false)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_package_locations() {
        assert!(is_installed_package(Path::new("/ws/node_modules/pad")));
        assert!(is_installed_package(Path::new("/ws/node_modules/@acme/lib")));
        assert!(!is_installed_package(Path::new(
            "/ws/node_modules/rx/operators"
        )));
        assert!(!is_installed_package(Path::new("/ws/packages/lib")));
    }
}
