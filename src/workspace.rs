//! Locate the workspace root for a directory.
//!
//! The workspace root is the nearest ancestor whose manifest declares
//! workspace patterns that include the start directory. All archive
//! paths are expressed relative to this directory.
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::Result;
use crate::helpers::{to_slash, trim_relative};
use crate::manifest::ManifestCache;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Find the workspace root for `start`.
///
/// When a manifest declares workspace patterns that do not include
/// `start` the search stops and `start` is returned as it is not a
/// member of that workspace.
pub fn find_workspace_root<P: AsRef<Path>>(
    manifests: &ManifestCache,
    start: P,
) -> Result<PathBuf> {
    let start = start.as_ref();
    let mut current = start.to_path_buf();
    loop {
        if let Some(manifest) = manifests.load(&current)? {
            if let Some(patterns) = manifest.workspace_patterns() {
                let rel =
                    to_slash(start.strip_prefix(&current).unwrap_or(start));
                if rel.is_empty() || matches_workspace(patterns, &rel)? {
                    log::debug!("Workspace root {}", current.display());
                    return Ok(current);
                }
                log::debug!(
                    "{} is not a member of the workspace at {}",
                    start.display(),
                    current.display()
                );
                return Ok(start.to_path_buf());
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(start.to_path_buf()),
        }
    }
}

/// Test a relative path against workspace patterns.
///
/// Patterns prefixed with `!` exclude paths matched by earlier patterns.
pub fn matches_workspace(patterns: &[String], rel: &str) -> Result<bool> {
    let mut matched = false;
    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            let negated = Pattern::new(trim_relative(negated))?;
            if negated.matches_with(rel, MATCH_OPTIONS) {
                matched = false;
            }
        } else {
            let pattern = Pattern::new(trim_relative(pattern))?;
            if pattern.matches_with(rel, MATCH_OPTIONS) {
                matched = true;
            }
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn star_matches_single_level() {
        let list = patterns(&["packages/*"]);
        assert!(matches_workspace(&list, "packages/api").unwrap());
        assert!(!matches_workspace(&list, "packages/api/nested").unwrap());
        assert!(!matches_workspace(&list, "apps/web").unwrap());
    }

    #[test]
    fn negated_pattern_excludes() {
        let list = patterns(&["./packages/**", "!packages/private"]);
        assert!(matches_workspace(&list, "packages/api").unwrap());
        assert!(!matches_workspace(&list, "packages/private").unwrap());
    }
}
