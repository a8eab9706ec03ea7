//! Collection of path helper functions.
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Convert a relative path to a `/` delimited string.
pub fn to_slash<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some(String::from("..")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Express `path` relative to `root` as a `/` delimited string.
///
/// Fails when the path is not inside the root.
pub fn relative_to<P: AsRef<Path>, R: AsRef<Path>>(
    path: P,
    root: R,
) -> Result<String> {
    path.as_ref()
        .strip_prefix(root.as_ref())
        .map(to_slash)
        .map_err(|_| Error::OutsideWorkspace {
            path: path.as_ref().to_path_buf(),
            root: root.as_ref().to_path_buf(),
        })
}

/// Compute the relative path that leads from the `base` directory
/// to `path`, both paths must be absolute or both relative.
pub fn diff_paths<P: AsRef<Path>, B: AsRef<Path>>(path: P, base: B) -> PathBuf {
    let path: Vec<Component> = path.as_ref().components().collect();
    let base: Vec<Component> = base.as_ref().components().collect();
    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base.len() {
        result.push("..");
    }
    for component in &path[common..] {
        result.push(component.as_os_str());
    }
    result
}

/// Determine if a string contains glob wildcard characters.
pub fn is_glob(s: &str) -> bool {
    s.contains(|c| matches!(c, '*' | '?' | '['))
}

/// Strip a leading `./` and trailing `/` from a relative location.
pub fn trim_relative(s: &str) -> &str {
    let s = s.trim_start_matches("./");
    s.trim_end_matches('/')
}
