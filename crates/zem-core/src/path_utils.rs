//! Path helpers shared by the scanners, the context preview and the shells

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Canonicalize a path, resolving symlinks and producing an absolute path.
///
/// On Windows, uses `dunce::canonicalize` to avoid the `\\?\` extended-length path prefix
/// that `std::fs::canonicalize` produces, which editors cannot open.
#[cfg(windows)]
pub fn canonicalize(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    dunce::canonicalize(path)
}

#[cfg(not(windows))]
pub fn canonicalize(path: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    std::fs::canonicalize(path)
}

/// Path of `path` relative to `root` with forward slashes, as stored in entries.
/// Paths outside of `root` stay absolute.
pub fn entry_path(path: &Path, root: &Path) -> String {
    let relative = pathdiff::diff_paths(path, root)
        .filter(|p| !p.starts_with(".."))
        .unwrap_or_else(|| path.to_path_buf());

    let display = relative.to_string_lossy();
    if cfg!(windows) {
        display.replace('\\', "/")
    } else {
        display.into_owned()
    }
}

/// Resolve an entry's file against the index root
pub fn resolve(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Stable key for a project directory, used to place its database outside the tree
pub fn project_key(project_path: &Path) -> Result<String> {
    let project_str = project_path
        .to_str()
        .ok_or_else(|| Error::InvalidPath(project_path.to_path_buf()))?;

    Ok(blake3::hash(project_str.as_bytes()).to_hex().to_string())
}
