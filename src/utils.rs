// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for embedsearch

use std::path::{Path, PathBuf};

/// The name of the store directory
pub const INDEX_DIR: &str = ".embedsearch";

/// File name of the SQLite store inside [`INDEX_DIR`]
pub const STORE_FILE: &str = "embeddings.sqlite";

/// Result of finding an index root
#[derive(Debug)]
pub struct IndexRoot {
    /// The directory containing the .embedsearch folder
    pub root: PathBuf,
    /// The full path to the .embedsearch folder
    pub index_path: PathBuf,
    /// Whether this is the current directory or a parent
    pub is_parent: bool,
}

/// Find the nearest .embedsearch directory by walking up from the given path.
/// Returns None if no .embedsearch directory is found.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<IndexRoot> {
    let mut current = start.as_ref().to_path_buf();

    // Canonicalize to handle relative paths
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    let original = current.clone();

    loop {
        let index_path = current.join(INDEX_DIR);
        if index_path.is_dir() {
            return Some(IndexRoot {
                root: current.clone(),
                index_path,
                is_parent: current != original,
            });
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Resolve the store file: an explicit path wins, then the nearest
/// `.embedsearch` directory above `start`, then `start/.embedsearch`.
pub fn resolve_store_path(explicit: Option<&Path>, start: impl AsRef<Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match find_index_root(&start) {
        Some(root) => root.index_path.join(STORE_FILE),
        None => start.as_ref().join(INDEX_DIR).join(STORE_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_index_root_in_current_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let result = find_index_root(dir.path()).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(!result.is_parent);
    }

    #[test]
    fn find_index_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(INDEX_DIR)).unwrap();

        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        let result = find_index_root(&subdir).unwrap();
        assert_eq!(result.root, dir.path().canonicalize().unwrap());
        assert!(result.is_parent);
    }

    #[test]
    fn find_index_root_none() {
        let dir = TempDir::new().unwrap();
        assert!(find_index_root(dir.path()).is_none());
    }

    #[test]
    fn resolve_store_path_fallback_and_explicit() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            resolve_store_path(None, dir.path()),
            dir.path().join(INDEX_DIR).join(STORE_FILE)
        );

        let explicit = dir.path().join("custom.sqlite");
        assert_eq!(resolve_store_path(Some(&explicit), dir.path()), explicit);
    }
}
