//! Ancestor directory walking.
//!
//! Every lookup that depends on where a module sits in a `node_modules` tree
//! goes through [`AncestorWalk`], so callers (and tests) can bound or replace
//! the walk without touching the lookups themselves.

use std::path::{Path, PathBuf};

/// Produces the ordered list of directories to search, nearest first.
pub trait AncestorWalk: Send + Sync {
    /// Directories from `start` up to the filesystem root (or a ceiling).
    fn ancestors(&self, start: &Path) -> Vec<PathBuf>;
}

/// Filesystem walk that stops at an optional ceiling directory.
#[derive(Debug, Clone, Default)]
pub struct FsWalk {
    ceiling: Option<PathBuf>,
}

impl FsWalk {
    /// Walk all the way to the filesystem root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk no further up than `ceiling` (inclusive).
    pub fn with_ceiling(ceiling: impl Into<PathBuf>) -> Self {
        Self {
            ceiling: Some(ceiling.into()),
        }
    }
}

impl AncestorWalk for FsWalk {
    fn ancestors(&self, start: &Path) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for dir in start.ancestors() {
            if dir.as_os_str().is_empty() {
                break;
            }
            dirs.push(dir.to_path_buf());
            if self.ceiling.as_deref() == Some(dir) {
                break;
            }
        }
        dirs
    }
}

/// Every existing `node_modules` directory visible from `start`, nearest first.
pub fn node_modules_dirs(walk: &dyn AncestorWalk, start: &Path) -> Vec<PathBuf> {
    walk.ancestors(start)
        .into_iter()
        .filter(|dir| dir.file_name().is_none_or(|name| name != "node_modules"))
        .map(|dir| dir.join("node_modules"))
        .filter(|candidate| candidate.is_dir())
        .collect()
}

/// Nearest directory at or above `start` that looks like a package root:
/// it holds a `package.json` or a `node_modules` folder.
pub fn package_root(walk: &dyn AncestorWalk, start: &Path) -> Option<PathBuf> {
    walk.ancestors(start).into_iter().find(|dir| {
        dir.join("package.json").is_file() || dir.join("node_modules").is_dir()
    })
}

/// Find an installed library the way `require` would from `start`.
///
/// At each ancestor the names are tried in order before moving up, so a copy
/// nested inside the requesting package wins over a hoisted one.
pub fn find_library(walk: &dyn AncestorWalk, start: &Path, names: &[&str]) -> Option<PathBuf> {
    for dir in walk.ancestors(start) {
        for name in names {
            let candidate = dir.join("node_modules").join(name);
            if candidate.join("package.json").is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_ceiling_bounds_walk() {
        let walk = FsWalk::with_ceiling("/a/b");
        let dirs = walk.ancestors(Path::new("/a/b/c/d"));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/a/b/c/d"),
                PathBuf::from("/a/b/c"),
                PathBuf::from("/a/b"),
            ]
        );
    }

    #[test]
    fn test_node_modules_dirs_nearest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let nested = root.join("node_modules/pkg/node_modules");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg/lib")).unwrap();

        let walk = FsWalk::with_ceiling(root);
        let found = node_modules_dirs(&walk, &root.join("node_modules/pkg/lib"));
        assert_eq!(found, vec![nested, root.join("node_modules")]);
    }

    #[test]
    fn test_find_library_prefers_nested_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for dir in [
            "node_modules/@mapbox/node-pre-gyp",
            "node_modules/sqlite3/node_modules/node-pre-gyp",
        ] {
            fs::create_dir_all(root.join(dir)).unwrap();
            fs::write(root.join(dir).join("package.json"), "{}").unwrap();
        }
        fs::create_dir_all(root.join("node_modules/sqlite3/lib")).unwrap();

        let walk = FsWalk::with_ceiling(root);
        let found = find_library(
            &walk,
            &root.join("node_modules/sqlite3/lib"),
            &["@mapbox/node-pre-gyp", "node-pre-gyp"],
        );
        assert_eq!(
            found,
            Some(root.join("node_modules/sqlite3/node_modules/node-pre-gyp"))
        );
    }

    #[test]
    fn test_package_root() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = tmp.path().join("node_modules/fsevents");
        fs::create_dir_all(pkg.join("lib")).unwrap();
        fs::write(pkg.join("package.json"), "{}").unwrap();

        let walk = FsWalk::with_ceiling(tmp.path());
        assert_eq!(package_root(&walk, &pkg.join("lib")), Some(pkg));
    }
}
