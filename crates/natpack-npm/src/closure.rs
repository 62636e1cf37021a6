//! Runtime dependency closure of an installed package.

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{NpmError, Result};
use crate::package::ManifestCache;
use crate::walk::{AncestorWalk, find_library};

/// A package found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    /// Package name as declared by its dependent
    pub name: String,
    /// Directory the package is installed in
    pub dir: PathBuf,
}

/// A package plus everything it needs at runtime, root first.
#[derive(Debug, Clone, Default)]
pub struct DependencyClosure {
    /// Packages in discovery order; the first entry is the root package
    pub packages: Vec<InstalledPackage>,
}

impl DependencyClosure {
    /// The root package of the closure.
    pub fn root(&self) -> Option<&InstalledPackage> {
        self.packages.first()
    }

    /// Number of packages in the closure.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Check if the closure is empty.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Collect `name` (installed at `dir`) and its production and optional
/// dependencies, resolving each the way `require` would from its dependent.
///
/// Missing optional dependencies are skipped; a missing production dependency
/// is an error since the copied tree would fail to load.
pub fn dependency_closure(
    walk: &dyn AncestorWalk,
    manifests: &ManifestCache,
    name: &str,
    dir: &Path,
) -> Result<DependencyClosure> {
    let mut closure = DependencyClosure::default();
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(InstalledPackage {
        name: name.to_string(),
        dir: dir.to_path_buf(),
    });

    while let Some(package) = queue.pop_front() {
        let key = package.dir.canonicalize().unwrap_or_else(|_| package.dir.clone());
        if !seen.insert(key) {
            continue;
        }

        let manifest = manifests.load_dir(&package.dir)?;
        for dep in manifest.dependencies.keys() {
            match find_library(walk, &package.dir, &[dep.as_str()]) {
                Some(dep_dir) => queue.push_back(InstalledPackage {
                    name: dep.clone(),
                    dir: dep_dir,
                }),
                None => {
                    warn!("{} depends on {} which is not installed", package.name, dep);
                    return Err(NpmError::PackageNotFound(dep.clone()));
                }
            }
        }
        for dep in manifest.optional_dependencies.keys() {
            if let Some(dep_dir) = find_library(walk, &package.dir, &[dep.as_str()]) {
                queue.push_back(InstalledPackage {
                    name: dep.clone(),
                    dir: dep_dir,
                });
            } else {
                debug!("Skipping missing optional dependency {} of {}", dep, package.name);
            }
        }

        closure.packages.push(package);
    }

    Ok(closure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::FsWalk;
    use std::fs;

    fn install(root: &Path, rel: &str, manifest: &str) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("package.json"), manifest).unwrap();
        dir
    }

    #[test]
    fn test_closure_follows_nested_and_hoisted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let sqlite = install(
            root,
            "node_modules/sqlite3",
            r#"{"name":"sqlite3","dependencies":{"bindings":"1","tar":"6"},"optionalDependencies":{"node-gyp":"8"}}"#,
        );
        install(root, "node_modules/bindings", r#"{"name":"bindings","dependencies":{"file-uri-to-path":"1"}}"#);
        install(root, "node_modules/file-uri-to-path", r#"{"name":"file-uri-to-path"}"#);
        install(root, "node_modules/sqlite3/node_modules/tar", r#"{"name":"tar"}"#);

        let walk = FsWalk::with_ceiling(root);
        let closure = dependency_closure(&walk, &ManifestCache::new(), "sqlite3", &sqlite).unwrap();

        let names: Vec<_> = closure.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["sqlite3", "bindings", "tar", "file-uri-to-path"]);
        assert_eq!(closure.packages[2].dir, sqlite.join("node_modules/tar"));
        assert_eq!(closure.root().unwrap().name, "sqlite3");
    }

    #[test]
    fn test_closure_missing_production_dependency() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = install(tmp.path(), "node_modules/a", r#"{"name":"a","dependencies":{"b":"1"}}"#);

        let walk = FsWalk::with_ceiling(tmp.path());
        let err = dependency_closure(&walk, &ManifestCache::new(), "a", &pkg).unwrap_err();
        assert!(matches!(err, NpmError::PackageNotFound(name) if name == "b"));
    }
}
