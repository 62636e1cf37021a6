// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Verbatim mirroring of a package and its runtime dependencies

use natpack_npm::{AncestorWalk, ManifestCache, dependency_closure, find_library};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{NativeError, Result};

/// Folder under the output directory holding mirrored packages
pub const MIRROR_DIR: &str = "node_natives";

/// What to copy for one forced package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPlan {
    /// The forced package
    pub package: String,
    /// Where the forced package itself lands
    pub target: PathBuf,
    /// Source and destination directory of every package in the closure
    pub packages: Vec<(PathBuf, PathBuf)>,
}

/// Plan the mirror of `name` (installed as seen from `root`) under
/// `<out>/node_natives/node_modules`.
///
/// The tree is flat: when two packages of the same name appear in the
/// closure, the one nearest the forced package wins.
pub fn plan(
    walk: &dyn AncestorWalk,
    manifests: &ManifestCache,
    root: &Path,
    name: &str,
    out: &Path,
) -> Result<MirrorPlan> {
    let dir = find_library(walk, root, &[name])
        .ok_or_else(|| NativeError::bundler(name, "package is not installed"))?;
    let closure = dependency_closure(walk, manifests, name, &dir)?;
    let modules = out.join(MIRROR_DIR).join("node_modules");

    let mut seen = HashSet::new();
    let mut packages = Vec::new();
    for package in closure.packages {
        if !seen.insert(package.name.clone()) {
            debug!("Skipping second copy of {} at {}", package.name, package.dir.display());
            continue;
        }
        packages.push((package.dir, modules.join(&package.name)));
    }

    Ok(MirrorPlan {
        package: name.to_string(),
        target: modules.join(name),
        packages,
    })
}

/// Copy every planned package, returning the number of files written.
pub async fn copy(plan: &MirrorPlan) -> Result<usize> {
    let packages = plan.packages.clone();
    tokio::task::spawn_blocking(move || {
        packages
            .iter()
            .map(|(from, to)| copy_package(from, to))
            .sum::<Result<usize>>()
    })
    .await
    .map_err(|e| NativeError::bundler(&plan.package, e.to_string()))?
}

/// Copy a package directory, leaving out its nested `node_modules`.
fn copy_package(from: &Path, to: &Path) -> Result<usize> {
    let mut files = 0;
    let entries = WalkDir::new(from)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != "node_modules");
    for entry in entries {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else {
            std::fs::copy(entry.path(), &dest).map_err(|source| NativeError::Copy {
                from: entry.path().to_path_buf(),
                to: dest.clone(),
                source,
            })?;
            files += 1;
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use natpack_npm::FsWalk;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_mirror_closure() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        write(root, "package.json", r#"{"dependencies":{"serialport":"12"}}"#);
        write(
            root,
            "node_modules/serialport/package.json",
            r#"{"name":"serialport","dependencies":{"debug":"4"}}"#,
        );
        write(root, "node_modules/serialport/dist/index.js", "module.exports = {}");
        write(root, "node_modules/serialport/build/Release/bindings.node", "bin");
        write(root, "node_modules/serialport/node_modules/.cache/x", "skip me");
        write(root, "node_modules/debug/package.json", r#"{"name":"debug"}"#);
        write(root, "node_modules/debug/index.js", "");

        let out = root.join("dist/native");
        let walk = FsWalk::with_ceiling(root);
        let plan = plan(&walk, &ManifestCache::new(), root, "serialport", &out).unwrap();
        assert_eq!(plan.target, out.join("node_natives/node_modules/serialport"));
        assert_eq!(plan.packages.len(), 2);

        let files = copy(&plan).await.unwrap();
        assert_eq!(files, 5);
        assert_eq!(
            fs::read_to_string(plan.target.join("build/Release/bindings.node")).unwrap(),
            "bin"
        );
        assert!(out.join("node_natives/node_modules/debug/index.js").is_file());
        assert!(!plan.target.join("node_modules").exists());
    }

    #[test]
    fn test_uninstalled_package() {
        let tmp = tempfile::tempdir().unwrap();
        let walk = FsWalk::with_ceiling(tmp.path());
        let err = plan(&walk, &ManifestCache::new(), tmp.path(), "nope", tmp.path()).unwrap_err();
        assert!(matches!(err, NativeError::SecondaryBundler { .. }));
    }
}
