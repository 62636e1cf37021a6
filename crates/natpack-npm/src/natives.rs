//! Discovery of dependencies that ship native binaries.

use glob::Pattern;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::package::ManifestCache;
use crate::walk::{AncestorWalk, node_modules_dirs};

/// Names of the project dependencies (production and dev) that contain at
/// least one `.node` file, looking at every `node_modules` visible from `root`.
///
/// Only packages declared by the `package.json` sitting next to each
/// `node_modules` directory are considered.
pub fn discover_natives(
    walk: &dyn AncestorWalk,
    manifests: &ManifestCache,
    root: &Path,
) -> Result<Vec<String>> {
    let mut natives: Vec<String> = Vec::new();

    for node_modules in node_modules_dirs(walk, root) {
        let Some(project) = node_modules.parent() else {
            continue;
        };
        if !project.join("package.json").is_file() {
            continue;
        }

        let manifest = manifests.load_dir(project)?;
        for dep in manifest.declared_dependency_names() {
            if natives.contains(&dep) {
                continue;
            }
            let dep_dir = node_modules.join(&dep);
            if has_native_files(&dep_dir)? {
                debug!("{} ships native binaries", dep);
                natives.push(dep);
            }
        }
    }

    Ok(natives)
}

fn has_native_files(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let pattern = format!("{}/**/*.node", Pattern::escape(&dir.to_string_lossy()));
    Ok(glob::glob(&pattern)?.flatten().next().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::FsWalk;
    use std::fs;

    #[test]
    fn test_discover_natives() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(
            root.join("package.json"),
            r#"{"dependencies":{"better-sqlite3":"11","lodash":"4"},"devDependencies":{"fsevents":"2"}}"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("node_modules/better-sqlite3/build/Release")).unwrap();
        fs::write(
            root.join("node_modules/better-sqlite3/build/Release/better_sqlite3.node"),
            b"\x7fELF",
        )
        .unwrap();
        fs::create_dir_all(root.join("node_modules/lodash")).unwrap();
        fs::create_dir_all(root.join("node_modules/fsevents")).unwrap();
        fs::write(root.join("node_modules/fsevents/fsevents.node"), b"\xcf\xfa").unwrap();

        let walk = FsWalk::with_ceiling(root);
        let natives = discover_natives(&walk, &ManifestCache::new(), root).unwrap();
        assert_eq!(natives, vec!["better-sqlite3".to_string(), "fsevents".to_string()]);
    }
}
