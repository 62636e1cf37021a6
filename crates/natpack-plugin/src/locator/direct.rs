// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Direct references and extension inference

use natpack_npm::node_modules_dirs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{Locator, normalize_path};

/// Binary extensions, in inference order
pub const BINARY_EXTENSIONS: [&str; 2] = ["node", "dll"];

/// Whether `hint` already names a binary (`.node` / `.dll`, any case).
pub fn has_binary_extension(hint: &str) -> bool {
    Path::new(hint)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BINARY_EXTENSIONS.iter().any(|b| ext.eq_ignore_ascii_case(b)))
}

fn with_extension_appended(base: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

impl Locator {
    /// Resolve `hint` against `dir`.
    ///
    /// A hint with a binary extension is taken literally, whether or not the
    /// file exists. Otherwise `.node` and then `.dll` are appended and the
    /// first existing file wins.
    pub fn resolve(&self, hint: &str, dir: &Path) -> Option<PathBuf> {
        let base = normalize_path(&dir.join(hint));
        if has_binary_extension(hint) {
            return Some(base);
        }
        BINARY_EXTENSIONS
            .iter()
            .map(|ext| with_extension_appended(&base, ext))
            .find(|candidate| candidate.is_file())
    }

    /// Resolve the argument of a plain `require` to an existing binary.
    ///
    /// Relative and absolute hints are taken from the module's directory;
    /// bare specifiers are tried in each visible `node_modules`, nearest first.
    pub fn resolve_existing(&self, hint: &str, module_dir: &Path) -> Option<PathBuf> {
        if hint.starts_with('.') || Path::new(hint).is_absolute() {
            return self.resolve(hint, module_dir).filter(|path| path.is_file());
        }
        node_modules_dirs(self.walk(), module_dir)
            .iter()
            .find_map(|dir| self.resolve(hint, dir).filter(|path| path.is_file()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{static_locator, touch};
    use super::*;

    #[test]
    fn test_extension_check() {
        assert!(has_binary_extension("./a.node"));
        assert!(has_binary_extension("C:/x/ADDON.DLL"));
        assert!(!has_binary_extension("./a.node.js"));
        assert!(!has_binary_extension("bindings"));
    }

    #[test]
    fn test_literal_binary_is_not_checked() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = static_locator(tmp.path());
        assert_eq!(
            locator.resolve("../build/x.node", &tmp.path().join("lib")),
            Some(tmp.path().join("build/x.node"))
        );
    }

    #[test]
    fn test_inference_prefers_node() {
        let tmp = tempfile::tempdir().unwrap();
        let node = touch(tmp.path(), "addon.node", "");
        touch(tmp.path(), "addon.dll", "");
        let dll_only = touch(tmp.path(), "other.dll", "");
        let locator = static_locator(tmp.path());

        assert_eq!(locator.resolve("./addon", tmp.path()), Some(node));
        assert_eq!(locator.resolve("./other", tmp.path()), Some(dll_only));
        assert_eq!(locator.resolve("./missing", tmp.path()), None);
    }

    #[test]
    fn test_bare_specifier_searches_node_modules() {
        let tmp = tempfile::tempdir().unwrap();
        let hoisted = touch(tmp.path(), "node_modules/fsevents/fsevents.node", "");
        fs_dir(tmp.path(), "node_modules/app/node_modules");
        let locator = static_locator(tmp.path());

        let from = tmp.path().join("node_modules/app/lib");
        fs_dir(tmp.path(), "node_modules/app/lib");
        assert_eq!(locator.resolve_existing("fsevents/fsevents", &from), Some(hoisted));
        assert_eq!(locator.resolve_existing("./fsevents.node", &from), None);
    }

    fn fs_dir(root: &Path, rel: &str) {
        std::fs::create_dir_all(root.join(rel)).unwrap();
    }
}
