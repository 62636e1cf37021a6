// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Generic `bindings` lookup

use natpack_npm::{node_modules_dirs, package_root};
use std::path::{Path, PathBuf};

use super::Locator;

/// Result of a bindings lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingsLookup {
    /// The first existing candidate, or the first candidate when none exists
    pub path: PathBuf,
    /// Whether `path` exists
    pub exists: bool,
}

impl Locator {
    /// Candidate paths under one root, in the order `bindings` tries them.
    pub fn bindings_candidates(&self, root: &Path, name: &str) -> Vec<PathBuf> {
        let target = &self.target;
        let mut candidates: Vec<PathBuf> = [
            "build",
            "build/Debug",
            "build/Release",
            "out/Debug",
            "Debug",
            "out/Release",
            "Release",
            "build/default",
        ]
        .iter()
        .map(|dir| root.join(dir).join(name))
        .collect();
        candidates.push(
            root.join(&self.compiled_dir)
                .join(target.node_version_string())
                .join(&target.platform)
                .join(&target.arch)
                .join(name),
        );
        candidates
    }

    /// Locate the binary `require('bindings')(name)` would load from a module
    /// in `module_dir`.
    ///
    /// Roots are the module's package root followed by every visible
    /// `node_modules` directory. `None` means there was no root to search.
    pub fn bindings(&self, name: Option<&str>, module_dir: &Path) -> Option<BindingsLookup> {
        let mut name = name.unwrap_or(&self.default_binding_name).to_string();
        if !name.ends_with(".node") {
            name.push_str(".node");
        }

        let mut roots: Vec<PathBuf> = package_root(self.walk(), module_dir).into_iter().collect();
        for dir in node_modules_dirs(self.walk(), module_dir) {
            if !roots.contains(&dir) {
                roots.push(dir);
            }
        }

        let candidates: Vec<PathBuf> = roots
            .iter()
            .flat_map(|root| self.bindings_candidates(root, &name))
            .collect();
        let first = candidates.first()?.clone();
        Some(match candidates.into_iter().find(|c| c.is_file()) {
            Some(path) => BindingsLookup { path, exists: true },
            None => BindingsLookup {
                path: first,
                exists: false,
            },
        })
    }
}
