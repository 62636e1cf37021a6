// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Static evaluation of `node-gyp-build`'s `path`
//!
//! Local builds win (`build/Release`, then `build/Debug`). Otherwise the
//! `prebuilds/<platform>-<arch>[+<arch>...]` folder for the target is picked,
//! preferring single-architecture folders, and the file whose dot-separated
//! tags best fit the runtime is returned.

use natpack_npm::ManifestCache;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::target::TargetEnv;

const RUNTIME: &str = "node";

/// Path `require('node-gyp-build').path(root)` would return.
pub fn resolve(manifests: &ManifestCache, root: &Path, target: &TargetEnv) -> Option<PathBuf> {
    let dir = prebuild_override(manifests, root).unwrap_or_else(|| root.to_path_buf());

    for build in ["build/Release", "build/Debug"] {
        if let Some(file) = sorted_entries(&dir.join(build))
            .into_iter()
            .find(|name| name.ends_with(".node"))
        {
            return Some(dir.join(build).join(file));
        }
    }
    prebuild(&dir, target)
}

/// `<NAME>_PREBUILD` points the lookup at another directory.
fn prebuild_override(manifests: &ManifestCache, root: &Path) -> Option<PathBuf> {
    let manifest = manifests.load_dir(root).ok()?;
    let var = format!("{}_PREBUILD", manifest.name.as_deref()?.to_uppercase().replace('-', "_"));
    let dir = std::env::var_os(&var)?;
    debug!("{} redirects prebuild lookup to {:?}", var, dir);
    Some(PathBuf::from(dir))
}

fn prebuild(dir: &Path, target: &TargetEnv) -> Option<PathBuf> {
    let prebuilds = dir.join("prebuilds");
    let mut tuples: Vec<Tuple> = sorted_entries(&prebuilds)
        .into_iter()
        .filter_map(|name| Tuple::parse(&name))
        .filter(|tuple| tuple.platform == target.platform && tuple.architectures.contains(&target.arch))
        .collect();
    tuples.sort_by_key(|tuple| tuple.architectures.len());
    let tuple = tuples.into_iter().next()?;

    let folder = prebuilds.join(&tuple.name);
    let mut candidates: Vec<Tags> = sorted_entries(&folder)
        .into_iter()
        .filter_map(|file| Tags::parse(&file))
        .filter(|tags| tags.matches(target))
        .collect();
    candidates.sort_by(Tags::preference);
    candidates.into_iter().next().map(|tags| folder.join(tags.file))
}

fn sorted_entries(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

#[derive(Debug)]
struct Tuple {
    name: String,
    platform: String,
    architectures: Vec<String>,
}

impl Tuple {
    fn parse(name: &str) -> Option<Self> {
        let (platform, archs) = name.split_once('-')?;
        if platform.is_empty() || archs.contains('-') {
            return None;
        }
        let architectures: Vec<String> = archs.split('+').map(str::to_string).collect();
        if architectures.iter().any(String::is_empty) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            platform: platform.to_string(),
            architectures,
        })
    }
}

/// Tags encoded in a prebuilt file name, e.g. `node.napi.glibc.node`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Tags {
    /// File name the tags were read from
    pub file: String,
    /// `node`, `electron` or `node-webkit`
    pub runtime: Option<String>,
    /// Built against N-API
    pub napi: bool,
    /// `NODE_MODULE_VERSION` the file was built for
    pub abi: Option<String>,
    /// libuv major version
    pub uv: Option<String>,
    /// ARM architecture version
    pub armv: Option<String>,
    /// `glibc` or `musl`
    pub libc: Option<String>,
    /// Number of recognized tags
    pub specificity: u32,
}

impl Tags {
    /// Parse a file name; anything not ending in `.node` is not a prebuild.
    pub fn parse(file: &str) -> Option<Self> {
        let mut parts: Vec<&str> = file.split('.').collect();
        if parts.pop()? != "node" {
            return None;
        }
        let mut tags = Tags {
            file: file.to_string(),
            ..Tags::default()
        };
        for part in parts {
            if matches!(part, "node" | "electron" | "node-webkit") {
                tags.runtime = Some(part.to_string());
            } else if part == "napi" {
                tags.napi = true;
            } else if let Some(abi) = part.strip_prefix("abi") {
                tags.abi = Some(abi.to_string());
            } else if let Some(uv) = part.strip_prefix("uv") {
                tags.uv = Some(uv.to_string());
            } else if let Some(armv) = part.strip_prefix("armv") {
                tags.armv = Some(armv.to_string());
            } else if matches!(part, "glibc" | "musl") {
                tags.libc = Some(part.to_string());
            } else {
                continue;
            }
            tags.specificity += 1;
        }
        Some(tags)
    }

    /// Whether a binary with these tags loads on `target`.
    pub fn matches(&self, target: &TargetEnv) -> bool {
        let runtime_agnostic = self.runtime.as_deref() == Some("node") && self.napi;
        if self.runtime.as_deref().is_some_and(|r| r != RUNTIME) && !runtime_agnostic {
            return false;
        }
        let abi = target.module_abi().to_string();
        if self.abi.as_ref().is_some_and(|a| *a != abi) && !self.napi {
            return false;
        }
        if self.uv.as_deref().is_some_and(|uv| uv != "1") {
            return false;
        }
        let armv = match target.arch.as_str() {
            "arm64" => "8",
            "arm" => "7",
            _ => "",
        };
        if self.armv.as_deref().is_some_and(|v| v != armv) {
            return false;
        }
        let libc = if target.libc == "musl" { "musl" } else { "glibc" };
        if self.libc.as_deref().is_some_and(|l| l != libc) {
            return false;
        }
        true
    }

    /// Best candidate first: matching runtime, then ABI-specific, then the
    /// most tags.
    pub fn preference(a: &Tags, b: &Tags) -> Ordering {
        if a.runtime != b.runtime {
            if a.runtime.as_deref() == Some(RUNTIME) {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        } else if a.abi != b.abi {
            if a.abi.is_some() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        } else {
            b.specificity.cmp(&a.specificity)
        }
    }
}
