// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Static evaluation of `node-pre-gyp`'s `find`
//!
//! `find` reads the `binary` section of a package's manifest and expands its
//! `module_path` template with facts about the target runtime. The binary is
//! `<package dir>/<expanded module_path>/<module_name>.node`.

use natpack_npm::{BinarySection, ManifestCache, PackageJson};
use semver::Version;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::normalize_path;
use crate::target::TargetEnv;

/// Path `find(package_json)` would return, without checking it exists.
pub fn find(manifests: &ManifestCache, package_json: &Path, target: &TargetEnv) -> Option<PathBuf> {
    let manifest = manifests
        .load(package_json)
        .map_err(|e| debug!("node-pre-gyp lookup skipped: {}", e))
        .ok()?;
    let binary = manifest.binary.as_ref()?;
    let module_name = binary.module_name.as_deref()?;
    let module_path = binary.module_path.as_deref()?;
    let vars = template_vars(&manifest, binary, target)?;

    let dir = package_json.parent()?.join(evaluate(module_path, &vars));
    Some(normalize_path(&dir.join(format!("{}.node", module_name))))
}

/// Highest N-API version the package builds for that the runtime supports.
pub fn napi_build_version(binary: &BinarySection, target: &TargetEnv) -> Option<u32> {
    binary
        .napi_versions
        .iter()
        .copied()
        .filter(|&v| v <= target.napi_version)
        .max()
}

/// Template variables `node-pre-gyp` exposes to `module_path`.
pub fn template_vars(
    manifest: &PackageJson,
    binary: &BinarySection,
    target: &TargetEnv,
) -> Option<BTreeMap<&'static str, String>> {
    let version = Version::parse(manifest.version.as_deref()?)
        .map_err(|e| debug!("Unparseable package version: {}", e))
        .ok()?;
    let napi = napi_build_version(binary, target);
    if !binary.napi_versions.is_empty() && napi.is_none() {
        debug!(
            "No N-API build in {:?} usable with N-API {}",
            binary.napi_versions, target.napi_version
        );
        return None;
    }

    let node_abi = target.node_abi();
    let mut vars = BTreeMap::new();
    vars.insert("name", manifest.name.clone().unwrap_or_default());
    vars.insert("configuration", "Release".to_string());
    vars.insert("module_name", binary.module_name.clone().unwrap_or_default());
    vars.insert("version", version.to_string());
    vars.insert("prerelease", version.pre.to_string());
    vars.insert("build", version.build.to_string());
    vars.insert("major", version.major.to_string());
    vars.insert("minor", version.minor.to_string());
    vars.insert("patch", version.patch.to_string());
    vars.insert("runtime", "node".to_string());
    vars.insert("node_abi_napi", if napi.is_some() { "napi".to_string() } else { node_abi.clone() });
    vars.insert(
        "node_napi_label",
        napi.map_or_else(|| node_abi.clone(), |n| format!("napi-v{}", n)),
    );
    vars.insert("node_abi", node_abi);
    vars.insert("napi_version", target.napi_version.to_string());
    if let Some(n) = napi {
        vars.insert("napi_build_version", n.to_string());
    }
    vars.insert("target", target.node_version_string());
    vars.insert("platform", target.platform.clone());
    vars.insert("target_platform", target.platform.clone());
    vars.insert("arch", target.arch.clone());
    vars.insert("target_arch", target.arch.clone());
    vars.insert("libc", target.libc.clone());
    vars.insert("toolset", String::new());
    Some(vars)
}

/// Replace every `{key}` with its value; unknown keys are left as written.
pub fn evaluate(template: &str, vars: &BTreeMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if vars.contains_key(&after[..close]) => {
                out.push_str(&vars[&after[..close]]);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::super::tests::touch;
    use super::*;

    fn target() -> TargetEnv {
        TargetEnv::with_overrides(Some("linux"), Some("x64"), Some("20.11.1"), Some(9), Some("glibc"))
            .unwrap()
    }

    #[test]
    fn test_evaluate_keeps_unknown_keys() {
        let mut vars = BTreeMap::new();
        vars.insert("platform", "linux".to_string());
        assert_eq!(evaluate("{platform}-{nope}-{platform}", &vars), "linux-{nope}-linux");
        assert_eq!(evaluate("a{b", &vars), "a{b");
    }

    #[test]
    fn test_find_napi_package() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = touch(
            tmp.path(),
            "sqlite3/package.json",
            r#"{
                "name": "sqlite3",
                "version": "5.1.7",
                "binary": {
                    "module_name": "node_sqlite3",
                    "module_path": "./lib/binding/napi-v{napi_build_version}-{platform}-{libc}-{arch}",
                    "napi_versions": [3, 6]
                }
            }"#,
        );

        let found = find(&ManifestCache::new(), &manifest, &target()).unwrap();
        assert_eq!(
            found,
            tmp.path().join("sqlite3/lib/binding/napi-v6-linux-glibc-x64/node_sqlite3.node")
        );
    }

    #[test]
    fn test_find_abi_package() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = touch(
            tmp.path(),
            "pkg/package.json",
            r#"{
                "name": "pkg",
                "version": "1.2.3-beta.1",
                "binary": {
                    "module_name": "addon",
                    "module_path": "./binding/{configuration}/{node_abi}-{platform}-{arch}/v{major}.{minor}-{prerelease}"
                }
            }"#,
        );

        let found = find(&ManifestCache::new(), &manifest, &target()).unwrap();
        assert_eq!(
            found,
            tmp.path().join("pkg/binding/Release/node-v115-linux-x64/v1.2-beta.1/addon.node")
        );
    }

    #[test]
    fn test_find_requires_binary_section_and_napi_match() {
        let tmp = tempfile::tempdir().unwrap();
        let plain = touch(tmp.path(), "a/package.json", r#"{"name":"a","version":"1.0.0"}"#);
        let future = touch(
            tmp.path(),
            "b/package.json",
            r#"{"name":"b","version":"1.0.0","binary":{"module_name":"b","module_path":"x","napi_versions":[10]}}"#,
        );
        let cache = ManifestCache::new();
        assert_eq!(find(&cache, &plain, &target()), None);
        assert_eq!(find(&cache, &future, &target()), None);
        assert_eq!(find(&cache, &tmp.path().join("missing/package.json"), &target()), None);
    }
}
