// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Drives the plugin hooks over modules on disk.
//!
//! The CLI has no module graph of its own: every input module is transformed
//! in place of a bundler and written out as CommonJS. Synthetic ids in the
//! rewritten source are pointed at a loader file per binary under
//! `<out>/.natpack/`, and each loader requires the binary at its copy location.

use anyhow::{Context, Result};
use natpack_npm::{FsWalk, ManifestCache, discover_natives, find_library};
use natpack_plugin::emit::interop::relative_id;
use natpack_plugin::loader::{render_commonjs_loader, synthetic_id};
use natpack_plugin::locator::has_binary_extension;
use natpack_plugin::{BinaryRecord, HostContext, NativePlugin};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Folder under the output directory holding loader modules and the manifest
pub const LOADER_DIR: &str = ".natpack";

/// Name of the build manifest inside [`LOADER_DIR`]
pub const MANIFEST_FILE: &str = "manifest.json";

const MODULE_EXTENSIONS: [&str; 3] = ["js", "cjs", "mjs"];

/// A module the build changed
#[derive(Debug, Serialize)]
pub struct RewrittenModule {
    pub source: PathBuf,
    pub output: PathBuf,
    pub idioms: Vec<String>,
}

/// A loader module written for one binary
#[derive(Debug, Serialize)]
pub struct LoaderEntry {
    pub id: String,
    pub binary: PathBuf,
    pub loader: PathBuf,
}

/// Everything a build wrote, serialized to `.natpack/manifest.json`
#[derive(Debug, Default, Serialize)]
pub struct BuildManifest {
    pub modules: Vec<RewrittenModule>,
    pub loaders: Vec<LoaderEntry>,
    pub copied: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub bundled: Vec<String>,
    pub mirrored: Vec<String>,
}

/// A dependency found to ship native binaries
#[derive(Debug, Serialize)]
pub struct NativePackage {
    pub name: String,
    pub dir: Option<PathBuf>,
    pub binaries: Vec<PathBuf>,
}

/// Every module under `inputs`, paired with its path relative to the output
/// directory.
pub fn collect_modules(inputs: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut modules = Vec::new();
    for input in inputs {
        if input.is_file() {
            let name = input
                .file_name()
                .with_context(|| format!("{} has no file name", input.display()))?;
            modules.push((input.clone(), PathBuf::from(name)));
            continue;
        }
        if !input.is_dir() {
            anyhow::bail!("input not found: {}", input.display());
        }
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && is_module(entry.path()) {
                let rel = entry.path().strip_prefix(input)?.to_path_buf();
                modules.push((entry.path().to_path_buf(), rel));
            }
        }
    }
    Ok(modules)
}

fn is_module(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext))
}

/// Run one build over `inputs`, writing into `out`.
pub async fn build(
    plugin: &NativePlugin,
    ctx: &dyn HostContext,
    inputs: &[PathBuf],
    out: &Path,
) -> Result<BuildManifest> {
    plugin.build_start()?;
    let out = std::path::absolute(out)?;
    let loader_dir = out.join(LOADER_DIR);
    let mut manifest = BuildManifest::default();

    for (source, rel) in collect_modules(inputs)? {
        let source = std::path::absolute(&source)?;
        let code = tokio::fs::read_to_string(&source)
            .await
            .with_context(|| format!("reading {}", source.display()))?;
        let Some(output) = plugin.transform(ctx, &code, &source.to_string_lossy())? else {
            debug!("Unchanged: {}", source.display());
            continue;
        };

        let target = out.join(&rel);
        let code = link_loaders(plugin, &output.code, &target, &loader_dir)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, code)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        manifest.modules.push(RewrittenModule {
            source,
            output: target,
            idioms: output.matches.iter().map(|m| m.kind.to_string()).collect(),
        });
    }

    tokio::fs::create_dir_all(&loader_dir).await?;
    for record in plugin.registry().records() {
        if record.ignored {
            continue;
        }
        let loader = loader_path(&loader_dir, &record);
        let binary = std::path::absolute(&record.output_path)?;
        let rel = relative_id(&loader, &binary)
            .with_context(|| format!("no relative path to {}", binary.display()))?;
        let mode = plugin.options().loader_mode(&record.output_id);
        tokio::fs::write(&loader, render_commonjs_loader(&rel, mode)).await?;
        manifest.loaders.push(LoaderEntry {
            id: record.output_id.clone(),
            binary: record.source_path.clone(),
            loader,
        });
    }

    let report = plugin.build_end(ctx, None).await?;
    manifest.copied = report.copied;
    manifest.missing = report.missing;
    manifest.bundled = report.bundled;
    manifest.mirrored = report.mirrored;

    let path = loader_dir.join(MANIFEST_FILE);
    tokio::fs::write(&path, serde_json::to_string_pretty(&manifest)?).await?;
    info!("Wrote {}", path.display());
    Ok(manifest)
}

/// Replace every synthetic id in `code` with the path from `module` to the
/// loader of that binary.
fn link_loaders(plugin: &NativePlugin, code: &str, module: &Path, loader_dir: &Path) -> Result<String> {
    let mut code = code.to_string();
    for record in plugin.registry().records() {
        if record.ignored {
            continue;
        }
        let needle = serde_json::to_string(&synthetic_id(&record.output_id))?;
        if !code.contains(&needle) {
            continue;
        }
        let loader = loader_path(loader_dir, &record);
        let rel = relative_id(module, &loader)
            .with_context(|| format!("no relative path to {}", loader.display()))?;
        code = code.replace(&needle, &serde_json::to_string(&rel)?);
    }
    Ok(code)
}

fn loader_path(loader_dir: &Path, record: &BinaryRecord) -> PathBuf {
    loader_dir.join(loader_file_name(&record.output_id))
}

/// `./lib/addon.node` -> `lib_addon.node.cjs`
fn loader_file_name(output_id: &str) -> String {
    let trimmed = output_id.trim_start_matches("./");
    format!("{}.cjs", trimmed.replace(['/', '\\'], "_"))
}

/// Dependencies of the project at `root` that ship native binaries.
pub fn scan(root: &Path) -> Result<Vec<NativePackage>> {
    let walk = FsWalk::new();
    let manifests = ManifestCache::new();
    let names = discover_natives(&walk, &manifests, root)?;
    Ok(names
        .into_iter()
        .map(|name| {
            let dir = find_library(&walk, root, &[name.as_str()]);
            let binaries = dir.as_deref().map(list_binaries).unwrap_or_default();
            NativePackage { name, dir, binaries }
        })
        .collect())
}

fn list_binaries(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str().is_some_and(has_binary_extension))
        .map(|entry| entry.into_path())
        .collect()
}
