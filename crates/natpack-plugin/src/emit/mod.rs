// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Copy/Emit Stage
//!
//! Runs once the host finishes a build:
//!
//! 1. every registered binary that has not been copied yet is copied to its
//!    output path;
//! 2. with a secondary bundler configured, each native package is bundled
//!    into a self-contained CommonJS artifact and given an ES module shim;
//! 3. packages listed in `forceCopy` are mirrored, with their runtime
//!    dependencies, into a `node_modules` tree under the output directory.
//!
//! A missing binary only warns. Anything failing in steps 2 and 3 aborts.

pub mod interop;
pub mod mirror;
pub mod secondary;

pub use secondary::{BundleJob, SecondaryBundler, WebpackBundler};

use futures::future::join_all;
use natpack_npm::{AncestorWalk, ManifestCache, discover_natives, find_library};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{NativeOptions, SecondaryOptions};
use crate::context::{self, HostContext};
use crate::error::{NativeError, Result};
use crate::registry::{BinaryRecord, Registry};

/// What the emit stage wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Output paths of binaries copied by this stage
    pub copied: Vec<PathBuf>,
    /// Source paths of registered binaries that do not exist
    pub missing: Vec<PathBuf>,
    /// Packages run through the secondary bundler
    pub bundled: Vec<String>,
    /// Packages mirrored verbatim
    pub mirrored: Vec<String>,
    /// Interop shims written
    pub shims: Vec<PathBuf>,
}

/// Materializes a finished build's binaries and native packages
pub struct Emitter<'a> {
    options: &'a NativeOptions,
    walk: &'a dyn AncestorWalk,
    manifests: &'a ManifestCache,
    bundler: Option<Arc<dyn SecondaryBundler>>,
}

impl<'a> Emitter<'a> {
    /// Create an emitter for one build
    pub fn new(
        options: &'a NativeOptions,
        walk: &'a dyn AncestorWalk,
        manifests: &'a ManifestCache,
    ) -> Self {
        Self {
            options,
            walk,
            manifests,
            bundler: None,
        }
    }

    /// Use `bundler` instead of webpack for the secondary pass.
    pub fn with_bundler(mut self, bundler: Option<Arc<dyn SecondaryBundler>>) -> Self {
        self.bundler = bundler;
        self
    }

    /// Run every step of the stage.
    pub async fn finish(&self, registry: &Registry, ctx: &dyn HostContext) -> Result<EmitReport> {
        let mut report = EmitReport::default();
        self.copy_pending(registry, ctx, &mut report).await?;
        if let Some(secondary) = &self.options.secondary {
            self.run_secondary(secondary, &mut report).await?;
        }
        info!(
            "Emitted {} binaries ({} missing), {} bundled, {} mirrored",
            report.copied.len(),
            report.missing.len(),
            report.bundled.len(),
            report.mirrored.len()
        );
        Ok(report)
    }

    async fn copy_pending(
        &self,
        registry: &Registry,
        ctx: &dyn HostContext,
        report: &mut EmitReport,
    ) -> Result<()> {
        let mut pending = Vec::new();
        for record in registry.records() {
            if record.ignored || registry.is_copied(&record.source_path) {
                continue;
            }
            if record.source_path.is_file() {
                pending.push(record);
            } else {
                if !registry.is_reported(&record.source_path) {
                    context::warn(ctx, format!("{} does not exist", record.source_path.display()));
                }
                report.missing.push(record.source_path.clone());
            }
        }

        let results = join_all(pending.iter().map(|record| copy_record(record))).await;
        for (record, result) in pending.iter().zip(results) {
            result?;
            registry.mark_copied(&record.source_path);
            report.copied.push(record.output_path.clone());
        }
        Ok(())
    }

    async fn run_secondary(&self, secondary: &SecondaryOptions, report: &mut EmitReport) -> Result<()> {
        secondary.validate()?;
        let root = self.options.project_root();
        let out = &self.options.copy_to;
        let bundler = match &self.bundler {
            Some(bundler) => bundler.clone(),
            None => Arc::new(WebpackBundler::from_options(self.options, secondary, &root)),
        };

        let natives = match &self.options.natives {
            Some(natives) => natives.clone(),
            None => discover_natives(self.walk, self.manifests, &root)?,
        };
        debug!("Native packages: {:?}", natives);

        for name in natives.iter().filter(|name| !secondary.force_copy.contains(name)) {
            let package_dir = find_library(self.walk, &root, &[name.as_str()])
                .ok_or_else(|| NativeError::bundler(name.as_str(), "package is not installed"))?;
            let job = BundleJob {
                package: name.clone(),
                package_dir,
                output_dir: out.join(name),
                root: root.clone(),
            };
            bundler.bundle(&job).await?;
            report.bundled.push(name.clone());

            let exports = bundler.exports(&job.package_dir).await;
            let shim = self.write_shim(name, &job.output_dir.join("index.js"), exports.as_deref()).await?;
            report.shims.push(shim);
        }

        for name in &secondary.force_copy {
            let plan = mirror::plan(self.walk, self.manifests, &root, name, out)?;
            let files = mirror::copy(&plan).await?;
            info!("Mirrored {} ({} packages, {} files)", name, plan.packages.len(), files);
            report.mirrored.push(name.clone());

            let exports = bundler.exports(&plan.target).await;
            let shim = self.write_shim(name, &plan.target, exports.as_deref()).await?;
            report.shims.push(shim);
        }
        Ok(())
    }

    /// Write `<out>/<package>.mjs` re-exporting `target`.
    async fn write_shim(&self, package: &str, target: &Path, exports: Option<&[String]>) -> Result<PathBuf> {
        let shim = interop::shim_path(&self.options.copy_to, package);
        let id = interop::relative_id(&shim, target)
            .ok_or_else(|| NativeError::bundler(package, "cannot express shim target as a relative path"))?;
        if let Some(parent) = shim.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&shim, interop::render(&id, exports.unwrap_or_default())).await?;
        debug!("Wrote {} -> {}", shim.display(), id);
        Ok(shim)
    }
}

async fn copy_record(record: &BinaryRecord) -> Result<()> {
    let copy_err = |source| NativeError::Copy {
        from: record.source_path.clone(),
        to: record.output_path.clone(),
        source,
    };
    if let Some(parent) = record.output_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(copy_err)?;
    }
    let bytes = tokio::fs::copy(&record.source_path, &record.output_path)
        .await
        .map_err(copy_err)?;
    debug!(
        "Copied {} -> {} ({} bytes)",
        record.source_path.display(),
        record.output_path.display(),
        bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CopyMode;
    use crate::context::CollectContext;
    use crate::registry::OutputLayout;
    use natpack_npm::FsWalk;
    use std::fs;

    #[tokio::test]
    async fn test_deferred_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("pkg/build/Release/addon.node");
        fs::create_dir_all(present.parent().unwrap()).unwrap();
        fs::write(&present, b"elf").unwrap();
        let absent = tmp.path().join("pkg/build/Release/gone.node");

        let options = NativeOptions {
            copy_to: tmp.path().join("dist/native"),
            ..NativeOptions::default()
        };
        let registry = Registry::new(
            OutputLayout {
                copy_to: options.copy_to.clone(),
                dest_dir: "./".into(),
            },
            None,
            CopyMode::Deferred,
        );
        let ctx = CollectContext::new();
        registry.register(&present, &ctx);
        registry.register(&absent, &ctx);
        assert!(ctx.warnings().is_empty());

        let walk = FsWalk::with_ceiling(tmp.path());
        let manifests = ManifestCache::new();
        let emitter = Emitter::new(&options, &walk, &manifests);
        let report = emitter.finish(&registry, &ctx).await.unwrap();

        assert_eq!(report.copied, vec![options.copy_to.join("addon.node")]);
        assert_eq!(report.missing, vec![absent]);
        assert_eq!(fs::read(options.copy_to.join("addon.node")).unwrap(), b"elf");
        assert!(registry.is_copied(&present));
        assert_eq!(ctx.warnings().len(), 1);

        // A second run has nothing left to copy.
        let again = emitter.finish(&registry, &ctx).await.unwrap();
        assert!(again.copied.is_empty());
    }

    #[tokio::test]
    async fn test_eager_miss_warns_once() {
        let tmp = tempfile::tempdir().unwrap();
        let absent = tmp.path().join("pkg/build/Release/gone.node");
        let options = NativeOptions {
            copy_to: tmp.path().join("dist/native"),
            ..NativeOptions::default()
        };
        let registry = Registry::new(
            OutputLayout {
                copy_to: options.copy_to.clone(),
                dest_dir: "./".into(),
            },
            None,
            CopyMode::Eager,
        );
        let ctx = CollectContext::new();
        registry.register(&absent, &ctx);
        assert_eq!(ctx.warnings().len(), 1);
        assert!(registry.is_reported(&absent));

        let walk = FsWalk::with_ceiling(tmp.path());
        let manifests = ManifestCache::new();
        let report = Emitter::new(&options, &walk, &manifests)
            .finish(&registry, &ctx)
            .await
            .unwrap();

        assert_eq!(report.missing, vec![absent]);
        assert_eq!(ctx.warnings().len(), 1);
    }
}
