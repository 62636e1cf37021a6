// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host hook surface
//!
//! [`NativePlugin`] owns everything that lives for one build (options,
//! locator, registry) and exposes the hooks a bundler calls, in the order it
//! calls them: `build_start`, then `resolve_id` / `transform` / `load` for
//! each module, then `build_end`.

use natpack_npm::{AncestorWalk, FsWalk, ManifestCache};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::NativeOptions;
use crate::context::HostContext;
use crate::emit::{EmitReport, Emitter, SecondaryBundler};
use crate::error::{NativeError, Result};
use crate::idiom::{
    BindingsRecognizer, DirectRecognizer, GypBuildRecognizer, IdiomMatch, PreGypRecognizer,
    ResolveCx, rewrite_first,
};
use crate::loader::{PREFIX, parse_synthetic, render_loader, synthetic_id};
use crate::locator::{Locator, LocatorBackend};
use crate::registry::Registry;
use crate::rewrite::{EditBuffer, InertRanges, Segment};

/// Suffix the CommonJS plugin appends to ids it proxies
const COMMONJS_REQUIRE_SUFFIX: &str = "?commonjs-require";

/// Result of a transform that changed the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    /// Rewritten source
    pub code: String,
    /// Occurrences that were rewritten, in recognizer priority order
    pub matches: Vec<IdiomMatch>,
    /// Mapping of the output back to the original source
    pub segments: Vec<Segment>,
}

/// The plugin instance for one build
pub struct NativePlugin {
    options: NativeOptions,
    walk: Arc<dyn AncestorWalk>,
    manifests: ManifestCache,
    locator: Locator,
    registry: Registry,
    bundler: Option<Arc<dyn SecondaryBundler>>,
    pregyp: PreGypRecognizer,
    gyp_build: GypBuildRecognizer,
    bindings: BindingsRecognizer,
    direct: DirectRecognizer,
}

impl NativePlugin {
    /// Create a plugin, validating `options`.
    pub fn new(options: NativeOptions) -> Result<Self> {
        if let Some(secondary) = &options.secondary {
            secondary.validate()?;
        }
        let manifests = ManifestCache::new();
        let locator = Locator::from_options(&options, manifests.clone())?;
        let registry = Registry::from_options(&options)?;
        debug!("natpack options: {:?}", options);

        Ok(Self {
            walk: Arc::new(FsWalk::new()),
            manifests,
            locator,
            registry,
            bundler: None,
            pregyp: PreGypRecognizer::new()?,
            gyp_build: GypBuildRecognizer::new()?,
            bindings: BindingsRecognizer::new()?,
            direct: DirectRecognizer::new()?,
            options,
        })
    }

    /// Walk ancestors with `walk` instead of the unbounded filesystem walk.
    pub fn with_walk(mut self, walk: Arc<dyn AncestorWalk>) -> Self {
        self.locator = self.locator.with_walk(walk.clone());
        self.walk = walk;
        self
    }

    /// Replace the locator backends chosen by the options.
    pub fn with_backends(mut self, backends: Vec<Arc<dyn LocatorBackend>>) -> Self {
        self.locator = self.locator.with_backends(backends);
        self
    }

    /// Use `bundler` for the secondary pass.
    pub fn with_bundler(mut self, bundler: Arc<dyn SecondaryBundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    /// Options the plugin was created with
    pub fn options(&self) -> &NativeOptions {
        &self.options
    }

    /// Binaries registered so far
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The binary locator
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Prepare the output directory.
    pub fn build_start(&self) -> Result<()> {
        std::fs::create_dir_all(&self.options.copy_to)?;
        debug!("Binaries go to {}", self.options.copy_to.display());
        Ok(())
    }

    /// Claim synthetic ids and imports that name a binary.
    ///
    /// Synthetic ids come back unchanged so no other resolver sees them.
    /// Otherwise the importee is resolved against the importer's directory
    /// (direct reference or extension inference) and, when it is a binary,
    /// registered and answered with its synthetic id.
    pub fn resolve_id(
        &self,
        ctx: &dyn HostContext,
        importee: &str,
        importer: Option<&str>,
    ) -> Option<String> {
        if importee.starts_with(PREFIX) {
            return Some(importee.to_string());
        }

        let importee = strip_namespace(
            importee
                .strip_suffix(COMMONJS_REQUIRE_SUFFIX)
                .unwrap_or(importee),
        );
        let dir = importer
            .map(strip_namespace)
            .and_then(|importer| Path::new(importer).parent().map(Path::to_path_buf))
            .unwrap_or_else(|| self.options.project_root());

        let path = self.locator.resolve(importee, &dir)?;
        let record = self.registry.register(&path, ctx);
        if record.ignored {
            return None;
        }
        Some(synthetic_id(&record.output_id))
    }

    /// Rewrite every recognized native-loading idiom in one module.
    ///
    /// Each recognizer rewrites its first resolvable occurrence. When the
    /// `node-pre-gyp` lookup is rewritten, the now unused import of the
    /// library is removed too. Returns `None` when nothing changed.
    pub fn transform(
        &self,
        ctx: &dyn HostContext,
        code: &str,
        id: &str,
    ) -> Result<Option<TransformOutput>> {
        if id.starts_with('\0') || !code.contains("require") {
            return Ok(None);
        }

        let module_path = self.module_path(id);
        let module_dir = module_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.options.project_root());
        let inert = self.options.skip_inert.then(|| InertRanges::scan(code));
        let cx = ResolveCx {
            module_path: &module_path,
            module_dir: &module_dir,
            locator: &self.locator,
            ctx,
        };

        let mut buf = EditBuffer::new(code);
        let mut matches = Vec::new();

        if let Some(found) = rewrite_first(&self.pregyp, &mut buf, inert.as_ref(), &cx, &self.registry) {
            if let Some(import) = self.pregyp.import(code) {
                if !buf.remove(import.range.clone()) {
                    debug!("Kept {} import in {}, it overlaps an edit", import.library, id);
                }
            }
            matches.push(found);
        }
        matches.extend(rewrite_first(&self.gyp_build, &mut buf, inert.as_ref(), &cx, &self.registry));
        matches.extend(rewrite_first(&self.bindings, &mut buf, inert.as_ref(), &cx, &self.registry));
        matches.extend(rewrite_first(&self.direct, &mut buf, inert.as_ref(), &cx, &self.registry));

        if !buf.has_changed() {
            return Ok(None);
        }
        info!(
            "Rewrote {} in {}",
            matches
                .iter()
                .map(|m| m.kind.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            module_path.display()
        );
        Ok(Some(TransformOutput {
            code: buf.to_string(),
            segments: buf.segments(),
            matches,
        }))
    }

    /// Source of the loader module for a synthetic id.
    ///
    /// Ids without the prefix are not ours (`Ok(None)`); a prefixed id with
    /// no registered binary is an error.
    pub fn load(&self, id: &str) -> Result<Option<String>> {
        let Some(output_id) = parse_synthetic(id) else {
            return Ok(None);
        };
        let record = self
            .registry
            .lookup(output_id)
            .ok_or_else(|| NativeError::UnknownSyntheticId(output_id.to_string()))?;
        let mode = self.options.loader_mode(&record.output_id);
        debug!("Loader for {} ({:?})", record.output_id, mode);
        Ok(Some(render_loader(&record.output_id, mode)))
    }

    /// Copy binaries and run the secondary pass once the host is done.
    ///
    /// Nothing is emitted when the host reports a failed build.
    pub async fn build_end(
        &self,
        ctx: &dyn HostContext,
        error: Option<&dyn StdError>,
    ) -> Result<EmitReport> {
        if let Some(error) = error {
            warn!("Build failed, skipping native emit: {}", error);
            return Ok(EmitReport::default());
        }
        Emitter::new(&self.options, self.walk.as_ref(), &self.manifests)
            .with_bundler(self.bundler.clone())
            .finish(&self.registry, ctx)
            .await
    }

    fn module_path(&self, id: &str) -> PathBuf {
        let path = Path::new(id.split('?').next().unwrap_or(id));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.options.project_root().join(path)
        }
    }
}

impl std::fmt::Debug for NativePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePlugin")
            .field("options", &self.options)
            .field("locator", &self.locator)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Drop a leading `\0` and any `\0<namespace>:` prefix other plugins add.
fn strip_namespace(id: &str) -> &str {
    match id.strip_prefix('\0') {
        Some(rest) => rest.split_once(':').map_or(rest, |(_, tail)| tail),
        None => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_namespace() {
        assert_eq!(strip_namespace("\0ns:/a/b.node"), "/a/b.node");
        assert_eq!(strip_namespace("\0./x.node"), "./x.node");
        assert_eq!(strip_namespace("./x.node"), "./x.node");
    }
}
