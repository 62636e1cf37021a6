// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Binary Locator
//!
//! Statically computes which native binary a loading idiom would open at
//! runtime. Each convention keeps the precedence of the runtime library it
//! stands in for:
//!
//! - direct references and extension inference ([`Locator::resolve`])
//! - the `bindings` package's fixed candidate list ([`Locator::bindings`])
//! - `node-pre-gyp`'s `find` ([`Locator::pre_gyp`])
//! - `node-gyp-build`'s `path` ([`Locator::gyp_build`])
//!
//! The last two are delegated to a [`LocatorBackend`]: either the Rust
//! reimplementation in [`StaticBackend`] or the installed library itself run
//! through [`NodeBackend`]. Apart from manifest reads the locator only checks
//! whether files exist.

mod bindings;
mod direct;
pub mod gyp_build;
mod node;
pub mod pregyp;

pub use bindings::BindingsLookup;
pub use direct::{BINARY_EXTENSIONS, has_binary_extension};
pub use node::NodeBackend;

use natpack_npm::{AncestorWalk, FsWalk, ManifestCache, find_library};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::config::{BackendKind, NativeOptions};
use crate::error::Result;
use crate::target::TargetEnv;

/// Package names under which `node-pre-gyp` is published, newest first
pub const PRE_GYP_LIBRARIES: [&str; 2] = ["@mapbox/node-pre-gyp", "node-pre-gyp"];

/// Package name of the native build helper
pub const GYP_BUILD_LIBRARY: &str = "node-gyp-build";

/// A question for a delegated locator library
#[derive(Debug, Clone, Copy)]
pub enum LocateRequest<'a> {
    /// `require(library).find(package_json, { target_platform, target_arch, target })`
    PreGyp {
        /// Installed library directory
        library: &'a Path,
        /// Absolute path of the package's `package.json`
        package_json: &'a Path,
    },
    /// `require(library).path(root)`
    GypBuild {
        /// Installed library directory
        library: &'a Path,
        /// Package directory to search
        root: &'a Path,
    },
}

/// One way of answering a [`LocateRequest`].
///
/// Backends never fail loudly: anything that goes wrong means "unavailable"
/// and the next backend gets its turn.
pub trait LocatorBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// The binary path the library would return, if it can be determined.
    fn locate(&self, request: &LocateRequest<'_>) -> Option<PathBuf>;
}

/// Rust reimplementation of the delegated libraries' lookups.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    target: TargetEnv,
    manifests: ManifestCache,
}

impl StaticBackend {
    /// Evaluate lookups for `target`, reading manifests through `manifests`.
    pub fn new(target: TargetEnv, manifests: ManifestCache) -> Self {
        Self { target, manifests }
    }
}

impl LocatorBackend for StaticBackend {
    fn name(&self) -> &str {
        "static"
    }

    fn locate(&self, request: &LocateRequest<'_>) -> Option<PathBuf> {
        match *request {
            LocateRequest::PreGyp { package_json, .. } => {
                pregyp::find(&self.manifests, package_json, &self.target)
            }
            LocateRequest::GypBuild { root, .. } => {
                gyp_build::resolve(&self.manifests, root, &self.target)
            }
        }
    }
}

/// Resolves binary paths for the idiom recognizers and the resolve hook
pub struct Locator {
    walk: Arc<dyn AncestorWalk>,
    target: TargetEnv,
    backends: Vec<Arc<dyn LocatorBackend>>,
    default_binding_name: String,
    compiled_dir: String,
}

impl Locator {
    /// Create a locator with explicit backends.
    pub fn new(
        walk: Arc<dyn AncestorWalk>,
        target: TargetEnv,
        backends: Vec<Arc<dyn LocatorBackend>>,
        default_binding_name: impl Into<String>,
    ) -> Self {
        Self {
            walk,
            target,
            backends,
            default_binding_name: default_binding_name.into(),
            compiled_dir: std::env::var("NODE_BINDINGS_COMPILED_DIR")
                .unwrap_or_else(|_| "compiled".to_string()),
        }
    }

    /// Create a locator from plugin options, walking the real filesystem.
    pub fn from_options(options: &NativeOptions, manifests: ManifestCache) -> Result<Self> {
        let target = options.target_env()?;
        let backends = options
            .locator_backends
            .iter()
            .map(|kind| -> Arc<dyn LocatorBackend> {
                match kind {
                    BackendKind::Static => {
                        Arc::new(StaticBackend::new(target.clone(), manifests.clone()))
                    }
                    BackendKind::Node => Arc::new(NodeBackend::new(&options.node, target.clone())),
                }
            })
            .collect();
        debug!(
            "Locator for {}-{} (node {}, napi {})",
            target.platform, target.arch, target.node_version, target.napi_version
        );
        Ok(Self::new(
            Arc::new(FsWalk::new()),
            target,
            backends,
            options.default_binding_name.clone(),
        ))
    }

    /// Replace the ancestor walk.
    pub fn with_walk(mut self, walk: Arc<dyn AncestorWalk>) -> Self {
        self.walk = walk;
        self
    }

    /// Replace the delegated library backends.
    pub fn with_backends(mut self, backends: Vec<Arc<dyn LocatorBackend>>) -> Self {
        self.backends = backends;
        self
    }

    /// Override the `compiled` directory of the bindings lookup.
    pub fn with_compiled_dir(mut self, dir: impl Into<String>) -> Self {
        self.compiled_dir = dir.into();
        self
    }

    /// Platform the binaries are selected for
    pub fn target(&self) -> &TargetEnv {
        &self.target
    }

    /// Ancestor walk used by every lookup
    pub fn walk(&self) -> &dyn AncestorWalk {
        self.walk.as_ref()
    }

    /// Binary returned by `node-pre-gyp`'s `find` for `package_json`.
    ///
    /// The library is looked up from `module_dir` upwards; `preferred` is the
    /// package name the module itself imported and is tried first at each
    /// level.
    pub fn pre_gyp(
        &self,
        module_dir: &Path,
        package_json: &Path,
        preferred: Option<&str>,
    ) -> Option<PathBuf> {
        let names = match preferred {
            Some(name) if name == PRE_GYP_LIBRARIES[1] => [PRE_GYP_LIBRARIES[1], PRE_GYP_LIBRARIES[0]],
            _ => PRE_GYP_LIBRARIES,
        };
        let Some(library) = find_library(self.walk(), module_dir, &names) else {
            debug!("No node-pre-gyp installation above {}", module_dir.display());
            return None;
        };
        self.delegate(&LocateRequest::PreGyp {
            library: &library,
            package_json,
        })
    }

    /// Binary returned by `node-gyp-build`'s `path` for `root`.
    pub fn gyp_build(&self, module_dir: &Path, root: &Path) -> Option<PathBuf> {
        let Some(library) = find_library(self.walk(), module_dir, &[GYP_BUILD_LIBRARY]) else {
            debug!("No node-gyp-build installation above {}", module_dir.display());
            return None;
        };
        self.delegate(&LocateRequest::GypBuild {
            library: &library,
            root,
        })
    }

    fn delegate(&self, request: &LocateRequest<'_>) -> Option<PathBuf> {
        self.backends.iter().find_map(|backend| {
            let found = backend.locate(request);
            debug!("{} backend: {:?} -> {:?}", backend.name(), request, found);
            found
        })
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("target", &self.target)
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("default_binding_name", &self.default_binding_name)
            .field("compiled_dir", &self.compiled_dir)
            .finish()
    }
}

/// Lexically resolve `.` and `..` components.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;

    /// Write `contents` at `root/rel`, creating parents.
    pub(crate) fn touch(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    pub(crate) fn static_locator(root: &Path) -> Locator {
        let target =
            TargetEnv::with_overrides(Some("linux"), Some("x64"), Some("20.11.1"), Some(9), Some("glibc"))
                .unwrap();
        let backend: Arc<dyn LocatorBackend> =
            Arc::new(StaticBackend::new(target.clone(), ManifestCache::new()));
        Locator::new(Arc::new(FsWalk::with_ceiling(root)), target, vec![backend], "bindings.node")
            .with_compiled_dir("compiled")
    }

    struct Fixed(&'static str);

    impl LocatorBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn locate(&self, _request: &LocateRequest<'_>) -> Option<PathBuf> {
            Some(PathBuf::from(self.0))
        }
    }

    struct Unavailable;

    impl LocatorBackend for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn locate(&self, _request: &LocateRequest<'_>) -> Option<PathBuf> {
            None
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_path(Path::new("../a/../../b")), PathBuf::from("../../b"));
    }

    #[test]
    fn test_backends_tried_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "node_modules/node-gyp-build/package.json", "{}");
        let locator = static_locator(tmp.path())
            .with_backends(vec![Arc::new(Unavailable), Arc::new(Fixed("/x/a.node"))]);

        assert_eq!(
            locator.gyp_build(tmp.path(), tmp.path()),
            Some(PathBuf::from("/x/a.node"))
        );
    }

    #[test]
    fn test_missing_library_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = static_locator(tmp.path()).with_backends(vec![Arc::new(Fixed("/x/a.node"))]);

        assert_eq!(locator.gyp_build(tmp.path(), tmp.path()), None);
        assert_eq!(
            locator.pre_gyp(tmp.path(), &tmp.path().join("package.json"), None),
            None
        );
    }
}
