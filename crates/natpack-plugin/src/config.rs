// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Plugin configuration
//!
//! Options are read from `natpack.json` (camelCase keys, like the options
//! object of a JavaScript bundler plugin), then overridden by `NATPACK_*`
//! environment variables, then by whatever the embedding host sets directly.
//! The per-binary naming closure can only be supplied programmatically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{NativeError, Result};
use crate::loader::LoaderMode;
use crate::registry::NameMapper;
use crate::target::TargetEnv;

/// Default configuration file name
pub const CONFIG_FILE: &str = "natpack.json";

/// Module system of the bundle being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleTarget {
    /// CommonJS output, `require` is available
    #[default]
    Cjs,
    /// ES module output, `require` must be created
    Esm,
}

/// When registered binaries are copied to the output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    /// Copy as soon as a binary is registered
    #[default]
    Eager,
    /// Copy everything once the build ends
    Deferred,
}

/// Strategy used to evaluate a delegated locator library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Reimplementation of the library's lookup in Rust
    Static,
    /// Run the installed library with `node`
    Node,
}

/// Options for the plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NativeOptions {
    /// Where the extracted binaries are physically written
    pub copy_to: PathBuf,

    /// The same folder, relative to the output bundle
    pub dest_dir: String,

    /// Load binaries with `process.dlopen` instead of `require`
    pub dlopen: bool,

    /// Module system of the produced bundle
    pub target: ModuleTarget,

    /// Target `process.platform` (defaults to the host)
    pub platform: Option<String>,

    /// Target `process.arch` (defaults to the host)
    pub arch: Option<String>,

    /// Target Node.js version
    pub node_version: Option<String>,

    /// Target N-API version
    pub napi_version: Option<u32>,

    /// Target C library (`glibc` / `musl`)
    pub libc: Option<String>,

    /// Binary name used by `require('bindings')()` without an argument
    pub default_binding_name: String,

    /// Copy binaries at registration or at build end
    pub copy_mode: CopyMode,

    /// Ignore matches inside comments and string literals
    pub skip_inert: bool,

    /// Locator backends, tried in order
    pub locator_backends: Vec<BackendKind>,

    /// `node` executable used by the node backend and the secondary bundler
    pub node: PathBuf,

    /// Project root used for native package discovery
    pub root: Option<PathBuf>,

    /// Output names keyed by glob over the resolved binary path
    pub rename: BTreeMap<String, String>,

    /// Globs over resolved binary paths that are recognized but left alone
    pub ignore: Vec<String>,

    /// Packages handled by the secondary bundler (discovered when unset)
    pub natives: Option<Vec<String>>,

    /// Secondary bundling pass
    pub secondary: Option<SecondaryOptions>,

    /// Per-binary naming override
    #[serde(skip)]
    pub map: Option<NameMapper>,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self {
            copy_to: PathBuf::from("dist/native"),
            dest_dir: "./".to_string(),
            dlopen: false,
            target: ModuleTarget::Cjs,
            platform: None,
            arch: None,
            node_version: None,
            napi_version: None,
            libc: None,
            default_binding_name: "bindings.node".to_string(),
            copy_mode: CopyMode::Eager,
            skip_inert: true,
            locator_backends: vec![BackendKind::Static, BackendKind::Node],
            node: PathBuf::from("node"),
            root: None,
            rename: BTreeMap::new(),
            ignore: Vec::new(),
            natives: None,
            secondary: None,
            map: None,
        }
    }
}

impl NativeOptions {
    /// Load options from `path`, or from `natpack.json` in the working
    /// directory when it exists, then apply `NATPACK_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut options = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).is_file() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        options.load_from_env();
        Ok(options)
    }

    /// Parse options from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let options = serde_json::from_str(&content)
            .map_err(|e| NativeError::config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded options from {}", path.display());
        Ok(options)
    }

    /// Apply `NATPACK_*` environment variables.
    pub fn load_from_env(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("NATPACK_") {
                let config_key = config_key.to_lowercase().replace('_', "-");
                self.set(&config_key, &value);
            }
        }
    }

    /// Set an option from its kebab-case name.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "copy-to" => self.copy_to = PathBuf::from(value),
            "dest-dir" => self.dest_dir = value.to_string(),
            "dlopen" => self.dlopen = value == "true",
            "target" => match value {
                "cjs" => self.target = ModuleTarget::Cjs,
                "esm" => self.target = ModuleTarget::Esm,
                _ => warn!("Ignoring unknown target '{}'", value),
            },
            "platform" => self.platform = Some(value.to_string()),
            "arch" => self.arch = Some(value.to_string()),
            "node-version" => self.node_version = Some(value.to_string()),
            "napi-version" => match value.parse() {
                Ok(n) => self.napi_version = Some(n),
                Err(_) => warn!("Ignoring invalid napi-version '{}'", value),
            },
            "libc" => self.libc = Some(value.to_string()),
            "default-binding-name" => self.default_binding_name = value.to_string(),
            "copy-mode" => match value {
                "eager" => self.copy_mode = CopyMode::Eager,
                "deferred" => self.copy_mode = CopyMode::Deferred,
                _ => warn!("Ignoring unknown copy-mode '{}'", value),
            },
            "skip-inert" => self.skip_inert = value == "true",
            "locator-backends" => {
                self.locator_backends = value
                    .split(',')
                    .filter_map(|name| match name.trim() {
                        "static" => Some(BackendKind::Static),
                        "node" => Some(BackendKind::Node),
                        other => {
                            warn!("Ignoring unknown locator backend '{}'", other);
                            None
                        }
                    })
                    .collect();
            }
            "node" => self.node = PathBuf::from(value),
            "root" => self.root = Some(PathBuf::from(value)),
            _ => debug!("Ignoring unknown option '{}'", key),
        }
    }

    /// Target environment described by these options.
    pub fn target_env(&self) -> Result<TargetEnv> {
        TargetEnv::with_overrides(
            self.platform.as_deref(),
            self.arch.as_deref(),
            self.node_version.as_deref(),
            self.napi_version,
            self.libc.as_deref(),
        )
    }

    /// Loader flavor for a binary whose output id is `output_id`.
    ///
    /// `require` only loads files with the `.node` extension, so anything
    /// else has to go through `process.dlopen`.
    pub fn loader_mode(&self, output_id: &str) -> LoaderMode {
        let default_ext = Path::new(output_id)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("node"));
        if self.dlopen || !default_ext {
            LoaderMode::Dlopen
        } else {
            match self.target {
                ModuleTarget::Esm => LoaderMode::Esm,
                ModuleTarget::Cjs => LoaderMode::Cjs,
            }
        }
    }

    /// Project root for discovery, defaulting to the working directory.
    pub fn project_root(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Options for the self-contained bundling pass per native package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecondaryOptions {
    /// Options passed to `node-loader`
    pub node_loader: NodeLoaderOptions,

    /// Options passed to `@vercel/webpack-asset-relocator-loader`
    pub asset_relocator: AssetRelocatorOptions,

    /// Packages mirrored verbatim (with their dependencies) instead of bundled
    pub force_copy: Vec<String>,

    /// Path to the webpack CLI entry (defaults to `<root>/node_modules/webpack/bin/webpack.js`)
    pub webpack: Option<PathBuf>,
}

impl SecondaryOptions {
    /// Reject option combinations the loaders would fail on.
    pub fn validate(&self) -> Result<()> {
        if self.node_loader.name.trim().is_empty() {
            return Err(NativeError::ConfigValidation(
                "nodeLoader.name must not be empty".into(),
            ));
        }
        if self.node_loader.flags.is_some_and(|flags| flags < 0) {
            return Err(NativeError::ConfigValidation(
                "nodeLoader.flags must be a non-negative dlopen flag set".into(),
            ));
        }
        let base = &self.asset_relocator.output_asset_base;
        if base.is_empty() || Path::new(base).is_absolute() {
            return Err(NativeError::ConfigValidation(format!(
                "assetRelocator.outputAssetBase must be a relative folder, got '{}'",
                base
            )));
        }
        if let Some(name) = self.force_copy.iter().find(|name| name.trim().is_empty()) {
            return Err(NativeError::ConfigValidation(format!(
                "forceCopy contains an empty package name: '{}'",
                name
            )));
        }
        Ok(())
    }
}

/// `node-loader` options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeLoaderOptions {
    /// `process.dlopen` flags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<i32>,

    /// Filename template for emitted binaries
    pub name: String,
}

impl Default for NodeLoaderOptions {
    fn default() -> Self {
        Self {
            flags: None,
            name: "[contenthash].[ext]".to_string(),
        }
    }
}

/// `@vercel/webpack-asset-relocator-loader` options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetRelocatorOptions {
    /// Base folder for asset emission
    pub output_asset_base: String,

    /// Restrict asset emission to this folder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_asset_base: Option<PathBuf>,

    /// Permit emitting an entire `__dirname`
    pub emit_dirname_all: bool,

    /// Permit emitting the entire filter base
    pub emit_filter_asset_base_all: bool,

    /// Asset names already emitted elsewhere
    pub existing_asset_names: Vec<String>,

    /// Wrapper compatibility mode
    pub wrapper_compatibility: bool,

    /// Build for `NODE_ENV=production`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,

    /// Working directory for the loader
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// Verbose loader logging
    pub debug_log: bool,
}

impl Default for AssetRelocatorOptions {
    fn default() -> Self {
        Self {
            output_asset_base: "assets".to_string(),
            filter_asset_base: None,
            emit_dirname_all: false,
            emit_filter_asset_base_all: false,
            existing_asset_names: Vec::new(),
            wrapper_compatibility: false,
            production: None,
            cwd: None,
            debug_log: false,
        }
    }
}
