// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # natpack-plugin
//!
//! Bundler plugin engine that carries native Node.js addons (`.node` and
//! `.dll` binaries) through a JavaScript bundle.
//!
//! Bundlers can follow `require('./x.js')` but not the runtime lookups
//! native packages use to find their compiled binary. This crate recognizes
//! those lookups in module source, works out which file they would load on the
//! target platform, and rewrites them into an import of a small loader module
//! pointing at a copy of the binary in the output directory:
//!
//! - `node-pre-gyp` `binary.find(...)` lookups
//! - `require('node-gyp-build')(__dirname)`
//! - `require('bindings')('addon')`
//! - plain `require('./build/Release/addon.node')`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use natpack_plugin::{LogContext, NativeOptions, NativePlugin};
//!
//! let plugin = NativePlugin::new(NativeOptions::load(None)?)?;
//! plugin.build_start()?;
//! if let Some(out) = plugin.transform(&LogContext, &source, "/app/node_modules/sqlite3/lib/sqlite3-binding.js")? {
//!     println!("{}", out.code);
//! }
//! let report = plugin.build_end(&LogContext, None).await?;
//! ```
//!
//! Packages that cannot be rewritten in place can be handed to a secondary
//! bundler (see [`emit`]), which bundles them on their own and exposes them
//! through ES module shims.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod emit;
pub mod error;
pub mod idiom;
pub mod loader;
pub mod locator;
pub mod plugin;
pub mod registry;
pub mod rewrite;
pub mod target;

// Re-exports
pub use config::{BackendKind, CopyMode, ModuleTarget, NativeOptions, SecondaryOptions};
pub use context::{CollectContext, HostContext, LogContext, TAG};
pub use emit::{EmitReport, SecondaryBundler};
pub use error::{NativeError, Result};
pub use idiom::{IdiomKind, IdiomMatch};
pub use loader::{LoaderMode, PREFIX};
pub use locator::{Locator, LocatorBackend};
pub use plugin::{NativePlugin, TransformOutput};
pub use registry::{BinaryRecord, Mapping, NameMapper, Registry};
pub use target::TargetEnv;

/// Version of the natpack plugin
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
