// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Secondary bundling pass
//!
//! Some native packages do more at load time than any idiom covers. For
//! those, the whole package is run through webpack with `node-loader` and
//! `@vercel/webpack-asset-relocator-loader`, producing one CommonJS file that
//! carries its binaries along.

use futures::future::BoxFuture;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{NativeOptions, SecondaryOptions};
use crate::error::{NativeError, Result};

const EXPORTS_SCRIPT: &str =
    "process.stdout.write(JSON.stringify(Object.getOwnPropertyNames(require(process.argv[1]))));";

/// One package to bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleJob {
    /// Package name
    pub package: String,
    /// Installed package directory (the entry point)
    pub package_dir: PathBuf,
    /// Directory receiving `index.js` and the relocated assets
    pub output_dir: PathBuf,
    /// Project root, the bundler's working directory
    pub root: PathBuf,
}

/// Produces a self-contained CommonJS bundle for a native package.
pub trait SecondaryBundler: Send + Sync {
    /// Bundle `job.package_dir` into `job.output_dir/index.js`.
    fn bundle<'a>(&'a self, job: &'a BundleJob) -> BoxFuture<'a, Result<()>>;

    /// Own property names of the loaded package, if they can be determined.
    fn exports<'a>(&'a self, package_dir: &'a Path) -> BoxFuture<'a, Option<Vec<String>>>;
}

/// Runs webpack through `node`
#[derive(Debug, Clone)]
pub struct WebpackBundler {
    node: PathBuf,
    webpack: PathBuf,
    options: SecondaryOptions,
}

impl WebpackBundler {
    /// Create a bundler running `webpack` (the CLI script) with `node`.
    pub fn new(node: impl Into<PathBuf>, webpack: impl Into<PathBuf>, options: SecondaryOptions) -> Self {
        Self {
            node: node.into(),
            webpack: webpack.into(),
            options,
        }
    }

    /// Bundler for the project at `root`, using its installed webpack unless
    /// the options name another one.
    pub fn from_options(options: &NativeOptions, secondary: &SecondaryOptions, root: &Path) -> Self {
        let webpack = secondary
            .webpack
            .clone()
            .unwrap_or_else(|| root.join("node_modules/webpack/bin/webpack.js"));
        Self::new(&options.node, webpack, secondary.clone())
    }

    /// Source of the webpack configuration for `job`.
    pub fn render_config(&self, job: &BundleJob) -> Result<String> {
        let node_loader = serde_json::to_value(&self.options.node_loader)?;
        let relocator = serde_json::to_value(&self.options.asset_relocator)?;
        let mode = if self.options.asset_relocator.production == Some(false) {
            "development"
        } else {
            "production"
        };

        let config = json!({
            "mode": mode,
            "target": "node",
            "context": job.root.to_string_lossy(),
            "entry": job.package_dir.to_string_lossy(),
            "output": {
                "path": job.output_dir.to_string_lossy(),
                "filename": "index.js",
                "library": { "type": "commonjs2" },
            },
            "optimization": { "minimize": false },
            "node": { "__dirname": false, "__filename": false },
            "resolve": { "extensions": [".js", ".cjs", ".json", ".node"] },
            "module": {
                "rules": [
                    {
                        "use": { "loader": "node-loader", "options": node_loader },
                    },
                    {
                        "parser": { "amd": false },
                        "use": {
                            "loader": "@vercel/webpack-asset-relocator-loader",
                            "options": relocator,
                        },
                    },
                ],
            },
        });

        Ok(format!(
            "const config = {};\n\
             config.module.rules[0].test = /\\.node$/;\n\
             config.module.rules[1].test = /[/\\\\]node_modules[/\\\\].+\\.(m?js|node)$/;\n\
             module.exports = config;\n",
            serde_json::to_string_pretty(&config)?
        ))
    }

    async fn run(&self, job: &BundleJob) -> Result<()> {
        let workdir = tempfile::tempdir()?;
        let config_path = workdir.path().join("webpack.config.cjs");
        tokio::fs::write(&config_path, self.render_config(job)?).await?;
        tokio::fs::create_dir_all(&job.output_dir).await?;

        info!("Bundling {} with webpack", job.package);
        let output = Command::new(&self.node)
            .arg(&self.webpack)
            .arg("--config")
            .arg(&config_path)
            .current_dir(&job.root)
            .output()
            .await
            .map_err(|e| {
                NativeError::bundler(&job.package, format!("cannot run {}: {}", self.node.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let reason = if stderr.trim().is_empty() { stdout } else { stderr };
            return Err(NativeError::bundler(
                &job.package,
                format!("webpack exited with {}: {}", output.status, reason.trim()),
            ));
        }
        debug!("webpack output for {}: {}", job.package, String::from_utf8_lossy(&output.stdout).trim());
        Ok(())
    }

    async fn probe_exports(&self, package_dir: &Path) -> Option<Vec<String>> {
        let output = Command::new(&self.node)
            .arg("-e")
            .arg(EXPORTS_SCRIPT)
            .arg(package_dir)
            .output()
            .await
            .map_err(|e| debug!("Export probe for {} failed: {}", package_dir.display(), e))
            .ok()?;
        if !output.status.success() {
            debug!(
                "Export probe for {} exited with {}",
                package_dir.display(),
                output.status
            );
            return None;
        }
        serde_json::from_slice(&output.stdout).ok()
    }
}

impl SecondaryBundler for WebpackBundler {
    fn bundle<'a>(&'a self, job: &'a BundleJob) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.run(job))
    }

    fn exports<'a>(&'a self, package_dir: &'a Path) -> BoxFuture<'a, Option<Vec<String>>> {
        Box::pin(self.probe_exports(package_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> BundleJob {
        BundleJob {
            package: "serialport".into(),
            package_dir: PathBuf::from("/app/node_modules/serialport"),
            output_dir: PathBuf::from("/app/dist/native/serialport"),
            root: PathBuf::from("/app"),
        }
    }

    #[test]
    fn test_config_carries_loader_options() {
        let mut options = SecondaryOptions::default();
        options.node_loader.flags = Some(2);
        options.asset_relocator.output_asset_base = "native_modules".into();
        let bundler = WebpackBundler::new("node", "/app/node_modules/webpack/bin/webpack.js", options);

        let config = bundler.render_config(&job()).unwrap();
        assert!(config.contains("\"loader\": \"node-loader\""));
        assert!(config.contains("\"flags\": 2"));
        assert!(config.contains("\"name\": \"[contenthash].[ext]\""));
        assert!(config.contains("\"outputAssetBase\": \"native_modules\""));
        assert!(config.contains("\"path\": \"/app/dist/native/serialport\""));
        assert!(config.contains("config.module.rules[0].test = /\\.node$/;"));
        assert!(config.ends_with("module.exports = config;\n"));
    }

    #[tokio::test]
    async fn test_missing_node_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let mut job = job();
        job.root = tmp.path().to_path_buf();
        job.output_dir = tmp.path().join("out");
        let bundler = WebpackBundler::new(tmp.path().join("no-node"), "webpack.js", SecondaryOptions::default());

        let err = bundler.bundle(&job).await.unwrap_err();
        assert!(matches!(err, NativeError::SecondaryBundler { ref package, .. } if package == "serialport"));
        assert_eq!(bundler.exports(tmp.path()).await, None);
    }
}
