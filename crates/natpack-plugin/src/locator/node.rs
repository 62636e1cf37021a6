// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Locator backend that runs the installed library with `node`

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{LocateRequest, LocatorBackend};
use crate::target::TargetEnv;

const PRE_GYP_SCRIPT: &str = "\
const lib = require(process.argv[1]);
const found = lib.find(process.argv[2], {
  target_platform: process.argv[3],
  target_arch: process.argv[4],
  target: process.argv[5],
});
process.stdout.write(String(found));
";

const GYP_BUILD_SCRIPT: &str = "\
process.stdout.write(String(require(process.argv[1]).path(process.argv[2])));
";

/// Evaluates the delegated library in a `node` child process.
///
/// The child runs in the directory of the package being resolved, so the
/// library sees the same layout it would at runtime. `node-gyp-build` reads
/// the target from `npm_config_platform` / `npm_config_arch` / `LIBC`.
#[derive(Debug, Clone)]
pub struct NodeBackend {
    node: PathBuf,
    target: TargetEnv,
}

impl NodeBackend {
    /// Use the `node` executable at `node` (looked up on `PATH` if bare).
    pub fn new(node: impl Into<PathBuf>, target: TargetEnv) -> Self {
        Self {
            node: node.into(),
            target,
        }
    }

    fn run(&self, cwd: &Path, script: &str, args: &[&str]) -> Option<PathBuf> {
        let output = Command::new(&self.node)
            .arg("-e")
            .arg(script)
            .args(args)
            .current_dir(cwd)
            .env("npm_config_platform", &self.target.platform)
            .env("npm_config_arch", &self.target.arch)
            .env("LIBC", &self.target.libc)
            .output()
            .map_err(|e| debug!("Cannot run {}: {}", self.node.display(), e))
            .ok()?;

        if !output.status.success() {
            debug!(
                "node exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return None;
        }
        let stdout = String::from_utf8(output.stdout).ok()?;
        let path = stdout.trim();
        if path.is_empty() || path == "undefined" {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

impl LocatorBackend for NodeBackend {
    fn name(&self) -> &str {
        "node"
    }

    fn locate(&self, request: &LocateRequest<'_>) -> Option<PathBuf> {
        match *request {
            LocateRequest::PreGyp {
                library,
                package_json,
            } => {
                let cwd = package_json.parent()?;
                let node_version = self.target.node_version_string();
                self.run(
                    cwd,
                    PRE_GYP_SCRIPT,
                    &[
                        library.to_str()?,
                        package_json.to_str()?,
                        &self.target.platform,
                        &self.target.arch,
                        &node_version,
                    ],
                )
            }
            LocateRequest::GypBuild { library, root } => {
                self.run(root, GYP_BUILD_SCRIPT, &[library.to_str()?, root.to_str()?])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_executable_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = NodeBackend::new(tmp.path().join("no-such-node"), TargetEnv::host());
        let request = LocateRequest::GypBuild {
            library: tmp.path(),
            root: tmp.path(),
        };
        assert_eq!(backend.locate(&request), None);
    }
}
