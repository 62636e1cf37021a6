// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Target platform description
//!
//! Native binaries are selected for exactly one platform/arch per build. The
//! names used here are Node's (`process.platform`, `process.arch`), since that
//! is what every locator convention keys its directories on.

use semver::Version;

use crate::error::Result;

/// N-API version shipped with the default Node.js release (20.11.1)
pub const DEFAULT_NAPI_VERSION: u32 = 9;

/// The platform a build's binaries must run on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEnv {
    /// `process.platform` value (`linux`, `darwin`, `win32`, ...)
    pub platform: String,
    /// `process.arch` value (`x64`, `arm64`, `ia32`, ...)
    pub arch: String,
    /// Node.js version (`process.versions.node`)
    pub node_version: Version,
    /// N-API version supported by the runtime
    pub napi_version: u32,
    /// C library flavor (`glibc`, `musl`, or `unknown` off Linux)
    pub libc: String,
}

impl TargetEnv {
    /// Describe the machine running the build.
    pub fn host() -> Self {
        let platform = node_platform(std::env::consts::OS).to_string();
        let libc = default_libc(&platform).to_string();
        Self {
            platform,
            arch: node_arch(std::env::consts::ARCH).to_string(),
            node_version: Version::new(20, 11, 1),
            napi_version: DEFAULT_NAPI_VERSION,
            libc,
        }
    }

    /// Host defaults with the given overrides applied.
    pub fn with_overrides(
        platform: Option<&str>,
        arch: Option<&str>,
        node_version: Option<&str>,
        napi_version: Option<u32>,
        libc: Option<&str>,
    ) -> Result<Self> {
        let mut env = Self::host();
        if let Some(platform) = platform {
            env.platform = platform.to_string();
            env.libc = default_libc(platform).to_string();
        }
        if let Some(arch) = arch {
            env.arch = arch.to_string();
        }
        if let Some(version) = node_version {
            env.node_version = Version::parse(version.trim_start_matches('v'))?;
        }
        if let Some(napi) = napi_version {
            env.napi_version = napi;
        }
        if let Some(libc) = libc {
            env.libc = libc.to_string();
        }
        Ok(env)
    }

    /// `NODE_MODULE_VERSION` of the configured Node release.
    pub fn module_abi(&self) -> u32 {
        match self.node_version.major {
            8 => 57,
            9 => 59,
            10 => 64,
            11 => 67,
            12 => 72,
            13 => 79,
            14 => 83,
            15 => 88,
            16 => 93,
            17 => 102,
            18 => 108,
            19 => 111,
            20 => 115,
            21 => 120,
            22 => 127,
            23 => 131,
            _ => 137,
        }
    }

    /// ABI label used in pre-built binary paths (`node-v115`).
    pub fn node_abi(&self) -> String {
        format!("node-v{}", self.module_abi())
    }

    /// `process.versions.node` string.
    pub fn node_version_string(&self) -> String {
        self.node_version.to_string()
    }
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::host()
    }
}

/// Map a Rust OS name to Node's `process.platform`.
pub fn node_platform(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        "windows" => "win32",
        "solaris" | "illumos" => "sunos",
        other => other,
    }
}

/// Map a Rust architecture name to Node's `process.arch`.
pub fn node_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}

fn default_libc(platform: &str) -> &'static str {
    if platform != "linux" {
        "unknown"
    } else if cfg!(target_env = "musl") {
        "musl"
    } else {
        "glibc"
    }
}
