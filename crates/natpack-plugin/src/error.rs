// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the native addon plugin

use std::path::PathBuf;
use thiserror::Error;

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, NativeError>;

/// Errors that can occur while carrying native addons through a build
#[derive(Debug, Error)]
pub enum NativeError {
    /// Invalid plugin configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Secondary bundler options failed validation
    #[error("Invalid secondary bundler options: {0}")]
    ConfigValidation(String),

    /// A synthetic id reached the loader without a registered binary
    #[error("No native binary registered for '{0}'")]
    UnknownSyntheticId(String),

    /// The secondary bundling pass failed
    #[error("Secondary bundler failed for '{package}': {reason}")]
    SecondaryBundler {
        /// Package being bundled
        package: String,
        /// Reason for failure
        reason: String,
    },

    /// Copying a file into the output tree failed
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        /// Source file
        from: PathBuf,
        /// Destination file
        to: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Package layout error
    #[error(transparent)]
    Npm(#[from] natpack_npm::NpmError),

    /// File system error
    #[error("File system error: {0}")]
    Fs(#[from] std::io::Error),

    /// Directory traversal error
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid version string
    #[error("Invalid version: {0}")]
    Semver(#[from] semver::Error),

    /// Invalid glob pattern in configuration
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Invalid source pattern
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

impl NativeError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a secondary bundler failure
    pub fn bundler(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SecondaryBundler {
            package: package.into(),
            reason: reason.into(),
        }
    }
}
