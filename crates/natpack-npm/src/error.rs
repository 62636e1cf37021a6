//! Error types for natpack-npm.

use thiserror::Error;

/// Result type for package layout operations.
pub type Result<T> = std::result::Result<T, NpmError>;

/// Errors raised while reading an installed package tree.
#[derive(Error, Debug)]
pub enum NpmError {
    /// Package not installed anywhere visible from the requesting directory
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Invalid package.json
    #[error("Invalid package.json at {path}: {reason}")]
    InvalidPackageJson { path: String, reason: String },

    /// Package.json not found
    #[error("package.json not found in {0}")]
    PackageJsonNotFound(String),

    /// Invalid glob pattern
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
