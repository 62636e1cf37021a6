//! Package.json parsing.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{NpmError, Result};

/// The parts of a package.json that matter for locating native binaries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    /// Package name
    pub name: Option<String>,

    /// Package version
    pub version: Option<String>,

    /// Production dependencies
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Development dependencies
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,

    /// Optional dependencies
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,

    /// Pre-built binary configuration (node-pre-gyp)
    pub binary: Option<BinarySection>,
}

/// The `binary` section read by node-pre-gyp.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BinarySection {
    /// Name of the compiled module, without extension
    pub module_name: Option<String>,

    /// Template for the directory holding the compiled module
    pub module_path: Option<String>,

    /// N-API versions the package can be built for
    #[serde(default)]
    pub napi_versions: Vec<u32>,
}

impl PackageJson {
    /// Read package.json from a file path.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NpmError::PackageJsonNotFound(
                    path.parent().unwrap_or(path).display().to_string(),
                )
            } else {
                e.into()
            }
        })?;
        serde_json::from_str(&content).map_err(|e| NpmError::InvalidPackageJson {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse package.json from a string.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Get the package identifier (name@version).
    pub fn id(&self) -> String {
        match (&self.name, &self.version) {
            (Some(name), Some(version)) => format!("{}@{}", name, version),
            (Some(name), None) => name.clone(),
            _ => String::from("unnamed"),
        }
    }

    /// Dependency names declared for the project itself (production + dev).
    pub fn declared_dependency_names(&self) -> Vec<String> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .cloned()
            .collect()
    }
}

/// Cache of parsed manifests keyed by absolute package.json path.
///
/// Many modules of the same package are transformed in one build, so each
/// manifest is parsed once and shared.
#[derive(Debug, Default, Clone)]
pub struct ManifestCache {
    entries: Arc<DashMap<PathBuf, Arc<PackageJson>>>,
}

impl ManifestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the manifest at `path`, reading it on first use.
    pub fn load(&self, path: &Path) -> Result<Arc<PackageJson>> {
        if let Some(hit) = self.entries.get(path) {
            return Ok(hit.clone());
        }
        let manifest = Arc::new(PackageJson::read(path)?);
        debug!("Parsed manifest {} ({})", path.display(), manifest.id());
        self.entries.insert(path.to_path_buf(), manifest.clone());
        Ok(manifest)
    }

    /// Load `package.json` inside `dir`.
    pub fn load_dir(&self, dir: &Path) -> Result<Arc<PackageJson>> {
        self.load(&dir.join("package.json"))
    }

    /// Number of cached manifests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
