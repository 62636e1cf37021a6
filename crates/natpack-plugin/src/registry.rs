// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Registry of native binaries seen during one build
//!
//! Every binary resolved by any recognizer or by the resolve hook is
//! registered here exactly once, keyed by its absolute source path. The record
//! fixes where the binary lands in the output tree and the id the bundle uses
//! to reach it.

use glob::Pattern;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{CopyMode, NativeOptions};
use crate::context::{self, HostContext};
use crate::error::Result;

/// Outcome of a naming override for one binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    /// Use this file name, placed by the default layout
    Name(String),
    /// Use this output id and copy destination as given
    Explicit {
        /// Output id seen by the bundle
        name: String,
        /// File the binary is copied to
        copy_to: PathBuf,
    },
    /// Recognize the binary but leave it alone
    Ignore,
    /// No opinion, apply the default layout
    Default,
}

/// User-supplied naming override, run once per binary
#[derive(Clone)]
pub struct NameMapper(Arc<dyn Fn(&Path) -> Mapping + Send + Sync>);

impl NameMapper {
    /// Wrap a naming closure
    pub fn new(f: impl Fn(&Path) -> Mapping + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Build a mapper from `rename` and `ignore` globs over source paths.
    pub fn from_patterns(
        rename: &std::collections::BTreeMap<String, String>,
        ignore: &[String],
    ) -> Result<Self> {
        let rename = rename
            .iter()
            .map(|(pattern, name)| Ok((Pattern::new(pattern)?, name.clone())))
            .collect::<Result<Vec<_>>>()?;
        let ignore = ignore
            .iter()
            .map(|pattern| Ok(Pattern::new(pattern)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(move |path| {
            if ignore.iter().any(|p| p.matches_path(path)) {
                return Mapping::Ignore;
            }
            rename
                .iter()
                .find(|(p, _)| p.matches_path(path))
                .map(|(_, name)| Mapping::Name(name.clone()))
                .unwrap_or(Mapping::Default)
        }))
    }

    fn map(&self, path: &Path) -> Mapping {
        (self.0)(path)
    }
}

impl fmt::Debug for NameMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NameMapper(..)")
    }
}

/// One real, on-disk native binary and its place in the output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRecord {
    /// Absolute path of the original binary
    pub source_path: PathBuf,
    /// Id the bundle uses in place of the original load expression
    pub output_id: String,
    /// Where the binary is copied to
    pub output_path: PathBuf,
    /// Recognized but excluded from copying and rewriting
    pub ignored: bool,
}

/// Where default-named binaries go
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// Directory the files are written to
    pub copy_to: PathBuf,
    /// The same directory as seen from the bundle
    pub dest_dir: String,
}

impl OutputLayout {
    /// Output id for a file name: `dest_dir` joined with `/`.
    pub fn rebase(&self, basename: &str) -> String {
        let sep = if self.dest_dir.ends_with('/') || self.dest_dir.ends_with('\\') {
            ""
        } else {
            "/"
        };
        format!("{}{}{}", self.dest_dir, sep, basename).replace('\\', "/")
    }
}

#[derive(Default)]
struct Inner {
    records: HashMap<PathBuf, Arc<BinaryRecord>>,
    order: Vec<PathBuf>,
    copied: HashSet<PathBuf>,
    /// Eager copies that failed and already warned
    reported: HashSet<PathBuf>,
}

/// Build-scoped table of registered binaries
pub struct Registry {
    layout: OutputLayout,
    mapper: Option<NameMapper>,
    copy_mode: CopyMode,
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(layout: OutputLayout, mapper: Option<NameMapper>, copy_mode: CopyMode) -> Self {
        Self {
            layout,
            mapper,
            copy_mode,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Create a registry from plugin options.
    ///
    /// An explicit `map` closure wins over `rename`/`ignore` globs.
    pub fn from_options(options: &NativeOptions) -> Result<Self> {
        let mapper = match &options.map {
            Some(mapper) => Some(mapper.clone()),
            None if !options.rename.is_empty() || !options.ignore.is_empty() => {
                Some(NameMapper::from_patterns(&options.rename, &options.ignore)?)
            }
            None => None,
        };
        Ok(Self::new(
            OutputLayout {
                copy_to: options.copy_to.clone(),
                dest_dir: options.dest_dir.clone(),
            },
            mapper,
            options.copy_mode,
        ))
    }

    /// Output layout used for default names
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Register a binary, returning its record.
    ///
    /// Idempotent: later calls for the same path return the first record
    /// without copying again. In eager mode the binary is copied while the
    /// registry is locked, so concurrent first registrations copy once.
    pub fn register(&self, source_path: &Path, ctx: &dyn HostContext) -> Arc<BinaryRecord> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.records.get(source_path) {
            return existing.clone();
        }

        let mapping = self
            .mapper
            .as_ref()
            .map(|mapper| mapper.map(source_path))
            .unwrap_or(Mapping::Default);

        let record = match mapping {
            Mapping::Explicit { name, copy_to } => BinaryRecord {
                source_path: source_path.to_path_buf(),
                output_id: name,
                output_path: copy_to,
                ignored: false,
            },
            Mapping::Name(name) => self.default_record(&inner, source_path, Path::new(&name), false),
            Mapping::Default => self.default_record(&inner, source_path, source_path, false),
            Mapping::Ignore => self.default_record(&inner, source_path, source_path, true),
        };
        debug!(
            "Registered {} as {} ({})",
            record.source_path.display(),
            record.output_id,
            if record.ignored { "ignored" } else { "active" }
        );

        let record = Arc::new(record);
        inner.records.insert(source_path.to_path_buf(), record.clone());
        inner.order.push(source_path.to_path_buf());

        if self.copy_mode == CopyMode::Eager && !record.ignored {
            if copy_now(&record, ctx) {
                inner.copied.insert(source_path.to_path_buf());
            } else {
                inner.reported.insert(source_path.to_path_buf());
            }
        }

        record
    }

    /// Find a record by output id or by source path.
    pub fn lookup(&self, key: &str) -> Option<Arc<BinaryRecord>> {
        let inner = self.inner.lock();
        if let Some(record) = inner.records.get(Path::new(key)) {
            return Some(record.clone());
        }
        inner
            .records
            .values()
            .find(|record| record.output_id == key)
            .cloned()
    }

    /// All records in registration order.
    pub fn records(&self) -> Vec<Arc<BinaryRecord>> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|path| inner.records.get(path).cloned())
            .collect()
    }

    /// Whether the binary at `source_path` has already been copied.
    pub fn is_copied(&self, source_path: &Path) -> bool {
        self.inner.lock().copied.contains(source_path)
    }

    /// Record that the binary at `source_path` has been copied.
    pub fn mark_copied(&self, source_path: &Path) {
        self.inner.lock().copied.insert(source_path.to_path_buf());
    }

    /// Whether a failed eager copy of `source_path` has already been reported.
    pub fn is_reported(&self, source_path: &Path) -> bool {
        self.inner.lock().reported.contains(source_path)
    }

    /// Number of registered binaries
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Check if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    fn default_record(&self, inner: &Inner, source_path: &Path, name: &Path, ignored: bool) -> BinaryRecord {
        let basename = self.available_basename(inner, name);
        BinaryRecord {
            source_path: source_path.to_path_buf(),
            output_id: self.layout.rebase(&basename),
            output_path: self.layout.copy_to.join(&basename),
            ignored,
        }
    }

    /// First of `name`, `stem_1.ext`, `stem_2.ext`, ... not already used as an output id.
    fn available_basename(&self, inner: &Inner, name: &Path) -> String {
        let file_name = name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = name
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let taken = |candidate: &str| {
            let id = self.layout.rebase(candidate);
            inner.records.values().any(|record| record.output_id == id)
        };

        let mut basename = file_name;
        let mut i = 1;
        while taken(&basename) {
            basename = format!("{}_{}{}", stem, i, ext);
            i += 1;
        }
        basename
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("layout", &self.layout)
            .field("copy_mode", &self.copy_mode)
            .field("records", &self.len())
            .finish()
    }
}

/// Copy one binary synchronously, warning instead of failing.
fn copy_now(record: &BinaryRecord, ctx: &dyn HostContext) -> bool {
    if !record.source_path.is_file() {
        context::warn(ctx, format!("{} does not exist", record.source_path.display()));
        return false;
    }
    let result = record
        .output_path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|_| std::fs::copy(&record.source_path, &record.output_path));
    match result {
        Ok(bytes) => {
            info!(
                "Copied {} -> {} ({} bytes)",
                record.source_path.display(),
                record.output_path.display(),
                bytes
            );
            true
        }
        Err(e) => {
            context::warn(
                ctx,
                format!(
                    "failed to copy {} to {}: {}",
                    record.source_path.display(),
                    record.output_path.display(),
                    e
                ),
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CollectContext;
    use std::fs;

    fn registry(copy_to: &Path, mapper: Option<NameMapper>) -> Registry {
        Registry::new(
            OutputLayout {
                copy_to: copy_to.to_path_buf(),
                dest_dir: "./".into(),
            },
            mapper,
            CopyMode::Eager,
        )
    }

    #[test]
    fn test_register_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("pkg/build/Release/addon.node");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, b"first").unwrap();
        let out = tmp.path().join("dist/native");

        let ctx = CollectContext::new();
        let reg = registry(&out, None);
        let first = reg.register(&src, &ctx);
        assert_eq!(first.output_id, "./addon.node");
        assert_eq!(fs::read(out.join("addon.node")).unwrap(), b"first");

        // A second copy would pick up the changed bytes.
        fs::write(&src, b"second").unwrap();
        let second = reg.register(&src, &ctx);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fs::read(out.join("addon.node")).unwrap(), b"first");
        assert_eq!(reg.len(), 1);
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn test_basename_collisions_get_suffixes() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let ctx = CollectContext::new();
        let reg = registry(&out, None);

        let ids: Vec<_> = ["a/binding.node", "b/binding.node", "c/binding.node"]
            .iter()
            .map(|rel| reg.register(&tmp.path().join(rel), &ctx).output_id.clone())
            .collect();
        assert_eq!(ids, vec!["./binding.node", "./binding_1.node", "./binding_2.node"]);
        assert_eq!(
            reg.lookup("./binding_1.node").unwrap().output_path,
            out.join("binding_1.node")
        );
        // None of the sources exist.
        assert_eq!(ctx.warnings().len(), 3);
        assert!(ctx.warnings()[0].starts_with("[natpack] "));
        assert!(ctx.warnings()[0].ends_with("does not exist"));
    }

    #[test]
    fn test_mapper_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let explicit = tmp.path().join("elsewhere/x.node");
        let mapper = {
            let explicit = explicit.clone();
            NameMapper::new(move |path| match path.file_name().and_then(|n| n.to_str()) {
                Some("serial.node") => Mapping::Name("serialport.node".into()),
                Some("x.node") => Mapping::Explicit {
                    name: "../lib/x.node".into(),
                    copy_to: explicit.clone(),
                },
                Some("skip.node") => Mapping::Ignore,
                _ => Mapping::Default,
            })
        };
        let ctx = CollectContext::new();
        let reg = registry(&tmp.path().join("out"), Some(mapper));

        assert_eq!(reg.register(Path::new("/p/serial.node"), &ctx).output_id, "./serialport.node");
        let x = reg.register(Path::new("/p/x.node"), &ctx);
        assert_eq!(x.output_id, "../lib/x.node");
        assert_eq!(x.output_path, explicit);
        assert!(reg.register(Path::new("/p/skip.node"), &ctx).ignored);
        assert_eq!(reg.lookup("/p/x.node").unwrap().output_id, "../lib/x.node");
        // The ignored binary is not copied, so it does not warn.
        assert_eq!(ctx.warnings().len(), 2);
    }

    #[test]
    fn test_pattern_mapper() {
        let mut rename = std::collections::BTreeMap::new();
        rename.insert("**/serialport/**/bindings.node".to_string(), "serialport.node".to_string());
        let mapper = NameMapper::from_patterns(&rename, &["**/fsevents/**".to_string()]).unwrap();

        assert_eq!(
            mapper.map(Path::new("/p/node_modules/serialport/build/Release/bindings.node")),
            Mapping::Name("serialport.node".into())
        );
        assert_eq!(mapper.map(Path::new("/p/node_modules/fsevents/fsevents.node")), Mapping::Ignore);
        assert_eq!(mapper.map(Path::new("/p/other.node")), Mapping::Default);
    }

    #[test]
    fn test_rebase() {
        let layout = OutputLayout {
            copy_to: PathBuf::from("dist"),
            dest_dir: "..\\native".into(),
        };
        assert_eq!(layout.rebase("a.node"), "../native/a.node");
    }
}
