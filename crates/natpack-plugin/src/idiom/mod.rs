// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Idiom Recognizers
//!
//! One recognizer per native-loading convention. Each pairs a text detector
//! with a resolution routine that asks the [`Locator`](crate::locator::Locator)
//! for the binary, and a renderer that produces the replacement source once
//! the binary is registered.
//!
//! Recognizers run in a fixed priority order (pre-gyp, gyp-build, bindings,
//! direct) and each rewrites at most its first resolvable occurrence per module.

mod bindings;
mod direct;
mod gyp_build;
mod pregyp;

pub use bindings::BindingsRecognizer;
pub use direct::DirectRecognizer;
pub use gyp_build::GypBuildRecognizer;
pub use pregyp::PreGypRecognizer;

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::context::HostContext;
use crate::loader;
use crate::locator::Locator;
use crate::registry::{BinaryRecord, Registry};
use crate::rewrite::{EditBuffer, InertRanges, replace_first};

/// Supported loading conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdiomKind {
    /// `binary.find(...)` from `node-pre-gyp`
    PreGyp,
    /// `require('node-gyp-build')(...)`
    GypBuild,
    /// `require('bindings')(...)`
    Bindings,
    /// `require('./addon.node')`
    Direct,
}

impl IdiomKind {
    /// Stable lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreGyp => "pre-gyp",
            Self::GypBuild => "gyp-build",
            Self::Bindings => "bindings",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for IdiomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rewritten occurrence of an idiom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdiomMatch {
    /// Which convention matched
    pub kind: IdiomKind,
    /// Byte range of the replaced text in the original source
    pub range: Range<usize>,
    /// The binary the occurrence resolved to
    pub resolved: Option<PathBuf>,
}

/// What a recognizer may consult while resolving
pub struct ResolveCx<'a> {
    /// Absolute path of the module being transformed
    pub module_path: &'a Path,
    /// Its directory
    pub module_dir: &'a Path,
    /// Binary locator for this build
    pub locator: &'a Locator,
    /// Diagnostic channel
    pub ctx: &'a dyn HostContext,
}

/// Detects, resolves and renders one loading convention.
pub trait Recognizer {
    /// What the detector captured about one occurrence
    type Detection;

    /// The convention this recognizer handles
    fn kind(&self) -> IdiomKind;

    /// All syntactic occurrences in `source`, left to right, with the byte
    /// range each one would replace.
    fn detect(&self, source: &str) -> Vec<(Range<usize>, Self::Detection)>;

    /// The binary an occurrence would load, or `None` to leave it alone.
    fn resolve(&self, detection: &Self::Detection, cx: &ResolveCx<'_>) -> Option<PathBuf>;

    /// Replacement text once the binary is registered as `record`.
    fn render(&self, detection: &Self::Detection, record: &BinaryRecord) -> String;
}

/// Rewrite the first occurrence of `recognizer`'s idiom that resolves to a
/// binary the registry does not ignore.
pub fn rewrite_first<R: Recognizer>(
    recognizer: &R,
    buf: &mut EditBuffer<'_>,
    inert: Option<&InertRanges>,
    cx: &ResolveCx<'_>,
    registry: &Registry,
) -> Option<IdiomMatch> {
    let detections = recognizer.detect(buf.original());
    let mut resolved = None;
    let range = replace_first(buf, detections, inert, |detection| {
        let path = recognizer.resolve(detection, cx)?;
        let record = registry.register(&path, cx.ctx);
        if record.ignored {
            tracing::debug!("{} left in place, binary is ignored", path.display());
            return None;
        }
        resolved = Some(path);
        Some(recognizer.render(detection, &record))
    })?;
    Some(IdiomMatch {
        kind: recognizer.kind(),
        range,
        resolved,
    })
}

/// `require("<synthetic id>")` for a record.
pub fn require_synthetic(record: &BinaryRecord) -> String {
    format!("require({})", loader::json_string(&loader::synthetic_id(&record.output_id)))
}

/// The canonical statement that replaces a whole `module.exports = ...;`.
pub fn exports_shim(record: &BinaryRecord) -> String {
    format!(
        "const binding = {};\nmodule.exports = exports = binding;",
        require_synthetic(record)
    )
}

/// Whether a `module.exports = <call>` match covers the whole statement:
/// the call must be followed by `;`, a line break or the end of input.
pub(crate) fn ends_statement(source: &str, call_end: usize, semi: Option<regex::Match<'_>>) -> bool {
    if semi.is_some() {
        return true;
    }
    let rest = source[call_end..].trim_start_matches([' ', '\t']);
    rest.is_empty() || rest.starts_with(['\n', '\r'])
}

/// Contents of a single- or double-quoted JavaScript string literal.
///
/// Only the escapes that can appear in a module path are decoded.
pub fn unquote(literal: &str) -> Option<String> {
    let quote = literal.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = literal.strip_prefix(quote)?.strip_suffix(quote)?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            other => out.push(other),
        }
    }
    Some(out)
}

/// A quoted string literal, either quote style, no newlines
pub(crate) const STRING_LITERAL: &str = r#"(?:'[^'\n]*'|"[^"\n]*")"#;
