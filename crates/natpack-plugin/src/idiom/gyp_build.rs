// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `require('node-gyp-build')(<root>)`

use regex::Regex;
use std::ops::Range;
use std::path::PathBuf;

use super::{
    IdiomKind, Recognizer, ResolveCx, STRING_LITERAL, ends_statement, exports_shim, require_synthetic,
    unquote,
};
use crate::context;
use crate::error::Result;
use crate::locator::normalize_path;
use crate::registry::BinaryRecord;

/// Directory argument passed to the helper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRoot {
    /// `__dirname`
    Dirname,
    /// A path relative to the module's directory
    Relative(String),
}

/// One `node-gyp-build` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GypBuildCall {
    /// Where the helper is asked to look
    pub root: BuildRoot,
    /// The call is the whole right-hand side of `module.exports = ...`
    pub statement: bool,
}

/// Recognizes calls to `node-gyp-build`
#[derive(Debug, Clone)]
pub struct GypBuildRecognizer {
    pattern: Regex,
}

impl GypBuildRecognizer {
    /// Compile the detector
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(&format!(
            r#"(?P<stmt>\bmodule\.exports\s*=\s*)?(?P<call>\brequire\(\s*(?:'node-gyp-build'|"node-gyp-build")\s*\)\(\s*(?P<arg>__dirname|{s}|path\.join\(\s*__dirname\s*,\s*(?P<joined>{s})\s*\))\s*\))(?P<semi>\s*;)?"#,
            s = STRING_LITERAL
        ))?;
        Ok(Self { pattern })
    }
}

impl Recognizer for GypBuildRecognizer {
    type Detection = GypBuildCall;

    fn kind(&self) -> IdiomKind {
        IdiomKind::GypBuild
    }

    fn detect(&self, source: &str) -> Vec<(Range<usize>, GypBuildCall)> {
        self.pattern
            .captures_iter(source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let call = caps.name("call")?;
                let arg = caps.name("arg")?.as_str();
                let root = if arg == "__dirname" {
                    BuildRoot::Dirname
                } else {
                    let literal = caps.name("joined").map_or(arg, |m| m.as_str());
                    BuildRoot::Relative(unquote(literal)?)
                };
                let statement = caps.name("stmt").is_some()
                    && ends_statement(source, call.end(), caps.name("semi"));
                let range = if statement { whole.range() } else { call.range() };
                Some((range, GypBuildCall { root, statement }))
            })
            .collect()
    }

    fn resolve(&self, detection: &GypBuildCall, cx: &ResolveCx<'_>) -> Option<PathBuf> {
        let root = match &detection.root {
            BuildRoot::Dirname => cx.module_dir.to_path_buf(),
            BuildRoot::Relative(rel) => normalize_path(&cx.module_dir.join(rel)),
        };
        let found = cx.locator.gyp_build(cx.module_dir, &root);
        if found.is_none() {
            context::warn(
                cx.ctx,
                format!(
                    "node-gyp-build could not locate a binary under {} (required from {})",
                    root.display(),
                    cx.module_path.display()
                ),
            );
        }
        found
    }

    fn render(&self, detection: &GypBuildCall, record: &BinaryRecord) -> String {
        if detection.statement {
            exports_shim(record)
        } else {
            require_synthetic(record)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_shapes() {
        let recognizer = GypBuildRecognizer::new().unwrap();
        let src = "module.exports = require('node-gyp-build')(__dirname);\n\
                   const b = require(\"node-gyp-build\")(path.join(__dirname, '..'));\n\
                   const c = require('node-gyp-build')('./native')";
        let found = recognizer.detect(src);
        assert_eq!(found.len(), 3);

        let (range, call) = &found[0];
        assert_eq!(&src[range.clone()], "module.exports = require('node-gyp-build')(__dirname);");
        assert!(call.statement);
        assert_eq!(call.root, BuildRoot::Dirname);

        let (range, call) = &found[1];
        assert_eq!(
            &src[range.clone()],
            "require(\"node-gyp-build\")(path.join(__dirname, '..'))"
        );
        assert!(!call.statement);
        assert_eq!(call.root, BuildRoot::Relative("..".into()));

        assert_eq!(found[2].1.root, BuildRoot::Relative("./native".into()));
    }

    #[test]
    fn test_statement_requires_whole_right_hand_side() {
        let recognizer = GypBuildRecognizer::new().unwrap();
        let src = "module.exports = require('node-gyp-build')(__dirname).Binding;";
        let found = recognizer.detect(src);
        assert_eq!(found.len(), 1);
        assert!(!found[0].1.statement);
        assert_eq!(&src[found[0].0.clone()], "require('node-gyp-build')(__dirname)");

        let src = "module.exports = require('node-gyp-build')(__dirname)";
        assert!(recognizer.detect(src)[0].1.statement);
    }

    #[test]
    fn test_dynamic_root_not_detected() {
        let recognizer = GypBuildRecognizer::new().unwrap();
        assert!(recognizer.detect("require('node-gyp-build')(dir)").is_empty());
    }
}
