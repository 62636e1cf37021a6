// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `require('bindings')(<name>)`

use regex::Regex;
use std::ops::Range;
use std::path::PathBuf;
use tracing::debug;

use super::{
    IdiomKind, Recognizer, ResolveCx, STRING_LITERAL, ends_statement, exports_shim, require_synthetic,
    unquote,
};
use crate::context;
use crate::error::Result;
use crate::registry::BinaryRecord;

/// One `bindings` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingsCall {
    /// Binary name argument, if one was given
    pub name: Option<String>,
    /// The call is the whole right-hand side of `module.exports = ...`
    pub statement: bool,
}

/// Recognizes calls to the `bindings` helper
#[derive(Debug, Clone)]
pub struct BindingsRecognizer {
    pattern: Regex,
    option_key: Regex,
}

impl BindingsRecognizer {
    /// Compile the detectors
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(&format!(
            r#"(?P<stmt>\bmodule\.exports\s*=\s*)?(?P<call>\brequire\(\s*(?:'bindings'|"bindings")\s*\)\(\s*(?P<arg>{s}|\{{[^{{}}]*\}})?\s*\))(?P<semi>\s*;)?"#,
            s = STRING_LITERAL
        ))?;
        let option_key = Regex::new(&format!(
            r#"(?:\bbindings|'bindings'|"bindings")\s*:\s*(?P<name>{s})"#,
            s = STRING_LITERAL
        ))?;
        Ok(Self { pattern, option_key })
    }

    fn name_from_arg(&self, arg: &str) -> Option<String> {
        if arg.starts_with('{') {
            let caps = self.option_key.captures(arg)?;
            unquote(caps.name("name")?.as_str())
        } else {
            unquote(arg)
        }
    }
}

impl Recognizer for BindingsRecognizer {
    type Detection = BindingsCall;

    fn kind(&self) -> IdiomKind {
        IdiomKind::Bindings
    }

    fn detect(&self, source: &str) -> Vec<(Range<usize>, BindingsCall)> {
        self.pattern
            .captures_iter(source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let call = caps.name("call")?;
                let name = caps
                    .name("arg")
                    .and_then(|arg| self.name_from_arg(arg.as_str()));
                let statement = caps.name("stmt").is_some()
                    && ends_statement(source, call.end(), caps.name("semi"));
                let range = if statement { whole.range() } else { call.range() };
                Some((range, BindingsCall { name, statement }))
            })
            .collect()
    }

    fn resolve(&self, detection: &BindingsCall, cx: &ResolveCx<'_>) -> Option<PathBuf> {
        let Some(lookup) = cx.locator.bindings(detection.name.as_deref(), cx.module_dir) else {
            context::warn(
                cx.ctx,
                format!(
                    "no package root above {} to search for bindings",
                    cx.module_path.display()
                ),
            );
            return None;
        };
        if !lookup.exists {
            debug!(
                "No bindings candidate exists for {}, falling back to {}",
                cx.module_path.display(),
                lookup.path.display()
            );
        }
        Some(lookup.path)
    }

    fn render(&self, detection: &BindingsCall, record: &BinaryRecord) -> String {
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

    fn names(src: &str) -> Vec<Option<String>> {
        BindingsRecognizer::new()
            .unwrap()
            .detect(src)
            .into_iter()
            .map(|(_, call)| call.name)
            .collect()
    }

    #[test]
    fn test_argument_forms() {
        assert_eq!(
            names(
                "a = require('bindings')(); \
                 b = require(\"bindings\")('node_sqlite3.node'); \
                 c = require('bindings')({ bindings: 'serialport', module_root: x }); \
                 d = require('bindings')({ \"bindings\": \"x\" })"
            ),
            vec![None, Some("node_sqlite3.node".into()), Some("serialport".into()), Some("x".into())]
        );
    }

    #[test]
    fn test_statement_range() {
        let src = "'use strict';\nmodule.exports = require('bindings')('addon');\n";
        let found = BindingsRecognizer::new().unwrap().detect(src);
        assert_eq!(found.len(), 1);
        assert_eq!(&src[found[0].0.clone()], "module.exports = require('bindings')('addon');");
        assert!(found[0].1.statement);
    }

    #[test]
    fn test_trailing_member_access_stays_in_place() {
        let recognizer = BindingsRecognizer::new().unwrap();
        for src in [
            "module.exports = require('bindings')('addon').Foo;",
            "module.exports = require('bindings')('addon') || {};",
        ] {
            let found = recognizer.detect(src);
            assert_eq!(found.len(), 1);
            assert_eq!(&src[found[0].0.clone()], "require('bindings')('addon')");
            assert!(!found[0].1.statement);
        }

        let src = "module.exports = require('bindings')('addon')\nconst x = 1;";
        let found = recognizer.detect(src);
        assert!(found[0].1.statement);
        assert_eq!(&src[found[0].0.clone()], "module.exports = require('bindings')('addon')");
    }

    #[test]
    fn test_in_place_range() {
        let src = "const addon = require('bindings')('addon');";
        let found = BindingsRecognizer::new().unwrap().detect(src);
        assert_eq!(&src[found[0].0.clone()], "require('bindings')('addon')");
        assert!(!found[0].1.statement);
    }
}
