// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `node-pre-gyp` lookups
//!
//! Matches the pair of declarations packages such as `sqlite3` use:
//!
//! ```js
//! var binding_path = binary.find(path.resolve(path.join(__dirname, './package.json')));
//! var binding = require(binding_path);
//! ```
//!
//! where `binary` is the variable bound to `require('@mapbox/node-pre-gyp')`
//! (or the older `node-pre-gyp`). Both declarations are rewritten; the first
//! keeps the output id so code reading the path still works.

use regex::Regex;
use std::ops::Range;
use std::path::PathBuf;

use super::{IdiomKind, Recognizer, ResolveCx, STRING_LITERAL, unquote};
use crate::context;
use crate::error::Result;
use crate::loader::{json_string, synthetic_id};
use crate::locator::normalize_path;
use crate::registry::BinaryRecord;

/// Name assumed for the library binding when no import is found
const DEFAULT_BINDING: &str = "binary";

/// A `require('node-pre-gyp')` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreGypImport {
    /// Range of the whole declaration, including a trailing `;`
    pub range: Range<usize>,
    /// Variable the library is bound to
    pub binding: String,
    /// Package name that was required
    pub library: String,
}

/// One `find` / `require` declaration pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreGypFind {
    /// Keyword of the path declaration
    pub path_decl: String,
    /// Variable holding the binary path
    pub path_var: String,
    /// `package.json` location relative to the module
    pub package_json: String,
    /// Keyword of the module declaration
    pub module_decl: String,
    /// Variable holding the loaded binary
    pub module_var: String,
    /// Library name the module imported, if any
    pub library: Option<String>,
}

/// Recognizes `node-pre-gyp` lookups
#[derive(Debug, Clone)]
pub struct PreGypRecognizer {
    import: Regex,
}

impl PreGypRecognizer {
    /// Compile the import detector
    pub fn new() -> Result<Self> {
        let import = Regex::new(
            r#"\b(?P<decl>var|let|const)\s+(?P<var>[A-Za-z0-9_$]+)\s*=\s*require\(\s*(?:'(?P<single>@mapbox/node-pre-gyp|node-pre-gyp)'|"(?P<double>@mapbox/node-pre-gyp|node-pre-gyp)")\s*\);?"#,
        )?;
        Ok(Self { import })
    }

    /// The first declaration importing the library, if any.
    pub fn import(&self, source: &str) -> Option<PreGypImport> {
        let caps = self.import.captures(source)?;
        let library = caps.name("single").or_else(|| caps.name("double"))?;
        Some(PreGypImport {
            range: caps.get(0)?.range(),
            binding: caps.name("var")?.as_str().to_string(),
            library: library.as_str().to_string(),
        })
    }

    fn find_pattern(binding: &str) -> Option<Regex> {
        Regex::new(&format!(
            r#"\b(?P<d1>var|let|const)\s+(?P<v1>[A-Za-z0-9_$]+)\s*=\s*{lib}\.find\(\s*path\.resolve\(\s*path\.join\(\s*__dirname\s*,\s*(?P<lit>{s})\s*\)\s*\)\s*\);?\s*(?P<d2>var|let|const)\s+(?P<v2>[A-Za-z0-9_$]+)\s*=\s*require\(\s*(?P<arg>[A-Za-z0-9_$]+)\s*\)"#,
            lib = regex::escape(binding),
            s = STRING_LITERAL
        ))
        .ok()
    }
}

impl Recognizer for PreGypRecognizer {
    type Detection = PreGypFind;

    fn kind(&self) -> IdiomKind {
        IdiomKind::PreGyp
    }

    fn detect(&self, source: &str) -> Vec<(Range<usize>, PreGypFind)> {
        if !source.contains("node-pre-gyp") && !source.contains(DEFAULT_BINDING) {
            return Vec::new();
        }
        let import = self.import(source);
        let binding = import.as_ref().map_or(DEFAULT_BINDING, |i| i.binding.as_str());
        let Some(pattern) = Self::find_pattern(binding) else {
            return Vec::new();
        };

        pattern
            .captures_iter(source)
            .filter_map(|caps| {
                let path_var = caps.name("v1")?.as_str();
                // `require(x)` must load the path just computed.
                if caps.name("arg")?.as_str() != path_var {
                    return None;
                }
                Some((
                    caps.get(0)?.range(),
                    PreGypFind {
                        path_decl: caps.name("d1")?.as_str().to_string(),
                        path_var: path_var.to_string(),
                        package_json: unquote(caps.name("lit")?.as_str())?,
                        module_decl: caps.name("d2")?.as_str().to_string(),
                        module_var: caps.name("v2")?.as_str().to_string(),
                        library: import.as_ref().map(|i| i.library.clone()),
                    },
                ))
            })
            .collect()
    }

    fn resolve(&self, detection: &PreGypFind, cx: &ResolveCx<'_>) -> Option<PathBuf> {
        let package_json = normalize_path(&cx.module_dir.join(&detection.package_json));
        let found = cx
            .locator
            .pre_gyp(cx.module_dir, &package_json, detection.library.as_deref());
        if found.is_none() {
            context::warn(
                cx.ctx,
                format!(
                    "node-pre-gyp could not locate the binary described by {} (required from {})",
                    package_json.display(),
                    cx.module_path.display()
                ),
            );
        }
        found
    }

    fn render(&self, detection: &PreGypFind, record: &BinaryRecord) -> String {
        format!(
            "{} {}={};{} {}=require({})",
            detection.path_decl,
            detection.path_var,
            json_string(&record.output_id.replace('\\', "/")),
            detection.module_decl,
            detection.module_var,
            json_string(&synthetic_id(&record.output_id)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQLITE3: &str = "var binary = require('@mapbox/node-pre-gyp');\n\
        var path = require('path');\n\
        var binding_path = binary.find(path.resolve(path.join(__dirname, './package.json')));\n\
        var binding = require(binding_path);\n\
        module.exports = exports = binding;\n";

    #[test]
    fn test_import() {
        let import = PreGypRecognizer::new().unwrap().import(SQLITE3).unwrap();
        assert_eq!(&SQLITE3[import.range], "var binary = require('@mapbox/node-pre-gyp');");
        assert_eq!(import.binding, "binary");
        assert_eq!(import.library, "@mapbox/node-pre-gyp");
    }

    #[test]
    fn test_detect_pair() {
        let found = PreGypRecognizer::new().unwrap().detect(SQLITE3);
        assert_eq!(found.len(), 1);
        let (range, find) = &found[0];
        assert!(SQLITE3[range.clone()].starts_with("var binding_path = binary.find("));
        assert!(SQLITE3[range.clone()].ends_with("var binding = require(binding_path)"));
        assert_eq!(find.package_json, "./package.json");
        assert_eq!(find.library.as_deref(), Some("@mapbox/node-pre-gyp"));
    }

    #[test]
    fn test_custom_binding_and_mismatched_require() {
        let recognizer = PreGypRecognizer::new().unwrap();
        let custom = "const pregyp = require(\"node-pre-gyp\");\n\
            const p = pregyp.find(path.resolve(path.join(__dirname, '../package.json')));\n\
            const m = require(p);";
        let found = recognizer.detect(custom);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1.package_json, "../package.json");
        assert_eq!(found[0].1.library.as_deref(), Some("node-pre-gyp"));

        let mismatched = "var p = binary.find(path.resolve(path.join(__dirname, 'package.json')));\n\
            var m = require(other);";
        assert!(recognizer.detect(mismatched).is_empty());
    }

    #[test]
    fn test_render() {
        let recognizer = PreGypRecognizer::new().unwrap();
        let (_, find) = recognizer.detect(SQLITE3).remove(0);
        let record = BinaryRecord {
            source_path: PathBuf::from("/p/lib/binding/napi-v6-linux-glibc-x64/node_sqlite3.node"),
            output_id: "./node_sqlite3.node".into(),
            output_path: PathBuf::from("/out/node_sqlite3.node"),
            ignored: false,
        };
        assert_eq!(
            recognizer.render(&find, &record),
            "var binding_path=\"./node_sqlite3.node\";var binding=require(\"\\u0000natpack:./node_sqlite3.node\")"
        );
    }
}
