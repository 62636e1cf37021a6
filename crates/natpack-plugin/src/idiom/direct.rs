// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! `require('<path>')` naming a binary

use regex::Regex;
use std::ops::Range;
use std::path::PathBuf;

use super::{IdiomKind, Recognizer, ResolveCx, STRING_LITERAL, require_synthetic, unquote};
use crate::context;
use crate::error::Result;
use crate::locator::has_binary_extension;
use crate::registry::BinaryRecord;

/// Recognizes plain requires of binaries
#[derive(Debug, Clone)]
pub struct DirectRecognizer {
    pattern: Regex,
}

impl DirectRecognizer {
    /// Compile the detector
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(&format!(r#"\brequire\(\s*(?P<lit>{})\s*\)"#, STRING_LITERAL))?;
        Ok(Self { pattern })
    }
}

impl Recognizer for DirectRecognizer {
    /// The required specifier
    type Detection = String;

    fn kind(&self) -> IdiomKind {
        IdiomKind::Direct
    }

    fn detect(&self, source: &str) -> Vec<(Range<usize>, String)> {
        self.pattern
            .captures_iter(source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let hint = unquote(caps.name("lit")?.as_str())?;
                (!hint.is_empty()).then(|| (whole.range(), hint))
            })
            .collect()
    }

    fn resolve(&self, hint: &String, cx: &ResolveCx<'_>) -> Option<PathBuf> {
        let found = cx.locator.resolve_existing(hint, cx.module_dir);
        if found.is_none() && has_binary_extension(hint) {
            context::warn(
                cx.ctx,
                format!(
                    "{} required from {} does not exist",
                    hint,
                    cx.module_path.display()
                ),
            );
        }
        found
    }

    fn render(&self, _hint: &String, record: &BinaryRecord) -> String {
        require_synthetic(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_literals_only() {
        let src = "require('./a.node'); require(\"../b\"); require(name); require('')";
        let hints: Vec<_> = DirectRecognizer::new()
            .unwrap()
            .detect(src)
            .into_iter()
            .map(|(range, hint)| (src[range].to_string(), hint))
            .collect();
        assert_eq!(
            hints,
            vec![
                ("require('./a.node')".to_string(), "./a.node".to_string()),
                ("require(\"../b\")".to_string(), "../b".to_string()),
            ]
        );
    }
}
