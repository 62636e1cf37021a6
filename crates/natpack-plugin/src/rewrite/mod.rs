// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Source splicing
//!
//! Edits are recorded against the original text and applied when the buffer
//! is rendered, so every byte of the output can be traced back to the input.

mod scanner;

pub use scanner::InertRanges;

use std::fmt;
use std::ops::Range;

/// A contiguous piece of the output and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte range in the generated text
    pub generated: Range<usize>,
    /// Byte range in the original text
    pub original: Range<usize>,
    /// Whether the piece was written by an edit rather than copied
    pub edited: bool,
}

#[derive(Debug, Clone)]
struct Edit {
    range: Range<usize>,
    text: String,
}

/// Pending edits over one module's source
#[derive(Debug, Clone)]
pub struct EditBuffer<'a> {
    original: &'a str,
    edits: Vec<Edit>,
}

impl<'a> EditBuffer<'a> {
    /// Start editing `original`
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            edits: Vec::new(),
        }
    }

    /// The unedited source
    pub fn original(&self) -> &'a str {
        self.original
    }

    /// Replace `range` of the original text with `text`.
    ///
    /// Returns `false` and leaves the buffer untouched when the range is empty,
    /// out of bounds, not on character boundaries, or overlaps an earlier edit.
    pub fn overwrite(&mut self, range: Range<usize>, text: impl Into<String>) -> bool {
        if range.start >= range.end
            || range.end > self.original.len()
            || !self.original.is_char_boundary(range.start)
            || !self.original.is_char_boundary(range.end)
        {
            return false;
        }
        let at = self.edits.partition_point(|edit| edit.range.start < range.start);
        let clashes_before = at > 0 && self.edits[at - 1].range.end > range.start;
        let clashes_after = at < self.edits.len() && self.edits[at].range.start < range.end;
        if clashes_before || clashes_after {
            return false;
        }
        self.edits.insert(
            at,
            Edit {
                range,
                text: text.into(),
            },
        );
        true
    }

    /// Delete `range` of the original text.
    pub fn remove(&mut self, range: Range<usize>) -> bool {
        self.overwrite(range, String::new())
    }

    /// Whether any edit has been made
    pub fn has_changed(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Output pieces in order, with their origin.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(self.edits.len() * 2 + 1);
        let mut original_pos = 0;
        let mut generated_pos = 0;
        let mut push = |original: Range<usize>, len: usize, edited: bool| {
            if original.is_empty() && len == 0 {
                return;
            }
            segments.push(Segment {
                generated: generated_pos..generated_pos + len,
                original,
                edited,
            });
            generated_pos += len;
        };
        for edit in &self.edits {
            push(original_pos..edit.range.start, edit.range.start - original_pos, false);
            push(edit.range.clone(), edit.text.len(), true);
            original_pos = edit.range.end;
        }
        push(original_pos..self.original.len(), self.original.len() - original_pos, false);
        segments
    }

    /// Map an offset in the generated text back to the original text.
    ///
    /// Offsets in copied text map exactly; offsets inside an edit map to the
    /// start of the range the edit replaced.
    pub fn original_offset(&self, generated: usize) -> Option<usize> {
        self.segments()
            .into_iter()
            .find(|segment| segment.generated.contains(&generated))
            .map(|segment| {
                if segment.edited {
                    segment.original.start
                } else {
                    segment.original.start + (generated - segment.generated.start)
                }
            })
    }
}

impl fmt::Display for EditBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pos = 0;
        for edit in &self.edits {
            f.write_str(&self.original[pos..edit.range.start])?;
            f.write_str(&edit.text)?;
            pos = edit.range.end;
        }
        f.write_str(&self.original[pos..])
    }
}

/// Apply the first successful replacement among `candidates`.
///
/// Candidates are visited left to right. Those starting inside `inert` text
/// are skipped, as are those for which `replace` returns `None` or whose
/// range clashes with an earlier edit. Returns the range that was rewritten.
pub fn replace_first<T>(
    buf: &mut EditBuffer<'_>,
    candidates: impl IntoIterator<Item = (Range<usize>, T)>,
    inert: Option<&InertRanges>,
    mut replace: impl FnMut(&T) -> Option<String>,
) -> Option<Range<usize>> {
    for (range, candidate) in candidates {
        if inert.is_some_and(|inert| inert.contains(range.start)) {
            continue;
        }
        let Some(replacement) = replace(&candidate) else {
            continue;
        };
        if buf.overwrite(range.clone(), replacement) {
            return Some(range);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_and_render() {
        let src = "const a = require('x'); const b = require('y');";
        let mut buf = EditBuffer::new(src);
        assert!(buf.overwrite(10..22, "X"));
        assert!(buf.overwrite(34..46, "Y"));
        assert_eq!(buf.to_string(), "const a = X; const b = Y;");
    }

    #[test]
    fn test_overlapping_edits_rejected() {
        let mut buf = EditBuffer::new("abcdefgh");
        assert!(buf.overwrite(2..5, "X"));
        assert!(!buf.overwrite(4..6, "Y"));
        assert!(!buf.overwrite(0..3, "Y"));
        assert!(!buf.overwrite(3..3, "Y"));
        assert!(buf.remove(5..6));
        assert_eq!(buf.to_string(), "abXgh");
    }

    #[test]
    fn test_original_offset() {
        let src = "aaa require('x') bbb";
        let mut buf = EditBuffer::new(src);
        buf.overwrite(4..16, "R");
        let out = buf.to_string();
        assert_eq!(out, "aaa R bbb");
        // 'b' after the edit
        assert_eq!(buf.original_offset(6), Some(17));
        // inside the replacement
        assert_eq!(buf.original_offset(4), Some(4));
        assert_eq!(buf.original_offset(1), Some(1));
        assert_eq!(buf.original_offset(out.len()), None);
    }

    #[test]
    fn test_replace_first_skips_misses_and_inert() {
        let src = "// require('a')\nrequire('b'); require('c');";
        let inert = InertRanges::scan(src);
        let candidates = vec![(3..15, "a"), (16..28, "b"), (30..42, "c")];
        let mut buf = EditBuffer::new(src);
        let hit = replace_first(&mut buf, candidates, Some(&inert), |name| {
            (*name != "b").then(|| format!("R({})", name))
        });
        assert_eq!(hit, Some(30..42));
        assert_eq!(buf.to_string(), "// require('a')\nrequire('b'); R(c);");
    }
}
