// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Comment and string detection
//!
//! The recognizers match text, not syntax. This pass marks the byte ranges
//! that can never hold a live call (comments, string and template text,
//! regular expression literals) so matches starting there can be dropped.

use std::ops::Range;

/// Sorted, non-overlapping ranges of inert text
#[derive(Debug, Clone, Default)]
pub struct InertRanges {
    ranges: Vec<Range<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// Code nested inside `${ ... }` of a template, with its brace depth
    Substitution(usize),
}

impl InertRanges {
    /// Scan JavaScript source.
    pub fn scan(src: &str) -> Self {
        let bytes = src.as_bytes();
        let mut ranges = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut prev_significant: Option<u8> = None;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            match b {
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    let end = memchr(bytes, i, b'\n').unwrap_or(bytes.len());
                    ranges.push(i..end);
                    i = end;
                    continue;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let end = src[i + 2..].find("*/").map_or(bytes.len(), |p| i + 2 + p + 2);
                    ranges.push(i..end);
                    i = end;
                    continue;
                }
                b'/' if regex_allowed(prev_significant, preceding_word(bytes, i)) => {
                    let end = skip_regex(bytes, i);
                    ranges.push(i..end);
                    prev_significant = Some(b'/');
                    i = end;
                    continue;
                }
                b'\'' | b'"' => {
                    let end = skip_string(bytes, i, b);
                    ranges.push(i..end);
                    prev_significant = Some(b);
                    i = end;
                    continue;
                }
                b'`' => {
                    let (end, opens_substitution) = skip_template(bytes, i + 1);
                    ranges.push(i..end);
                    i = end;
                    if opens_substitution {
                        stack.push(Frame::Substitution(0));
                        prev_significant = Some(b'{');
                    } else {
                        prev_significant = Some(b'`');
                    }
                    continue;
                }
                b'{' => {
                    if let Some(Frame::Substitution(depth)) = stack.last_mut() {
                        *depth += 1;
                    }
                }
                b'}' => match stack.last_mut() {
                    Some(Frame::Substitution(0)) => {
                        stack.pop();
                        let (end, opens_substitution) = skip_template(bytes, i + 1);
                        ranges.push(i..end);
                        i = end;
                        if opens_substitution {
                            stack.push(Frame::Substitution(0));
                            prev_significant = Some(b'{');
                        } else {
                            prev_significant = Some(b'`');
                        }
                        continue;
                    }
                    Some(Frame::Substitution(depth)) => *depth -= 1,
                    None => {}
                },
                _ => {}
            }
            if !b.is_ascii_whitespace() {
                prev_significant = Some(b);
            }
            i += 1;
        }

        Self { ranges }
    }

    /// Whether `pos` lies inside inert text.
    pub fn contains(&self, pos: usize) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= pos);
        self.ranges.get(idx).is_some_and(|r| r.start <= pos)
    }

    /// The inert ranges, in order
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }
}

fn memchr(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|p| from + p)
}

/// Keywords after which an expression, not an operator, follows
const EXPRESSION_KEYWORDS: &[&str] = &[
    "await", "case", "delete", "do", "else", "in", "instanceof", "new", "of", "return", "throw",
    "typeof", "void", "yield",
];

/// A `/` starts a regular expression unless it follows something that ends
/// an operand. An identifier ends one unless it is a keyword like `return`.
fn regex_allowed(prev: Option<u8>, word: &[u8]) -> bool {
    match prev {
        None => true,
        Some(b) if is_ident(b) => EXPRESSION_KEYWORDS.iter().any(|k| k.as_bytes() == word),
        Some(b) => !matches!(b, b')' | b']' | b'}' | b'\'' | b'"' | b'`'),
    }
}

/// The identifier ending just before `pos`, skipping whitespace.
fn preceding_word(bytes: &[u8], pos: usize) -> &[u8] {
    let mut end = pos;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && is_ident(bytes[start - 1]) {
        start -= 1;
    }
    // `x.return / 2` is a property, not the keyword
    if start > 0 && bytes[start - 1] == b'.' {
        return &[];
    }
    &bytes[start..end]
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$')
}

fn skip_string(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skip template text starting after a backtick or a closing `}`.
/// Returns the end offset and whether the text stopped at `${`.
fn skip_template(bytes: &[u8], mut i: usize) -> (usize, bool) {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return (i + 1, false),
            b'$' if bytes.get(i + 1) == Some(&b'{') => return (i + 2, true),
            _ => i += 1,
        }
    }
    (bytes.len(), false)
}

fn skip_regex(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return i,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                    i += 1;
                }
                return i;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inert_text(src: &str) -> Vec<&str> {
        InertRanges::scan(src)
            .ranges()
            .iter()
            .map(|r| &src[r.clone()])
            .collect()
    }

    #[test]
    fn test_comments_and_strings() {
        let src = "a('x'); // require('y')\n/* require(\"z\") */ b(\"w\\\"\")";
        assert_eq!(
            inert_text(src),
            vec!["'x'", "// require('y')", "/* require(\"z\") */", "\"w\\\"\""]
        );
    }

    #[test]
    fn test_template_substitution_is_live() {
        let src = "const s = `a ${require('./x.node')} b`;";
        let inert = InertRanges::scan(src);
        let call = src.find("require").unwrap();
        assert!(!inert.contains(call));
        assert!(inert.contains(src.find(" b").unwrap()));
        assert!(inert.contains(src.find("./x.node").unwrap()));
    }

    #[test]
    fn test_regex_versus_division() {
        let src = "const r = /'/g; const q = a / b; require('c')";
        let inert = InertRanges::scan(src);
        assert!(inert.contains(src.find("/'/").unwrap()));
        assert!(!inert.contains(src.find("a / b").unwrap() + 2));
        assert!(!inert.contains(src.find("require").unwrap()));
    }

    #[test]
    fn test_regex_after_keyword() {
        let src = "function f(s) { return /'/.test(s) && require('./a.node'); }";
        let inert = InertRanges::scan(src);
        assert!(inert.contains(src.find("/'/").unwrap() + 1));
        assert!(!inert.contains(src.find("require").unwrap()));

        let src = "if (typeof /\"/ === 'object') require('./b.node')";
        assert!(!InertRanges::scan(src).contains(src.find("require").unwrap()));
    }

    #[test]
    fn test_identifier_division() {
        let src = "const half = min / 2, q = o.return / 2; require('./c.node')";
        let inert = InertRanges::scan(src);
        assert!(inert.ranges().iter().all(|r| src[r.clone()].starts_with('\'')));
        assert!(!inert.contains(src.find("require").unwrap()));
    }

    #[test]
    fn test_string_containing_call() {
        let src = "log(\"require('./a.node')\"); require('./b.node');";
        let inert = InertRanges::scan(src);
        assert!(inert.contains(src.find("require('./a").unwrap()));
        assert!(!inert.contains(src.rfind("require").unwrap()));
    }
}
