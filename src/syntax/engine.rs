//! Pattern engine
//!
//! The tokenizer never talks to a regex library directly. It asks a
//! [`PatternEngine`] to compile a list of patterns into a [`Scanner`] and
//! then asks the scanner for the leftmost match at or after a position.
//! [`RegexEngine`] is the default backend, built on the `regex` crate.

use std::fmt;

use regex::Regex;

use crate::error::PatternCompileError;

/// One match found by a scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanMatch {
    /// Index of the winning pattern in the compiled list
    pub index: usize,
    pub start: usize,
    pub end: usize,
    /// Byte ranges of each capture group, group 0 first
    pub captures: Vec<Option<(usize, usize)>>,
}

/// A compiled list of patterns
pub trait Scanner: Send + Sync + fmt::Debug {
    /// Find the leftmost match at or after `start`.
    ///
    /// Ties between patterns starting at the same byte go to the lowest
    /// index. `anchor` is the position where `\G` may match, if any.
    fn find_next_match(&self, line: &str, start: usize, anchor: Option<usize>) -> Option<ScanMatch>;
}

/// A regex backend able to build scanners
pub trait PatternEngine: Send + Sync + fmt::Debug {
    fn compile(&self, patterns: &[&str]) -> Result<Box<dyn Scanner>, PatternCompileError>;

    /// Name of a construct used by `pattern` that this engine cannot run
    fn unsupported_feature(&self, _pattern: &str) -> Option<&'static str> {
        None
    }
}

/// Engine built on the `regex` crate.
///
/// Look-around and back-references are not available. `\G` is emulated:
/// such a pattern only matches when the scan starts at the anchor and the
/// match begins right there.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexEngine;

impl PatternEngine for RegexEngine {
    fn compile(&self, patterns: &[&str]) -> Result<Box<dyn Scanner>, PatternCompileError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let (source, g_anchored) = strip_g_anchor(pattern);
            let regex = Regex::new(&source).map_err(|e| PatternCompileError {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            compiled.push(CompiledPattern { regex, g_anchored });
        }
        Ok(Box::new(RegexScanner { patterns: compiled }))
    }

    fn unsupported_feature(&self, pattern: &str) -> Option<&'static str> {
        let bytes = pattern.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => {
                    if matches!(bytes.get(i + 1), Some(b'1'..=b'9')) {
                        return Some("back-references");
                    }
                    i += 2;
                    continue;
                }
                b'(' => {
                    let rest = &bytes[i + 1..];
                    if rest.starts_with(b"?=")
                        || rest.starts_with(b"?!")
                        || rest.starts_with(b"?<=")
                        || rest.starts_with(b"?<!")
                    {
                        return Some("look-around");
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }
}

#[derive(Debug)]
struct CompiledPattern {
    regex: Regex,
    g_anchored: bool,
}

#[derive(Debug)]
struct RegexScanner {
    patterns: Vec<CompiledPattern>,
}

impl Scanner for RegexScanner {
    fn find_next_match(&self, line: &str, start: usize, anchor: Option<usize>) -> Option<ScanMatch> {
        if start > line.len() {
            return None;
        }

        let mut best: Option<ScanMatch> = None;
        for (index, pattern) in self.patterns.iter().enumerate() {
            if pattern.g_anchored && anchor != Some(start) {
                continue;
            }
            let Some(caps) = pattern.regex.captures_at(line, start) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if pattern.g_anchored && whole.start() != start {
                continue;
            }
            if best.as_ref().map_or(true, |b| whole.start() < b.start) {
                best = Some(ScanMatch {
                    index,
                    start: whole.start(),
                    end: whole.end(),
                    captures: caps.iter().map(|g| g.map(|m| (m.start(), m.end()))).collect(),
                });
                // Nothing can start earlier than the scan position
                if whole.start() == start {
                    break;
                }
            }
        }
        best
    }
}

/// Remove `\G` escapes, reporting whether any were present
fn strip_g_anchor(pattern: &str) -> (String, bool) {
    let mut out = String::with_capacity(pattern.len());
    let mut found = false;
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('G') => found = true,
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    (out, found)
}

/// Replace `\1`..`\9` in an end pattern with the escaped text of the
/// corresponding begin capture
pub(crate) fn resolve_backreferences(
    pattern: &str,
    line: &str,
    captures: &[Option<(usize, usize)>],
) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(d @ '1'..='9') => {
                let group = d as usize - '0' as usize;
                if let Some(Some((start, end))) = captures.get(group) {
                    out.push_str(&regex::escape(&line[*start..*end]));
                }
            }
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Whether an end pattern refers to begin captures
pub(crate) fn has_backreferences(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'\\' {
            if bytes[i + 1].is_ascii_digit() && bytes[i + 1] != b'0' {
                return true;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    false
}
