//! Terminal rendering of tokenized lines
//!
//! Paints a line from its encoded tokens with RGB foregrounds and font
//! attributes, truncated to a display width.

use std::io::{self, Write};

use crossterm::queue;
use crossterm::style::{Attribute, Color, Print, SetAttribute, SetForegroundColor};

use crate::syntax::{ColorMap, FontStyle, Rgb, TokenMetadata};

/// Write `line` styled by `encoded` (`[start, metadata]` pairs).
///
/// Returns the number of display columns written.
pub fn paint_line<W: Write>(
    out: &mut W,
    line: &str,
    encoded: &[u32],
    color_map: &ColorMap,
    max_cols: usize,
) -> io::Result<usize> {
    let mut cols = 0;

    if encoded.len() < 2 {
        let text = truncate_to_width(line, max_cols);
        cols += display_width(&text);
        queue!(out, Print(text))?;
        return Ok(cols);
    }

    for (i, pair) in encoded.chunks_exact(2).enumerate() {
        if cols >= max_cols {
            break;
        }
        let start = pair[0] as usize;
        let end = encoded
            .get((i + 1) * 2)
            .map_or(line.len(), |next| *next as usize);
        let text = safe_slice(line, start, end);
        if text.is_empty() {
            continue;
        }

        let metadata = TokenMetadata(pair[1]);
        let text = truncate_to_width(text, max_cols - cols);
        apply_metadata(out, metadata, color_map)?;
        queue!(out, Print(&text), SetAttribute(Attribute::Reset))?;
        cols += display_width(&text);
    }

    Ok(cols)
}

fn apply_metadata<W: Write>(out: &mut W, metadata: TokenMetadata, color_map: &ColorMap) -> io::Result<()> {
    if let Some(Rgb { r, g, b }) = color_map.get(metadata.foreground()) {
        queue!(out, SetForegroundColor(Color::Rgb { r, g, b }))?;
    }
    let font = metadata.font_style();
    if font.contains(FontStyle::ITALIC) {
        queue!(out, SetAttribute(Attribute::Italic))?;
    }
    if font.contains(FontStyle::BOLD) {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if font.contains(FontStyle::UNDERLINE) {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    if font.contains(FontStyle::STRIKETHROUGH) {
        queue!(out, SetAttribute(Attribute::CrossedOut))?;
    }
    Ok(())
}

/// Truncate a string to fit within a display width
fn truncate_to_width(s: &str, max_width: usize) -> String {
    let mut result = String::new();
    let mut width = 0;

    for ch in s.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(1);
        if width + ch_width > max_width {
            break;
        }
        result.push(ch);
        width += ch_width;
    }

    result
}

fn display_width(s: &str) -> usize {
    s.chars()
        .map(|ch| unicode_width::UnicodeWidthChar::width(ch).unwrap_or(1))
        .sum()
}

/// UTF-8 safe slice from start to end byte offset
fn safe_slice(s: &str, start: usize, end: usize) -> &str {
    let start = find_safe_boundary(s, start, true);
    let end = find_safe_boundary(s, end, false).max(start);
    &s[start..end]
}

/// Find a safe UTF-8 boundary near the given byte offset
/// If forward is true, search forward; otherwise search backward
fn find_safe_boundary(s: &str, offset: usize, forward: bool) -> usize {
    if offset >= s.len() {
        return s.len();
    }
    if s.is_char_boundary(offset) {
        return offset;
    }

    if forward {
        (offset..=s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(s.len())
    } else {
        (0..offset).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
    }
}
