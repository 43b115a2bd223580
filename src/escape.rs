//! Backslash escaping for quoted SNBT values

/// Escape backslashes, double quotes and newlines
pub fn slash_escape(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    for ch in contents.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            _ => out.push(ch),
        }
    }
    out
}

/// Undo [`slash_escape`]. Other backslash sequences are kept as written.
pub fn slash_unescape(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut chars = contents.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('"') => out.push('"'),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}
