//! Built-in grammars and themes
//!
//! The SNBT grammar and its default dark theme ship inside the crate so
//! a provider works without any files on disk.

pub mod snbt;

use super::language::LanguageDefinition;

/// Get all built-in language definitions
pub fn all_languages() -> Vec<LanguageDefinition> {
    vec![snbt::snbt_language()]
}

/// Find a built-in language by file name
pub fn detect_language(filename: &str) -> Option<LanguageDefinition> {
    all_languages().into_iter().find(|lang| lang.matches_file(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("level.snbt").map(|l| l.id), Some("snbt".to_string()));
        assert_eq!(detect_language("LEVEL.SNBT").map(|l| l.id), Some("snbt".to_string()));
        assert!(detect_language("main.rs").is_none());
        assert!(detect_language("no_extension").is_none());
    }
}
