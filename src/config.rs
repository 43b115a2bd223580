//! Configuration file support
//!
//! Loads settings from ~/.snbt-highlight.toml (or %USERPROFILE%\.snbt-highlight.toml on Windows)
//!
//! Example:
//! ```text
//! # snbt-highlight configuration
//! language-id = "snbt"
//! max-line-length = 20000
//! strict-references = true
//! balanced-bracket-selectors = ["*"]
//! theme-path = "/home/me/themes/light.json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Highlighter settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HighlighterConfig {
    /// Language id registered with the editor surface
    pub language_id: String,
    /// Lines longer than this (in bytes) are not scanned
    pub max_line_length: usize,
    /// Whether a dangling include fails grammar loading
    pub strict_references: bool,
    /// Scope prefixes whose tokens take part in bracket matching
    pub balanced_bracket_selectors: Vec<String>,
    /// Grammar file to use instead of the built-in one
    pub grammar_path: Option<PathBuf>,
    /// Theme file to use instead of the built-in one
    pub theme_path: Option<PathBuf>,
}

impl Default for HighlighterConfig {
    fn default() -> Self {
        Self {
            language_id: "snbt".to_string(),
            max_line_length: 20_000,
            strict_references: true,
            balanced_bracket_selectors: vec!["*".to_string()],
            grammar_path: None,
            theme_path: None,
        }
    }
}

impl HighlighterConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            std::env::var("USERPROFILE")
                .ok()
                .map(|home| PathBuf::from(home).join(".snbt-highlight.toml"))
        }

        #[cfg(not(windows))]
        {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".snbt-highlight.toml"))
        }
    }

    /// Load configuration from the user's config file, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("ignoring {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents)?;
        config.max_line_length = config.max_line_length.max(1);
        Ok(config)
    }

    /// Whether tokens with these scopes get the balanced-bracket bit
    pub fn is_balanced_bracket_scope<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        self.balanced_bracket_selectors.iter().any(|selector| {
            selector == "*"
                || scopes.iter().any(|scope| {
                    let scope = scope.as_ref();
                    scope == selector
                        || (scope.starts_with(selector.as_str())
                            && scope.as_bytes().get(selector.len()) == Some(&b'.'))
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let contents = r#"
# Comment
language-id = "nbt"
max-line-length = 500
strict-references = false
balanced-bracket-selectors = ["meta.structure"]
theme-path = "/tmp/theme.json"
        "#;

        let config = HighlighterConfig::from_toml_str(contents).unwrap();
        assert_eq!(config.language_id, "nbt");
        assert_eq!(config.max_line_length, 500);
        assert!(!config.strict_references);
        assert_eq!(config.balanced_bracket_selectors, vec!["meta.structure".to_string()]);
        assert_eq!(config.theme_path, Some(PathBuf::from("/tmp/theme.json")));
        assert_eq!(config.grammar_path, None);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = HighlighterConfig::from_toml_str("max-line-length = 0").unwrap();
        assert_eq!(config.language_id, "snbt");
        // Clamped to at least one byte
        assert_eq!(config.max_line_length, 1);
        assert!(config.strict_references);
    }

    #[test]
    fn test_invalid_toml() {
        let err = HighlighterConfig::from_toml_str("max-line-length = \"lots\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_balanced_bracket_selectors() {
        let mut config = HighlighterConfig::default();
        assert!(config.is_balanced_bracket_scope(&["anything"]));

        config.balanced_bracket_selectors = vec!["meta.structure".to_string()];
        assert!(config.is_balanced_bracket_scope(&["source.snbt", "meta.structure.list.snbt"]));
        assert!(!config.is_balanced_bracket_scope(&["source.snbt", "meta.structurex"]));
        assert!(!config.is_balanced_bracket_scope(&["string.quoted.double.snbt"]));
    }
}
