//! SNBT language definition

use std::sync::Arc;

use crate::error::{GrammarParseError, ThemeError};
use crate::syntax::engine::PatternEngine;
use crate::syntax::grammar::Grammar;
use crate::syntax::language::LanguageDefinition;
use crate::syntax::theme::Theme;

/// Language id registered with the editor surface
pub const LANGUAGE_ID: &str = "snbt";

/// Root scope of the SNBT grammar
pub const SCOPE_NAME: &str = "source.snbt";

/// The SNBT grammar document
pub const GRAMMAR_SOURCE: &str = include_str!("snbt.tmLanguage.json");

/// The default dark theme document
pub const DARK_THEME_SOURCE: &str = include_str!("dark_theme.json");

/// Create SNBT language definition
pub fn snbt_language() -> LanguageDefinition {
    let mut lang = LanguageDefinition::new(LANGUAGE_ID);
    lang.add_extension("snbt");
    lang.add_alias("SNBT");
    lang
}

/// Load the built-in grammar with a given pattern engine
pub fn snbt_grammar(
    engine: Arc<dyn PatternEngine>,
    strict_references: bool,
) -> Result<Grammar, GrammarParseError> {
    Grammar::load_with(GRAMMAR_SOURCE, engine, strict_references)
}

/// Load the built-in dark theme
pub fn dark_theme() -> Result<Theme, ThemeError> {
    Theme::load(DARK_THEME_SOURCE)
}
