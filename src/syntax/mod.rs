//! Grammar-driven syntax highlighting
//!
//! This module provides the tokenizing core:
//! - Grammar loading and the pattern engine it compiles against
//! - The per-line tokenizer and the continuation state it threads
//! - Themes, palettes and the encoded token metadata
//! - The per-document token cache

mod style;
mod tokens;
mod rules;
mod engine;
mod grammar;
mod state;
mod tokenizer;
mod theme;
mod language;
mod manager;
pub mod builtin;

pub use style::{FontStyle, Rgb, Style};
pub use tokens::{Scope, StandardTokenType, Token, TokenMetadata};
pub use rules::{BeginEndRule, Captures, GroupRule, IncludeRule, IncludeTarget, MatchRule, Rule, RuleId};
pub use engine::{PatternEngine, RegexEngine, ScanMatch, Scanner};
pub use grammar::{Diagnostic, Grammar};
pub use state::ContinuationState;
pub use tokenizer::LineTokens;
pub use theme::{ColorMap, Theme, DEFAULT_BACKGROUND, DEFAULT_FOREGROUND};
pub use language::{AutoClosingPair, CommentRule, LanguageConfiguration, LanguageDefinition};
pub use manager::{DocumentPass, DocumentTokens, PassTicket};
