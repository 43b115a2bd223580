//! Tokens and scopes
//!
//! A token is a byte span of a line tagged with the stack of scope names
//! active there. This module also defines the compact metadata word the
//! editor surface receives for each token.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::style::{FontStyle, Style};

/// A dotted scope name such as `string.quoted.double.snbt`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(Arc<str>);

impl Scope {
    /// Create a scope from a dotted name
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Get the scope name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `prefix` selects this scope (`string` selects `string.quoted`)
    pub fn starts_with_selector(&self, prefix: &str) -> bool {
        let name = self.as_str();
        name == prefix
            || (name.starts_with(prefix) && name.as_bytes().get(prefix.len()) == Some(&b'.'))
    }
}

impl AsRef<str> for Scope {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a rule `name` like `"a.b c.d"` into scopes
pub(crate) fn parse_scope_names(names: &str) -> Vec<Scope> {
    names.split_whitespace().map(Scope::new).collect()
}

/// A scoped span of a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Byte offset where this token starts (inclusive)
    pub start: usize,
    /// Byte offset where this token ends (exclusive)
    pub end: usize,
    /// Scopes from the grammar root (outermost) to the innermost rule
    pub scopes: Vec<Scope>,
}

impl Token {
    /// Length in bytes
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Innermost scope
    pub fn innermost(&self) -> Option<&Scope> {
        self.scopes.last()
    }

    /// Whether any scope on the stack is selected by `prefix`
    pub fn has_scope(&self, prefix: &str) -> bool {
        self.scopes.iter().any(|s| s.starts_with_selector(prefix))
    }
}

/// Coarse token classes the editor uses for bracket matching and
/// auto-closing decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardTokenType {
    Other = 0,
    Comment = 1,
    String = 2,
    RegEx = 3,
}

impl StandardTokenType {
    /// Derive the class of a scope stack; the innermost classified scope wins
    pub fn from_scopes(scopes: &[Scope]) -> Self {
        scopes
            .iter()
            .rev()
            .find_map(|scope| Self::from_name(scope.as_str()))
            .unwrap_or(StandardTokenType::Other)
    }

    /// Classify a single scope name, `None` if it says nothing
    pub fn from_name(name: &str) -> Option<Self> {
        let segments = || name.split('.');
        if segments().any(|s| s == "comment") {
            Some(StandardTokenType::Comment)
        } else if segments().any(|s| s == "string") {
            Some(StandardTokenType::String)
        } else if segments().any(|s| s == "regex") {
            Some(StandardTokenType::RegEx)
        } else if name.starts_with("meta.embedded") {
            Some(StandardTokenType::Other)
        } else {
            None
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            1 => StandardTokenType::Comment,
            2 => StandardTokenType::String,
            3 => StandardTokenType::RegEx,
            _ => StandardTokenType::Other,
        }
    }
}

const LANGUAGE_ID_MASK: u32 = 0x0000_00FF;
const TOKEN_TYPE_OFFSET: u32 = 8;
const BALANCED_BRACKETS_BIT: u32 = 1 << 10;
const FONT_STYLE_OFFSET: u32 = 11;
const FOREGROUND_OFFSET: u32 = 15;
const FOREGROUND_MASK: u32 = 0x1FF;
const BACKGROUND_OFFSET: u32 = 24;
const BACKGROUND_MASK: u32 = 0xFF;

/// The packed per-token word handed to the editor surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TokenMetadata(pub u32);

impl TokenMetadata {
    /// Pack a language id, token type, bracket flag and style
    pub fn encode(
        language_id: u8,
        token_type: StandardTokenType,
        balanced_brackets: bool,
        style: Style,
    ) -> Self {
        let mut word = language_id as u32;
        word |= (token_type as u32) << TOKEN_TYPE_OFFSET;
        if balanced_brackets {
            word |= BALANCED_BRACKETS_BIT;
        }
        word |= (style.font_style.bits() as u32) << FONT_STYLE_OFFSET;
        word |= (style.fg & FOREGROUND_MASK) << FOREGROUND_OFFSET;
        word |= (style.bg & BACKGROUND_MASK) << BACKGROUND_OFFSET;
        Self(word)
    }

    /// Get the language id
    pub fn language_id(&self) -> u8 {
        (self.0 & LANGUAGE_ID_MASK) as u8
    }

    /// Get the standard token type
    pub fn token_type(&self) -> StandardTokenType {
        StandardTokenType::from_bits(self.0 >> TOKEN_TYPE_OFFSET)
    }

    /// Check the balanced-bracket bit
    pub fn balanced_brackets(&self) -> bool {
        self.0 & BALANCED_BRACKETS_BIT != 0
    }

    /// Get the font style flags
    pub fn font_style(&self) -> FontStyle {
        FontStyle::from_bits_truncate((self.0 >> FONT_STYLE_OFFSET) as u8)
    }

    /// Get the foreground palette index
    pub fn foreground(&self) -> u32 {
        (self.0 >> FOREGROUND_OFFSET) & FOREGROUND_MASK
    }

    /// Get the background palette index
    pub fn background(&self) -> u32 {
        (self.0 >> BACKGROUND_OFFSET) & BACKGROUND_MASK
    }
}
