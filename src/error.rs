//! Error types for snbt-highlight

use thiserror::Error;

/// Result type alias for highlighter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarParseError),

    #[error("theme error: {0}")]
    Theme(#[from] ThemeError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Tokenization was requested before `prepare()` finished
    #[error("language provider is not ready")]
    NotReady,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("preparation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Fatal grammar load failures. No partial grammar is ever installed.
#[derive(Error, Debug)]
pub enum GrammarParseError {
    #[error("malformed grammar document: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("grammar has no scopeName")]
    MissingScopeName,

    #[error("grammar has no root patterns")]
    MissingRoot,

    #[error("unresolved rule reference: {name}")]
    UnresolvedReference { name: String },

    #[error("pattern {pattern:?} requires {feature}, which the pattern engine does not support")]
    UnsupportedFeature { pattern: String, feature: &'static str },
}

/// A single pattern failed to compile. The owning rule becomes inert.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid pattern {pattern:?}: {message}")]
pub struct PatternCompileError {
    pub pattern: String,
    pub message: String,
}

/// Theme load failures
#[derive(Error, Debug)]
pub enum ThemeError {
    #[error("malformed theme document: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("invalid color: {0}")]
    InvalidColor(String),
}

/// Configuration load failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}
