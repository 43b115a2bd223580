//! snbt-highlight - grammar-driven syntax highlighting for SNBT
//!
//! Loads a TextMate-style grammar, tokenizes text line by line while
//! threading a continuation state, and maps the resulting scopes to a
//! color palette an editor surface can render.
//!
//! ```no_run
//! use snbt_highlight::{ContinuationState, HighlighterConfig, LanguageProvider};
//!
//! # async fn demo() -> snbt_highlight::Result<()> {
//! let provider = LanguageProvider::new(HighlighterConfig::load());
//! provider.prepare().await?;
//!
//! let mut state = ContinuationState::initial();
//! for line in ["{Items: [", "  {id: \"stone\", Count: 1b}", "]}"] {
//!     let result = provider.tokenize_line(line, &state)?;
//!     state = result.end_state;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod escape;
pub mod provider;
pub mod render;
pub mod syntax;

pub use config::HighlighterConfig;
pub use error::{Error, Result};
pub use escape::{slash_escape, slash_unescape};
pub use provider::{EditorSurface, EncodedLineTokens, LanguageProvider, PresentationSink, TokensProvider};
pub use render::paint_line;
pub use syntax::{ContinuationState, Grammar, Theme, Token};
