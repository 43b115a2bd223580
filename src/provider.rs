//! Language registration
//!
//! [`LanguageProvider`] ties the grammar, the theme and the language
//! configuration to an editor surface. It has a two-phase lifecycle:
//! construct it, then `prepare().await` (or `register(..).await`), after
//! which all tokenizing is synchronous. Before that, tokenize calls fail
//! with [`Error::NotReady`] and the surface-facing provider hands out
//! empty lines so the document simply shows plain text.

use std::fs;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::OnceCell;

use crate::config::HighlighterConfig;
use crate::error::{Error, Result};
use crate::syntax::builtin::snbt;
use crate::syntax::{
    ContinuationState, DocumentTokens, Grammar, LanguageConfiguration, LanguageDefinition,
    LineTokens, PatternEngine, RegexEngine, Rgb, Scope, StandardTokenType, Style, Theme, Token,
    TokenMetadata,
};

/// Tokens of one line in the editor's packed form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLineTokens {
    /// `[start, metadata]` pairs
    pub tokens: Vec<u32>,
    pub end_state: ContinuationState,
}

/// What the editor calls per line while rendering
pub trait TokensProvider: Send + Sync {
    fn initial_state(&self) -> ContinuationState;
    fn tokenize_encoded(&self, line: &str, state: &ContinuationState) -> EncodedLineTokens;
}

/// The editor widget a language is registered with
pub trait EditorSurface {
    /// Register a language, returning the numeric id used in token metadata
    fn register_language(&mut self, language: &LanguageDefinition) -> u8;
    fn set_tokens_provider(&mut self, language_id: &str, provider: Arc<dyn TokensProvider>);
    fn set_language_configuration(&mut self, language_id: &str, configuration: &LanguageConfiguration);
}

/// Where palette and stylesheet are published for rendering
pub trait PresentationSink {
    /// Palette by index; index 0 is a placeholder for "no color"
    fn set_color_map(&mut self, colors: &[Rgb]);
    fn insert_stylesheet(&mut self, css: &str);
}

struct Shared {
    config: HighlighterConfig,
    engine: Arc<dyn PatternEngine>,
    grammar: OnceCell<Arc<Grammar>>,
    theme: RwLock<Option<Arc<Theme>>>,
    encoded_language_id: AtomicU8,
}

/// Grammar, theme and configuration for one language
#[derive(Clone)]
pub struct LanguageProvider {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LanguageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageProvider")
            .field("language_id", &self.shared.config.language_id)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl LanguageProvider {
    /// Create a provider backed by the default regex engine
    pub fn new(config: HighlighterConfig) -> Self {
        Self::with_engine(config, Arc::new(RegexEngine))
    }

    /// Create a provider that compiles patterns with `engine`
    pub fn with_engine(config: HighlighterConfig, engine: Arc<dyn PatternEngine>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                engine,
                grammar: OnceCell::new(),
                theme: RwLock::new(None),
                encoded_language_id: AtomicU8::new(0),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &HighlighterConfig {
        &self.shared.config
    }

    /// Load grammar and theme off the async runtime.
    ///
    /// Runs once; concurrent callers wait for the same load. A failed load
    /// leaves the provider not ready and may be retried.
    pub async fn prepare(&self) -> Result<()> {
        let shared = &self.shared;
        shared
            .grammar
            .get_or_try_init(|| async move {
                let config = shared.config.clone();
                let engine = Arc::clone(&shared.engine);
                let (grammar, theme) =
                    tokio::task::spawn_blocking(move || load_assets(&config, engine)).await??;

                if let Ok(mut current) = shared.theme.write() {
                    current.get_or_insert_with(|| Arc::new(theme));
                }
                Ok::<_, Error>(Arc::new(grammar))
            })
            .await?;
        Ok(())
    }

    /// Check whether `prepare` has completed
    pub fn is_ready(&self) -> bool {
        self.shared.grammar.initialized()
    }

    /// The loaded grammar
    pub fn grammar(&self) -> Result<Arc<Grammar>> {
        self.shared.grammar.get().cloned().ok_or(Error::NotReady)
    }

    /// The active theme, if one is loaded
    pub fn theme(&self) -> Option<Arc<Theme>> {
        self.shared.theme.read().ok().and_then(|t| t.clone())
    }

    /// Swap the theme; call [`inject_presentation`](Self::inject_presentation)
    /// afterwards to publish the new palette
    pub fn set_theme(&self, theme: Theme) {
        log::debug!(
            "switching theme to {} ({} colors)",
            theme.name().unwrap_or("<unnamed>"),
            theme.color_map().len() - 1
        );
        if let Ok(mut current) = self.shared.theme.write() {
            *current = Some(Arc::new(theme));
        }
    }

    /// Language id, extensions and aliases for registration
    pub fn language_definition(&self) -> LanguageDefinition {
        let mut language = snbt::snbt_language();
        language.id = self.shared.config.language_id.clone();
        if let Some(grammar) = self.shared.grammar.get() {
            for ext in grammar.file_types() {
                language.add_extension(ext);
            }
        }
        language
    }

    /// Bracket and auto-closing declarations for the editor
    pub fn language_configuration(&self) -> LanguageConfiguration {
        LanguageConfiguration::snbt()
    }

    /// Register the language with an editor surface.
    ///
    /// The language id is registered first; the tokens provider and the
    /// configuration are installed once the grammar has loaded.
    pub async fn register<S: EditorSurface + ?Sized>(&self, surface: &mut S) -> Result<()> {
        let language = self.language_definition();
        let encoded = surface.register_language(&language);
        self.shared.encoded_language_id.store(encoded, Ordering::Relaxed);

        self.prepare().await?;

        let id = &self.shared.config.language_id;
        surface.set_tokens_provider(id, Arc::new(self.clone()));
        surface.set_language_configuration(id, &self.language_configuration());
        log::debug!("registered language {} with id {}", id, encoded);
        Ok(())
    }

    /// Publish the palette and its stylesheet
    pub fn inject_presentation<P: PresentationSink + ?Sized>(&self, sink: &mut P) -> Result<()> {
        let theme = self.theme().ok_or(Error::NotReady)?;
        sink.set_color_map(theme.color_map().colors());
        sink.insert_stylesheet(&theme.stylesheet());
        Ok(())
    }

    /// Tokenize one line with scope stacks
    pub fn tokenize_line(&self, line: &str, state: &ContinuationState) -> Result<LineTokens> {
        let grammar = self.grammar()?;
        Ok(grammar.tokenize_line_limited(line, state, self.shared.config.max_line_length))
    }

    /// Tokenize one line into `[start, metadata]` pairs
    pub fn tokenize_encoded_line(&self, line: &str, state: &ContinuationState) -> Result<EncodedLineTokens> {
        let grammar = self.grammar()?;
        let result = grammar.tokenize_line_limited(line, state, self.shared.config.max_line_length);
        Ok(EncodedLineTokens {
            tokens: self.encode_tokens(&grammar, &result.tokens),
            end_state: result.end_state,
        })
    }

    /// A token cache sized for this provider's line limit
    pub fn new_document(&self) -> DocumentTokens {
        DocumentTokens::new(self.shared.config.max_line_length)
    }

    /// Bring a document up to date; without a grammar it holds no tokens
    pub fn update_document<S: AsRef<str>>(&self, document: &mut DocumentTokens, lines: &[S]) -> usize {
        let grammar = self.grammar().ok();
        document.update(grammar.as_deref(), lines)
    }

    fn encode_tokens(&self, grammar: &Grammar, tokens: &[Token]) -> Vec<u32> {
        let theme = self.theme();
        let language_id = self.shared.encoded_language_id.load(Ordering::Relaxed);
        let metadata = |scopes: &[Scope]| {
            let style = theme.as_ref().map_or_else(Style::default, |t| t.resolve(scopes));
            TokenMetadata::encode(
                language_id,
                StandardTokenType::from_scopes(scopes),
                self.shared.config.is_balanced_bracket_scope(scopes),
                style,
            )
            .0
        };

        // The editor expects at least one token per line
        if tokens.is_empty() {
            return vec![0, metadata(std::slice::from_ref(grammar.scope_name()))];
        }
        tokens
            .iter()
            .flat_map(|t| [t.start as u32, metadata(&t.scopes)])
            .collect()
    }
}

impl TokensProvider for LanguageProvider {
    fn initial_state(&self) -> ContinuationState {
        ContinuationState::initial()
    }

    fn tokenize_encoded(&self, line: &str, state: &ContinuationState) -> EncodedLineTokens {
        match self.tokenize_encoded_line(line, state) {
            Ok(result) => result,
            Err(e) => {
                log::trace!("serving plain line: {}", e);
                EncodedLineTokens {
                    tokens: Vec::new(),
                    end_state: state.clone(),
                }
            }
        }
    }
}

/// Read grammar and theme, from the configured files or the built-ins
fn load_assets(config: &HighlighterConfig, engine: Arc<dyn PatternEngine>) -> Result<(Grammar, Theme)> {
    let grammar = match &config.grammar_path {
        Some(path) => {
            let source = fs::read_to_string(path)?;
            Grammar::load_with(&source, engine, config.strict_references)?
        }
        None => snbt::snbt_grammar(engine, config.strict_references)?,
    };
    let theme = match &config.theme_path {
        Some(path) => Theme::load(&fs::read_to_string(path)?)?,
        None => snbt::dark_theme()?,
    };
    for diagnostic in grammar.diagnostics() {
        log::warn!("{}: {}", grammar.scope_name(), diagnostic);
    }
    log::debug!(
        "prepared {} with theme {}",
        grammar.scope_name(),
        theme.name().unwrap_or("<unnamed>")
    );
    Ok((grammar, theme))
}
