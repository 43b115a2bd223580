//! Per-document token cache
//!
//! Keeps the tokens and end state of every line so that an edit only
//! re-tokenizes from the edited line until the end states line up with
//! the ones stored before the edit. Whole-document passes (grammar or
//! theme swaps) can run off to the side and are committed with a ticket;
//! a pass that was overtaken by a newer one or by an edit is dropped.

use super::grammar::Grammar;
use super::state::ContinuationState;
use super::tokens::Token;

/// Identifies one whole-document pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTicket {
    generation: u64,
}

/// Result of a whole-document pass, waiting to be committed
#[derive(Debug, Clone)]
pub struct DocumentPass {
    generation: u64,
    line_states: Vec<ContinuationState>,
    line_tokens: Vec<Vec<Token>>,
}

impl DocumentPass {
    /// Ticket identifying the pass that produced this result
    pub fn ticket(&self) -> PassTicket {
        PassTicket {
            generation: self.generation,
        }
    }
}

/// Token cache for one document
#[derive(Debug, Clone)]
pub struct DocumentTokens {
    /// End state per line (None = not computed)
    line_states: Vec<Option<ContinuationState>>,
    /// Tokens per line (None = needs tokenizing)
    line_tokens: Vec<Option<Vec<Token>>>,
    /// First line that needs recomputation
    invalid_from: usize,
    generation: u64,
    max_line_length: usize,
}

impl DocumentTokens {
    /// Create an empty cache
    pub fn new(max_line_length: usize) -> Self {
        Self {
            line_states: Vec::new(),
            line_tokens: Vec::new(),
            invalid_from: 0,
            generation: 0,
            max_line_length: max_line_length.max(1),
        }
    }

    /// Number of lines with cached results
    pub fn line_count(&self) -> usize {
        self.line_tokens.len()
    }

    /// Tokens of a line; empty if the line was never tokenized
    pub fn tokens(&self, line: usize) -> &[Token] {
        self.line_tokens
            .get(line)
            .and_then(|t| t.as_deref())
            .unwrap_or(&[])
    }

    /// State at the end of a line, if computed
    pub fn end_state(&self, line: usize) -> Option<&ContinuationState> {
        self.line_states.get(line).and_then(|s| s.as_ref())
    }

    /// State a line starts from
    pub fn start_state(&self, line: usize) -> ContinuationState {
        match line.checked_sub(1) {
            None => ContinuationState::initial(),
            Some(prev) => self.end_state(prev).cloned().unwrap_or_default(),
        }
    }

    /// Whether some line still needs tokenizing
    pub fn is_dirty(&self) -> bool {
        self.invalid_from < self.line_tokens.len()
    }

    /// Mark one line's text as changed
    pub fn invalidate_line(&mut self, line: usize) {
        if let Some(tokens) = self.line_tokens.get_mut(line) {
            *tokens = None;
        }
        self.invalid_from = self.invalid_from.min(line);
        self.generation += 1;
    }

    /// Mark every line from `line` onwards as changed
    pub fn invalidate_from(&mut self, line: usize) {
        for tokens in self.line_tokens.iter_mut().skip(line) {
            *tokens = None;
        }
        self.invalid_from = self.invalid_from.min(line);
        self.generation += 1;
    }

    /// Drop everything
    pub fn invalidate_all(&mut self) {
        self.line_states.clear();
        self.line_tokens.clear();
        self.invalid_from = 0;
        self.generation += 1;
    }

    /// Replace `removed` lines at `start` with `inserted` new ones
    pub fn edit_lines(&mut self, start: usize, removed: usize, inserted: usize) {
        let start = start.min(self.line_tokens.len());
        let end = (start + removed).min(self.line_tokens.len());
        self.line_states
            .splice(start..end, std::iter::repeat(None).take(inserted));
        self.line_tokens
            .splice(start..end, std::iter::repeat(None).take(inserted));
        // The line now at `start` starts from a different predecessor
        self.invalidate_line(start);
    }

    /// Bring the cache up to date with `lines`, returning how many lines
    /// were tokenized.
    ///
    /// Without a grammar (not ready, or failed to load) every line
    /// reports zero tokens.
    pub fn update<S: AsRef<str>>(&mut self, grammar: Option<&Grammar>, lines: &[S]) -> usize {
        let Some(grammar) = grammar else {
            if !self.line_tokens.is_empty() {
                log::debug!("no grammar, clearing {} lines", self.line_tokens.len());
            }
            self.invalidate_all();
            return 0;
        };

        self.ensure_size(lines.len());
        let Some(last_dirty) = self.line_tokens.iter().rposition(Option::is_none) else {
            self.invalid_from = lines.len();
            return 0;
        };

        let mut state = self.start_state(self.invalid_from);
        let mut state_changed = false;
        let mut tokenized = 0;

        for (i, line) in lines.iter().enumerate().skip(self.invalid_from) {
            if !state_changed && self.line_tokens[i].is_some() {
                if i > last_dirty {
                    log::trace!("end states converged at line {}", i);
                    break;
                }
                state = self.end_state(i).cloned().unwrap_or_default();
                continue;
            }

            let result = grammar.tokenize_line_limited(line.as_ref(), &state, self.max_line_length);
            state_changed = self.line_states[i].as_ref() != Some(&result.end_state);
            state = result.end_state.clone();
            self.line_states[i] = Some(result.end_state);
            self.line_tokens[i] = Some(result.tokens);
            tokenized += 1;
        }

        self.invalid_from = lines.len();
        tokenized
    }

    /// Start a whole-document pass; earlier pending passes become stale
    pub fn begin_full_pass(&mut self) -> PassTicket {
        self.generation += 1;
        PassTicket {
            generation: self.generation,
        }
    }

    /// Tokenize a whole document from scratch.
    ///
    /// Needs no access to the cache, so it can run on another thread
    /// while the document keeps serving its current tokens.
    pub fn full_pass<S: AsRef<str>>(
        grammar: &Grammar,
        lines: &[S],
        max_line_length: usize,
        ticket: PassTicket,
    ) -> DocumentPass {
        let mut state = ContinuationState::initial();
        let mut line_states = Vec::with_capacity(lines.len());
        let mut line_tokens = Vec::with_capacity(lines.len());
        for line in lines {
            let result = grammar.tokenize_line_limited(line.as_ref(), &state, max_line_length.max(1));
            state = result.end_state.clone();
            line_states.push(result.end_state);
            line_tokens.push(result.tokens);
        }
        log::debug!("full pass {} tokenized {} lines", ticket.generation, lines.len());
        DocumentPass {
            generation: ticket.generation,
            line_states,
            line_tokens,
        }
    }

    /// Install a pass result unless something newer came along
    pub fn commit(&mut self, pass: DocumentPass) -> bool {
        if pass.generation != self.generation {
            log::debug!(
                "discarding pass {} (current generation {})",
                pass.generation,
                self.generation
            );
            return false;
        }
        self.invalid_from = pass.line_tokens.len();
        self.line_states = pass.line_states.into_iter().map(Some).collect();
        self.line_tokens = pass.line_tokens.into_iter().map(Some).collect();
        true
    }

    /// Get the line length above which lines are not scanned
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Match the cache to the document length
    fn ensure_size(&mut self, line_count: usize) {
        if self.line_tokens.len() > line_count {
            self.line_tokens.truncate(line_count);
            self.line_states.truncate(line_count);
        }
        if self.line_tokens.len() < line_count {
            self.invalid_from = self.invalid_from.min(self.line_tokens.len());
            self.line_tokens.resize(line_count, None);
            self.line_states.resize(line_count, None);
        }
    }
}

impl Default for DocumentTokens {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}
