//! Continuation state threaded from line to line
//!
//! The state is the stack of begin/end rules still open at the end of a
//! line. The grammar root is implicit, so the initial state is an empty
//! stack. States are immutable and cheap to clone.

use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use super::rules::RuleId;
use super::tokens::Scope;

static INITIAL: LazyLock<ContinuationState> = LazyLock::new(|| ContinuationState {
    frames: Arc::from(Vec::new()),
});

/// One open begin/end rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct Frame {
    pub(crate) rule: RuleId,
    /// Scopes covering the delimiters
    pub(crate) name_scopes: Vec<Scope>,
    /// Scopes covering the interior
    pub(crate) content_scopes: Vec<Scope>,
    /// End pattern with back-references filled in
    pub(crate) end_pattern: Option<String>,
    /// The begin match ran to the end of its line, so `\G` holds at column 0
    pub(crate) begin_captured_eol: bool,
    /// Anchor to restore when this frame is popped
    #[serde(skip)]
    pub(crate) anchor_position: Option<usize>,
    /// Cursor position when the frame was pushed on the current line
    #[serde(skip)]
    pub(crate) enter_position: Option<usize>,
    /// Where the begin match ended on the current line
    #[serde(skip)]
    pub(crate) content_start: Option<usize>,
}

impl Frame {
    /// Drop positions that only mean something within one line
    pub(crate) fn reset_line_positions(&mut self) {
        self.anchor_position = None;
        self.enter_position = None;
        self.content_start = None;
    }
}

/// Stack of open rules at a line boundary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationState {
    frames: Arc<[Frame]>,
}

impl ContinuationState {
    /// The state at the start of a document
    pub fn initial() -> Self {
        INITIAL.clone()
    }

    pub(crate) fn from_frames(mut frames: Vec<Frame>) -> Self {
        if frames.is_empty() {
            return Self::initial();
        }
        for frame in &mut frames {
            frame.reset_line_positions();
        }
        Self {
            frames: Arc::from(frames),
        }
    }

    pub(crate) fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of open rules
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether no rule is open
    pub fn is_initial(&self) -> bool {
        self.frames.is_empty()
    }

    /// Rules that are open, outermost first
    pub fn open_rules(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.frames.iter().map(|f| f.rule)
    }

    /// Scopes of the innermost open rule's interior, `None` at the root
    pub fn content_scopes(&self) -> Option<&[Scope]> {
        self.frames.last().map(|f| f.content_scopes.as_slice())
    }
}

impl Default for ContinuationState {
    fn default() -> Self {
        Self::initial()
    }
}
