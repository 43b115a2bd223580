//! Line tokenizer
//!
//! Scans one line at a time against the grammar, starting from the
//! continuation state left by the previous line. At every position the
//! candidate patterns of the innermost open rule are searched together
//! with that rule's end pattern; the leftmost match wins, earlier
//! declarations win ties, and the end pattern counts as declared first
//! unless the rule asks for `applyEndPatternLast`.

use super::engine::{resolve_backreferences, ScanMatch, Scanner};
use super::grammar::Grammar;
use super::rules::{Captures, Rule, RuleId};
use super::state::{ContinuationState, Frame};
use super::tokens::{Scope, Token};

/// Steps allowed per byte of input before the loop guard gives up
const STEPS_PER_BYTE: usize = 4;

/// Result of tokenizing a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTokens {
    /// Tokens partitioning the line, in order
    pub tokens: Vec<Token>,
    /// State to feed to the next line
    pub end_state: ContinuationState,
    /// Scan iterations used
    pub(crate) steps: usize,
}

/// Collects tokens so that they always partition the line.
///
/// Each call to `produce` closes the token running from the end of the
/// previous one; adjacent tokens with the same scopes are merged.
#[derive(Debug, Default)]
struct TokenAccumulator {
    tokens: Vec<Token>,
    last_end_pos: usize,
}

impl TokenAccumulator {
    fn produce(&mut self, end_pos: usize, scopes: &[Scope]) {
        if self.last_end_pos >= end_pos {
            return;
        }
        match self.tokens.last_mut() {
            Some(last) if last.end == self.last_end_pos && last.scopes == scopes => {
                last.end = end_pos;
            }
            _ => self.tokens.push(Token {
                start: self.last_end_pos,
                end: end_pos,
                scopes: scopes.to_vec(),
            }),
        }
        self.last_end_pos = end_pos;
    }
}

/// Which half of the grammar produced a match
enum MatchKind {
    /// A candidate rule (match rule or the begin of a begin/end rule)
    Rule(RuleId),
    /// The end pattern of the innermost open rule
    End,
}

struct Found {
    kind: MatchKind,
    m: ScanMatch,
}

impl Grammar {
    /// Tokenize one line.
    ///
    /// Always terminates and always covers the whole line; a line without
    /// any match is one token with the current scopes.
    pub fn tokenize_line(&self, line: &str, state: &ContinuationState) -> LineTokens {
        let root_scopes = [self.scope_name().clone()];
        let mut stack: Vec<Frame> = state.frames().to_vec();
        let mut acc = TokenAccumulator::default();
        let mut pos = 0;
        let mut anchor = stack.last().filter(|f| f.begin_captured_eol).map(|_| 0);
        let mut zero_width_end_at: Option<(usize, usize)> = None;
        let max_steps = STEPS_PER_BYTE * (line.len() + 1) + 16 * (stack.len() + 1);
        let mut steps = 0;

        loop {
            steps += 1;
            if steps > max_steps {
                log::warn!(
                    "{}: loop guard hit after {} steps at byte {}",
                    self.scope_name(),
                    steps,
                    pos
                );
                acc.produce(line.len(), content_scopes(&stack, &root_scopes));
                break;
            }

            let Some(Found { kind, m }) = self.find_match(&stack, line, pos, anchor) else {
                log::trace!("no match from byte {}", pos);
                acc.produce(line.len(), content_scopes(&stack, &root_scopes));
                break;
            };
            let advanced = m.end > pos;

            match kind {
                MatchKind::End => {
                    // A zero-width end is honored once per position and depth
                    if m.start == m.end {
                        let key = (m.start, stack.len());
                        if zero_width_end_at == Some(key) {
                            acc.produce(line.len(), content_scopes(&stack, &root_scopes));
                            break;
                        }
                        zero_width_end_at = Some(key);
                    }

                    let Some(frame) = stack.pop() else {
                        acc.produce(line.len(), &root_scopes);
                        break;
                    };
                    log::trace!("end of rule {} at {}..{}", frame.rule.index(), m.start, m.end);
                    acc.produce(m.start, &frame.content_scopes);
                    if let Some(Rule::BeginEnd(rule)) = self.rule(frame.rule) {
                        apply_captures(&mut acc, &frame.name_scopes, &rule.end_captures, &m.captures);
                    }
                    acc.produce(m.end, &frame.name_scopes);
                    anchor = frame.anchor_position;

                    // Pushed and popped without moving: keep the rule and
                    // give up on the rest of the line
                    if !advanced && frame.enter_position == Some(pos) {
                        stack.push(frame);
                        acc.produce(line.len(), content_scopes(&stack, &root_scopes));
                        break;
                    }
                }
                MatchKind::Rule(id) => {
                    let parent_scopes = content_scopes(&stack, &root_scopes).to_vec();
                    acc.produce(m.start, &parent_scopes);

                    match self.rule(id) {
                        Some(Rule::Match(rule)) => {
                            log::trace!("match rule {} at {}..{}", id.index(), m.start, m.end);
                            let scopes = extend(&parent_scopes, &rule.name);
                            apply_captures(&mut acc, &scopes, &rule.captures, &m.captures);
                            acc.produce(m.end, &scopes);
                            if !advanced {
                                acc.produce(line.len(), &parent_scopes);
                                break;
                            }
                        }
                        Some(Rule::BeginEnd(rule)) => {
                            let reentered = stack
                                .iter()
                                .any(|f| f.rule == id && f.enter_position == Some(pos));
                            if !advanced && reentered {
                                acc.produce(line.len(), &parent_scopes);
                                break;
                            }

                            log::trace!("begin rule {} at {}..{}", id.index(), m.start, m.end);
                            let name_scopes = extend(&parent_scopes, &rule.name);
                            apply_captures(&mut acc, &name_scopes, &rule.begin_captures, &m.captures);
                            acc.produce(m.end, &name_scopes);

                            let inner_scopes = extend(&name_scopes, &rule.content_name);
                            let end_pattern = rule
                                .end_has_backrefs
                                .then(|| resolve_backreferences(&rule.end, line, &m.captures));
                            stack.push(Frame {
                                rule: id,
                                name_scopes,
                                content_scopes: inner_scopes,
                                end_pattern,
                                begin_captured_eol: m.end == line.len(),
                                anchor_position: anchor,
                                enter_position: Some(pos),
                                content_start: Some(m.end),
                            });
                            anchor = Some(m.end);
                        }
                        Some(rule) => {
                            log::warn!("{} rule {} cannot match on its own", rule.kind_name(), id.index());
                            acc.produce(line.len(), &parent_scopes);
                            break;
                        }
                        None => {
                            acc.produce(line.len(), &parent_scopes);
                            break;
                        }
                    }
                }
            }

            if advanced {
                pos = m.end;
            }
        }

        LineTokens {
            tokens: acc.tokens,
            end_state: ContinuationState::from_frames(stack),
            steps,
        }
    }

    /// Tokenize one line unless it is longer than `max_line_length` bytes,
    /// in which case it becomes a single token and the state carries over
    pub fn tokenize_line_limited(
        &self,
        line: &str,
        state: &ContinuationState,
        max_line_length: usize,
    ) -> LineTokens {
        if line.len() <= max_line_length {
            return self.tokenize_line(line, state);
        }
        log::debug!("skipping line of {} bytes", line.len());
        let root_scopes = [self.scope_name().clone()];
        let scopes = state.content_scopes().unwrap_or(&root_scopes);
        LineTokens {
            tokens: vec![Token {
                start: 0,
                end: line.len(),
                scopes: scopes.to_vec(),
            }],
            end_state: state.clone(),
            steps: 0,
        }
    }

    /// Tokenize a whole text, threading state from line to line
    pub fn tokenize_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<LineTokens> {
        let mut state = ContinuationState::initial();
        let mut out = Vec::new();
        for line in lines {
            let result = self.tokenize_line(line, &state);
            state = result.end_state.clone();
            out.push(result);
        }
        out
    }

    /// Leftmost match among the candidates of the innermost rule and its end
    fn find_match(&self, stack: &[Frame], line: &str, pos: usize, anchor: Option<usize>) -> Option<Found> {
        let context = stack.last().map_or(self.root(), |f| f.rule);

        let rule_match = self.candidates(context).and_then(|set| {
            let m = set.scanner.as_ref()?.find_next_match(line, pos, anchor)?;
            let id = *set.rules.get(m.index)?;
            Some(Found {
                kind: MatchKind::Rule(id),
                m,
            })
        });
        let end_match = stack.last().and_then(|frame| {
            self.find_end(frame, line, pos, anchor).map(|m| Found {
                kind: MatchKind::End,
                m,
            })
        });

        match (rule_match, end_match) {
            (None, None) => None,
            (Some(r), None) => Some(r),
            (None, Some(e)) => Some(e),
            (Some(r), Some(e)) => {
                let end_last = matches!(
                    self.rule(context),
                    Some(Rule::BeginEnd(b)) if b.apply_end_pattern_last
                );
                if e.m.start < r.m.start || (e.m.start == r.m.start && !end_last) {
                    Some(e)
                } else {
                    Some(r)
                }
            }
        }
    }

    fn find_end(&self, frame: &Frame, line: &str, pos: usize, anchor: Option<usize>) -> Option<ScanMatch> {
        let Some(Rule::BeginEnd(rule)) = self.rule(frame.rule) else {
            return None;
        };

        let dynamic;
        let scanner: &dyn Scanner = match &frame.end_pattern {
            Some(pattern) => {
                dynamic = self.dynamic_end_scanner(pattern)?;
                dynamic.as_ref()
            }
            None => self.static_end_scanner(frame.rule)?,
        };

        let mut from = pos;
        loop {
            let m = scanner.find_next_match(line, from, anchor)?;
            let degenerate = m.start == m.end && Some(m.start) == frame.content_start;
            if rule.allow_empty_span || !degenerate {
                return Some(m);
            }
            // Skip the empty span and look further along the line
            from = next_char_boundary(line, m.start)?;
        }
    }
}

fn content_scopes<'a>(stack: &'a [Frame], root: &'a [Scope]) -> &'a [Scope] {
    stack.last().map_or(root, |f| f.content_scopes.as_slice())
}

fn extend(base: &[Scope], more: &[Scope]) -> Vec<Scope> {
    let mut scopes = Vec::with_capacity(base.len() + more.len());
    scopes.extend_from_slice(base);
    scopes.extend_from_slice(more);
    scopes
}

fn next_char_boundary(line: &str, pos: usize) -> Option<usize> {
    line.get(pos..)?.chars().next().map(|c| pos + c.len_utf8())
}

/// Emit tokens for capture groups inside a match.
///
/// Nested groups stack their scopes on top of the enclosing group; the
/// caller closes the match itself afterwards.
fn apply_captures(
    acc: &mut TokenAccumulator,
    base: &[Scope],
    captures: &Captures,
    groups: &[Option<(usize, usize)>],
) {
    if captures.is_empty() {
        return;
    }
    let match_end = groups.first().copied().flatten().map_or(0, |(_, end)| end);

    // (scopes, end) of groups still open
    let mut open: Vec<(Vec<Scope>, usize)> = Vec::with_capacity(2);

    for (group, span) in groups.iter().enumerate() {
        let Some(names) = captures.get(group) else {
            continue;
        };
        let Some((start, end)) = *span else {
            continue;
        };
        let end = end.min(match_end);
        if start >= end {
            continue;
        }

        while open.last().map_or(false, |(_, open_end)| *open_end <= start) {
            if let Some((scopes, open_end)) = open.pop() {
                acc.produce(open_end, &scopes);
            }
        }

        let parent = open.last().map_or(base, |(scopes, _)| scopes.as_slice());
        acc.produce(start, parent);
        let scopes = extend(parent, names);
        open.push((scopes, end));
    }

    while let Some((scopes, end)) = open.pop() {
        acc.produce(end, &scopes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar(source: &str) -> Grammar {
        Grammar::load(source).unwrap()
    }

    fn quoted() -> Grammar {
        grammar(r#"{ "scopeName": "source.q", "patterns": [
            { "begin": "\"", "end": "\"", "name": "string" }
        ] }"#)
    }

    fn spans(result: &LineTokens) -> Vec<(usize, usize, Option<String>)> {
        result
            .tokens
            .iter()
            .map(|t| (t.start, t.end, t.scopes.get(1).map(|s| s.to_string())))
            .collect()
    }

    fn assert_partition(line: &str, result: &LineTokens) {
        let mut expected_start = 0;
        for token in &result.tokens {
            assert_eq!(token.start, expected_start, "gap or overlap in {:?}", result.tokens);
            assert!(token.end > token.start);
            expected_start = token.end;
        }
        assert_eq!(expected_start, line.len());
    }

    #[test]
    fn test_balanced_begin_end() {
        let g = quoted();
        let line = r#""abc" x "def""#;
        let result = g.tokenize_line(line, &ContinuationState::initial());

        assert_partition(line, &result);
        assert_eq!(
            spans(&result),
            vec![
                (0, 5, Some("string".to_string())),
                (5, 8, None),
                (8, 13, Some("string".to_string())),
            ]
        );
        assert!(result.end_state.is_initial());
        assert_eq!(result.end_state.depth(), ContinuationState::initial().depth());
    }

    #[test]
    fn test_unterminated_span_continues() {
        let g = quoted();
        let first = g.tokenize_line(r#""abc"#, &ContinuationState::initial());
        assert_eq!(spans(&first), vec![(0, 4, Some("string".to_string()))]);
        assert_eq!(first.end_state.depth(), 1);

        let second = g.tokenize_line(r#"def" x"#, &first.end_state);
        assert_partition(r#"def" x"#, &second);
        assert_eq!(
            spans(&second),
            vec![(0, 4, Some("string".to_string())), (4, 6, None)]
        );
        assert!(second.end_state.is_initial());
    }

    #[test]
    fn test_content_name_leaves_delimiters_plain() {
        let g = grammar(r#"{ "scopeName": "source.q", "patterns": [
            { "begin": "\"", "end": "\"", "contentName": "string" }
        ] }"#);
        let first = g.tokenize_line(r#""abc"#, &ContinuationState::initial());
        assert_eq!(spans(&first), vec![(0, 1, None), (1, 4, Some("string".to_string()))]);

        let second = g.tokenize_line(r#"def""#, &first.end_state);
        assert_eq!(spans(&second), vec![(0, 3, Some("string".to_string())), (3, 4, None)]);
        assert!(second.end_state.is_initial());
    }

    #[test]
    fn test_state_threading_does_not_change_earlier_lines() {
        let g = quoted();
        let lines = [r#"a "b"#, r#"c" d"#];
        let threaded = g.tokenize_lines(lines);
        let alone = g.tokenize_line(lines[0], &ContinuationState::initial());
        assert_eq!(threaded[0], alone);
    }

    #[test]
    fn test_deterministic() {
        let g = quoted();
        let state = g.tokenize_line(r#""open"#, &ContinuationState::initial()).end_state;
        let a = g.tokenize_line(r#"x" "y" z"#, &state);
        let b = g.tokenize_line(r#"x" "y" z"#, &state);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tie_break_first_declared_wins() {
        let g = grammar(r#"{ "scopeName": "source.t", "patterns": [
            { "match": "[a-z]", "name": "first" },
            { "match": "[a-z]+[0-9]*(?:_[a-z]+)?", "name": "second" }
        ] }"#);
        let result = g.tokenize_line("ab1", &ContinuationState::initial());
        // `a` and `b` match separately and merge into one token
        assert_eq!(spans(&result), vec![(0, 2, Some("first".to_string())), (2, 3, None)]);

        let result = g.tokenize_line("a1", &ContinuationState::initial());
        assert_eq!(result.tokens[0].scopes[1].as_str(), "first");
        assert_eq!(result.tokens[0].end, 1);

        let swapped = grammar(r#"{ "scopeName": "source.t", "patterns": [
            { "match": "[a-z]+[0-9]*(?:_[a-z]+)?", "name": "second" },
            { "match": "[a-z]", "name": "first" }
        ] }"#);
        let result = swapped.tokenize_line("ab1", &ContinuationState::initial());
        assert_eq!(result.tokens[0].scopes[1].as_str(), "second");
        assert_eq!(result.tokens[0].end, 3);
    }

    #[test]
    fn test_end_pattern_beats_children_at_same_position() {
        let source = |last: bool| {
            format!(
                r#"{{ "scopeName": "source.t", "patterns": [
                    {{ "begin": "<", "end": ">", "name": "tag", "applyEndPatternLast": {last},
                       "patterns": [ {{ "match": ">+", "name": "arrows" }} ] }}
                ] }}"#
            )
        };

        let g = grammar(&source(false));
        let result = g.tokenize_line("<a>>", &ContinuationState::initial());
        // `>` closes the tag, the second `>` is outside
        assert_eq!(result.tokens.last().map(|t| (t.start, t.end)), Some((3, 4)));
        assert!(result.end_state.is_initial());

        let g = grammar(&source(true));
        let result = g.tokenize_line("<a>>", &ContinuationState::initial());
        // Children first: `>>` is eaten inside the still-open tag
        assert_eq!(result.end_state.depth(), 1);
        assert!(result.tokens.iter().any(|t| t.has_scope("arrows") && (t.start, t.end) == (2, 4)));
    }

    #[test]
    fn test_captures_stay_inside_match() {
        let g = grammar(r#"{ "scopeName": "source.t", "patterns": [
            { "match": "(\\w+)\\s*(:)", "name": "meta.entry",
              "captures": { "1": { "name": "key" }, "2": { "name": "colon" } } }
        ] }"#);
        let line = "  name : 1";
        let result = g.tokenize_line(line, &ContinuationState::initial());
        assert_partition(line, &result);

        let scoped: Vec<_> = result
            .tokens
            .iter()
            .map(|t| (t.start, t.end, t.innermost().map(|s| s.to_string())))
            .collect();
        assert_eq!(
            scoped,
            vec![
                (0, 2, Some("source.t".to_string())),
                (2, 6, Some("key".to_string())),
                (6, 7, Some("meta.entry".to_string())),
                (7, 8, Some("colon".to_string())),
                (8, 10, Some("source.t".to_string())),
            ]
        );
    }

    #[test]
    fn test_end_backreference() {
        let g = grammar(r#"{ "scopeName": "source.t", "patterns": [
            { "begin": "(['\"])", "end": "\\1", "name": "string" }
        ] }"#);
        let line = r#"'a"b' c"#;
        let result = g.tokenize_line(line, &ContinuationState::initial());
        assert_eq!(spans(&result), vec![(0, 5, Some("string".to_string())), (5, 7, None)]);

        // The resolved end pattern is carried to the next line
        let open = g.tokenize_line(r#"'a"b"#, &ContinuationState::initial());
        let next = g.tokenize_line(r#"c"d' e"#, &open.end_state);
        assert_eq!(spans(&next), vec![(0, 4, Some("string".to_string())), (4, 6, None)]);
    }

    #[test]
    fn test_zero_width_end_terminates() {
        let g = grammar(r#"{ "scopeName": "source.t", "patterns": [
            { "begin": "a*", "end": "b*", "name": "empty" }
        ] }"#);
        for line in ["", "xyz", "aaa", "ababab", "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"] {
            let result = g.tokenize_line(line, &ContinuationState::initial());
            assert_partition(line, &result);
            assert!(
                result.steps <= STEPS_PER_BYTE * (line.len() + 1) + 16,
                "{} steps for {:?}",
                result.steps,
                line
            );
        }
    }

    #[test]
    fn test_nested_line_end_rules_all_close() {
        let g = grammar(r##"{ "scopeName": "source.t", "patterns": [
            { "begin": "#", "end": "$", "name": "comment",
              "patterns": [ { "begin": "@", "end": "$", "name": "tag" } ] }
        ] }"##);
        let first = g.tokenize_line("# @x", &ContinuationState::initial());
        assert_partition("# @x", &first);
        assert!(first.end_state.is_initial());

        let scoped: Vec<_> = first
            .tokens
            .iter()
            .map(|t| (t.start, t.end, t.scopes.iter().map(|s| s.to_string()).collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            scoped,
            vec![
                (0, 2, vec!["source.t".to_string(), "comment".to_string()]),
                (2, 4, vec!["source.t".to_string(), "comment".to_string(), "tag".to_string()]),
            ]
        );

        let next = g.tokenize_line("plain", &first.end_state);
        assert_eq!(spans(&next), vec![(0, 5, None)]);
    }

    #[test]
    fn test_self_recursive_zero_width_begin_terminates() {
        let g = grammar(r##"{ "scopeName": "source.t", "patterns": [ { "include": "#loop" } ],
            "repository": {
                "loop": { "begin": "", "end": "x", "name": "loop", "patterns": [ { "include": "#loop" } ] }
            } }"##);
        let line = "abc";
        let result = g.tokenize_line(line, &ContinuationState::initial());
        assert_partition(line, &result);
        assert!(result.steps <= STEPS_PER_BYTE * (line.len() + 1) + 16);
    }

    #[test]
    fn test_empty_span_guard() {
        let g = grammar(r##"{ "scopeName": "source.t", "patterns": [
            { "begin": "#", "end": "$", "name": "comment", "allowEmptySpan": false }
        ] }"##);
        // `$` right after `#` is a degenerate span; nothing else closes it
        let result = g.tokenize_line("#", &ContinuationState::initial());
        assert_eq!(result.end_state.depth(), 1);

        let result = g.tokenize_line("# note", &ContinuationState::initial());
        assert!(result.end_state.is_initial());
        assert_eq!(spans(&result), vec![(0, 6, Some("comment".to_string()))]);

        let allowed = grammar(r##"{ "scopeName": "source.t", "patterns": [
            { "begin": "#", "end": "$", "name": "comment" }
        ] }"##);
        let result = allowed.tokenize_line("#", &ContinuationState::initial());
        assert!(result.end_state.is_initial());
    }

    #[test]
    fn test_g_anchor_after_begin() {
        let g = grammar(r#"{ "scopeName": "source.t", "patterns": [
            { "begin": "\\[", "end": "\\]", "name": "list",
              "patterns": [
                { "match": "\\G\\s*[BIL]\\s*;", "name": "array.type" },
                { "match": "\\w+", "name": "item" }
              ] }
        ] }"#);
        let result = g.tokenize_line("[B; 1b]", &ContinuationState::initial());
        assert!(result.tokens.iter().any(|t| t.has_scope("array.type") && (t.start, t.end) == (1, 3)));

        // Not directly after the bracket, so the anchored rule stays quiet
        let result = g.tokenize_line("[x B; 1b]", &ContinuationState::initial());
        assert!(!result.tokens.iter().any(|t| t.has_scope("array.type")));
    }

    #[test]
    fn test_inert_rule_does_not_blank_line() {
        let g = grammar(r#"{ "scopeName": "source.t", "patterns": [
            { "match": "([", "name": "broken" },
            { "match": "\\d+", "name": "number" }
        ] }"#);
        let result = g.tokenize_line("a 12", &ContinuationState::initial());
        assert_partition("a 12", &result);
        assert!(result.tokens.iter().any(|t| t.has_scope("number")));
    }

    #[test]
    fn test_empty_line_has_no_tokens() {
        let g = quoted();
        let result = g.tokenize_line("", &ContinuationState::initial());
        assert!(result.tokens.is_empty());
        assert!(result.end_state.is_initial());
    }

    #[test]
    fn test_line_length_limit() {
        let g = quoted();
        let open = g.tokenize_line("\"", &ContinuationState::initial()).end_state;
        let result = g.tokenize_line_limited("\" plain afterwards", &open, 4);
        assert_eq!(result.tokens.len(), 1);
        assert!(result.tokens[0].has_scope("string"));
        assert_eq!(result.end_state, open);
    }
}
