//! Grammar rules
//!
//! Rules live in an arena owned by the grammar and refer to each other by
//! [`RuleId`]. Includes keep the referenced name and are resolved lazily
//! by the grammar, so forward and cyclic references need no special care.

use serde::{Deserialize, Serialize};

use super::tokens::Scope;

/// Index of a rule inside its grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub(crate) usize);

impl RuleId {
    /// Index into the grammar's rule arena
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Scopes for regex capture groups, indexed by group number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(Vec<Option<Vec<Scope>>>);

impl Captures {
    pub(crate) fn from_pairs(pairs: impl IntoIterator<Item = (usize, Vec<Scope>)>) -> Self {
        let mut groups: Vec<Option<Vec<Scope>>> = Vec::new();
        for (group, scopes) in pairs {
            if scopes.is_empty() {
                continue;
            }
            if groups.len() <= group {
                groups.resize(group + 1, None);
            }
            groups[group] = Some(scopes);
        }
        Self(groups)
    }

    /// Scopes for a capture group, if any were declared
    pub fn get(&self, group: usize) -> Option<&[Scope]> {
        self.0.get(group).and_then(|s| s.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What an include points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeTarget {
    /// `#name`, an entry of the grammar repository
    Repository(String),
    /// `$self`, the grammar's own root
    SelfRef,
    /// `$base`, the root of the outermost grammar (the same grammar here)
    Base,
    /// Any other scope name, i.e. another grammar
    External(String),
}

impl IncludeTarget {
    pub(crate) fn parse(include: &str) -> Self {
        match include {
            "$self" => IncludeTarget::SelfRef,
            "$base" => IncludeTarget::Base,
            _ => match include.strip_prefix('#') {
                Some(name) => IncludeTarget::Repository(name.to_string()),
                None => IncludeTarget::External(include.to_string()),
            },
        }
    }

    /// The text the include was written as
    pub fn describe(&self) -> String {
        match self {
            IncludeTarget::Repository(name) => format!("#{}", name),
            IncludeTarget::SelfRef => "$self".to_string(),
            IncludeTarget::Base => "$base".to_string(),
            IncludeTarget::External(scope) => scope.clone(),
        }
    }
}

/// A single-pattern rule
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub name: Vec<Scope>,
    pub pattern: String,
    pub captures: Captures,
    /// Set when the pattern failed to compile; the rule never matches
    pub inert: bool,
}

/// A span from a begin match to an end match with its own child rules
#[derive(Debug, Clone)]
pub struct BeginEndRule {
    /// Scopes for the whole span, delimiters included
    pub name: Vec<Scope>,
    /// Scopes for the interior only
    pub content_name: Vec<Scope>,
    pub begin: String,
    pub end: String,
    pub begin_captures: Captures,
    pub end_captures: Captures,
    /// Child rules active between begin and end, in priority order
    pub patterns: Vec<RuleId>,
    /// Order the end pattern after the children when both start together
    pub apply_end_pattern_last: bool,
    /// Whether a zero-width end may close the span right where begin ended
    pub allow_empty_span: bool,
    /// The end pattern refers to begin captures (`\1`..`\9`)
    pub end_has_backrefs: bool,
    pub inert: bool,
}

/// A reference to another rule
#[derive(Debug, Clone)]
pub struct IncludeRule {
    pub target: IncludeTarget,
}

/// A container of rules with no pattern of its own
#[derive(Debug, Clone)]
pub struct GroupRule {
    pub patterns: Vec<RuleId>,
}

/// A grammar rule
#[derive(Debug, Clone)]
pub enum Rule {
    Match(MatchRule),
    BeginEnd(BeginEndRule),
    Include(IncludeRule),
    Group(GroupRule),
}

impl Rule {
    /// Child rules this rule contributes when it is the active context
    pub fn children(&self) -> &[RuleId] {
        match self {
            Rule::BeginEnd(r) => &r.patterns,
            Rule::Group(g) => &g.patterns,
            Rule::Match(_) | Rule::Include(_) => &[],
        }
    }

    /// Pattern scanned for when this rule is a candidate
    pub fn candidate_pattern(&self) -> Option<&str> {
        match self {
            Rule::Match(r) if !r.inert => Some(&r.pattern),
            Rule::BeginEnd(r) if !r.inert => Some(&r.begin),
            _ => None,
        }
    }

    /// Short name of the rule kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Rule::Match(_) => "match",
            Rule::BeginEnd(_) => "begin/end",
            Rule::Include(_) => "include",
            Rule::Group(_) => "group",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_target_parse() {
        assert_eq!(IncludeTarget::parse("#value"), IncludeTarget::Repository("value".into()));
        assert_eq!(IncludeTarget::parse("$self"), IncludeTarget::SelfRef);
        assert_eq!(IncludeTarget::parse("$base"), IncludeTarget::Base);
        assert_eq!(IncludeTarget::parse("source.json"), IncludeTarget::External("source.json".into()));
        assert_eq!(IncludeTarget::parse("#value").describe(), "#value");
    }

    #[test]
    fn test_captures_sparse() {
        let captures = Captures::from_pairs(vec![
            (2, vec![Scope::new("b")]),
            (0, vec![Scope::new("a")]),
            (1, vec![]),
        ]);
        assert_eq!(captures.get(0), Some(&[Scope::new("a")][..]));
        assert_eq!(captures.get(1), None);
        assert_eq!(captures.get(2), Some(&[Scope::new("b")][..]));
        assert_eq!(captures.get(9), None);
        assert!(Captures::default().is_empty());
    }

    #[test]
    fn test_candidate_pattern_skips_inert() {
        let rule = Rule::Match(MatchRule {
            name: vec![],
            pattern: "x".into(),
            captures: Captures::default(),
            inert: true,
        });
        assert_eq!(rule.candidate_pattern(), None);
        assert!(rule.children().is_empty());
    }
}
