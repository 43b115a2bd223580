//! Grammar loading
//!
//! A grammar is parsed once from its JSON document into an immutable rule
//! arena. Everything derived later (candidate pattern sets, end scanners)
//! is memoized behind thread-safe cells, so one `Grammar` can be shared by
//! any number of documents through an `Arc`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use serde::Deserialize;

use super::engine::{has_backreferences, resolve_backreferences, PatternEngine, RegexEngine, Scanner};
use super::rules::{
    BeginEndRule, Captures, GroupRule, IncludeRule, IncludeTarget, MatchRule, Rule, RuleId,
};
use super::tokens::{parse_scope_names, Scope};
use crate::error::{GrammarParseError, PatternCompileError};

/// End patterns for begin rules that never close
const NEVER_MATCHES: &str = "\u{FFFF}";

/// Dynamic end scanners kept before the cache is flushed
const DYNAMIC_END_CACHE_LIMIT: usize = 1024;

/// Non-fatal problems found while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A rule's pattern did not compile; the rule is inert
    PatternCompile { rule: RuleId, error: PatternCompileError },
    /// An include names nothing; it contributes no patterns
    UnresolvedReference { name: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::PatternCompile { rule, error } => {
                write!(f, "rule {} is inert: {}", rule.index(), error)
            }
            Diagnostic::UnresolvedReference { name } => {
                write!(f, "include {} resolves to nothing", name)
            }
        }
    }
}

/// Candidate patterns for one context rule, compiled together
pub(crate) struct CandidateSet {
    pub(crate) rules: Vec<RuleId>,
    pub(crate) scanner: Option<Box<dyn Scanner>>,
}

/// A loaded grammar
pub struct Grammar {
    scope_name: Scope,
    name: Option<String>,
    file_types: Vec<String>,
    rules: Vec<Rule>,
    root: RuleId,
    repository: HashMap<String, RuleId>,
    engine: Arc<dyn PatternEngine>,
    diagnostics: Vec<Diagnostic>,
    candidates: Vec<OnceLock<CandidateSet>>,
    end_scanners: Vec<OnceLock<Option<Box<dyn Scanner>>>>,
    dynamic_end_scanners: RwLock<HashMap<String, Option<Arc<dyn Scanner>>>>,
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("scope_name", &self.scope_name)
            .field("rules", &self.rules.len())
            .field("repository", &self.repository.len())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl Grammar {
    /// Load a grammar with the default regex engine and strict references
    pub fn load(source: &str) -> Result<Self, GrammarParseError> {
        Self::load_with(source, Arc::new(RegexEngine), true)
    }

    /// Load a grammar with a given pattern engine.
    ///
    /// With `strict_references` a dangling include fails the load;
    /// otherwise it is recorded as a diagnostic and contributes nothing.
    pub fn load_with(
        source: &str,
        engine: Arc<dyn PatternEngine>,
        strict_references: bool,
    ) -> Result<Self, GrammarParseError> {
        let raw: RawGrammar = serde_json::from_str(source)?;

        let scope_name = raw
            .scope_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Scope::new)
            .ok_or(GrammarParseError::MissingScopeName)?;
        let root_patterns = raw.patterns.as_ref().ok_or(GrammarParseError::MissingRoot)?;

        let mut builder = Builder {
            engine: engine.as_ref(),
            rules: Vec::new(),
            diagnostics: Vec::new(),
            includes: Vec::new(),
        };

        let root_children = root_patterns
            .iter()
            .map(|r| builder.add(r))
            .collect::<Result<Vec<_>, _>>()?;
        let root = builder.push(Rule::Group(GroupRule {
            patterns: root_children,
        }));

        let mut repository = HashMap::new();
        for (name, raw_rule) in &raw.repository {
            let id = builder.add(raw_rule)?;
            repository.insert(name.clone(), id);
        }

        let Builder {
            rules,
            mut diagnostics,
            includes,
            ..
        } = builder;

        for target in includes {
            let resolved = match &target {
                IncludeTarget::Repository(name) => repository.contains_key(name),
                IncludeTarget::SelfRef | IncludeTarget::Base => true,
                IncludeTarget::External(_) => false,
            };
            if resolved {
                continue;
            }
            let name = target.describe();
            if strict_references {
                return Err(GrammarParseError::UnresolvedReference { name });
            }
            log::warn!("{}: include {} resolves to nothing", scope_name, name);
            let diagnostic = Diagnostic::UnresolvedReference { name };
            if !diagnostics.contains(&diagnostic) {
                diagnostics.push(diagnostic);
            }
        }

        log::debug!(
            "loaded grammar {} ({} rules, {} repository entries, {} diagnostics)",
            scope_name,
            rules.len(),
            repository.len(),
            diagnostics.len()
        );

        let candidates = (0..rules.len()).map(|_| OnceLock::new()).collect();
        let end_scanners = (0..rules.len()).map(|_| OnceLock::new()).collect();

        Ok(Self {
            scope_name,
            name: raw.name,
            file_types: raw.file_types,
            rules,
            root,
            repository,
            engine,
            diagnostics,
            candidates,
            end_scanners,
            dynamic_end_scanners: RwLock::new(HashMap::new()),
        })
    }

    /// Root scope, e.g. `source.snbt`
    pub fn scope_name(&self) -> &Scope {
        &self.scope_name
    }

    /// Display name of the grammar, if declared
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// File extensions declared by the grammar
    pub fn file_types(&self) -> &[String] {
        &self.file_types
    }

    /// Get the root rule
    pub fn root(&self) -> RuleId {
        self.root
    }

    /// Look up a rule by id
    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    /// Look up a repository entry by name
    pub fn repository_rule(&self, name: &str) -> Option<RuleId> {
        self.repository.get(name).copied()
    }

    /// Problems that made parts of the grammar inert
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Resolve an include to the rule it names
    pub fn resolve_include(&self, target: &IncludeTarget) -> Option<RuleId> {
        match target {
            IncludeTarget::Repository(name) => self.repository_rule(name),
            IncludeTarget::SelfRef | IncludeTarget::Base => Some(self.root),
            IncludeTarget::External(_) => None,
        }
    }

    /// Candidate patterns active inside `context`, resolved on first use
    pub(crate) fn candidates(&self, context: RuleId) -> Option<&CandidateSet> {
        let cell = self.candidates.get(context.0)?;
        Some(cell.get_or_init(|| self.build_candidates(context)))
    }

    fn build_candidates(&self, context: RuleId) -> CandidateSet {
        let mut rules = Vec::new();
        let mut visited = HashSet::new();
        if let Some(rule) = self.rule(context) {
            for &child in rule.children() {
                self.collect_candidates(child, &mut rules, &mut visited);
            }
        }

        let patterns: Vec<&str> = rules
            .iter()
            .filter_map(|id| self.rule(*id).and_then(Rule::candidate_pattern))
            .collect();
        let scanner = if patterns.is_empty() {
            None
        } else {
            match self.engine.compile(&patterns) {
                Ok(scanner) => Some(scanner),
                Err(e) => {
                    log::warn!("{}: candidate set for rule {} failed: {}", self.scope_name, context.0, e);
                    None
                }
            }
        };

        log::trace!("candidates for rule {}: {:?}", context.0, rules);
        CandidateSet { rules, scanner }
    }

    fn collect_candidates(&self, id: RuleId, out: &mut Vec<RuleId>, visited: &mut HashSet<RuleId>) {
        if !visited.insert(id) {
            return;
        }
        match self.rule(id) {
            Some(rule @ (Rule::Match(_) | Rule::BeginEnd(_))) => {
                if rule.candidate_pattern().is_some() {
                    out.push(id);
                }
            }
            Some(Rule::Include(IncludeRule { target })) => match self.resolve_include(target) {
                Some(resolved) => self.collect_candidates(resolved, out, visited),
                None => log::trace!("include {} contributes nothing", target.describe()),
            },
            Some(Rule::Group(group)) => {
                for &child in &group.patterns {
                    self.collect_candidates(child, out, visited);
                }
            }
            None => {}
        }
    }

    /// Scanner for a rule's static end pattern
    pub(crate) fn static_end_scanner(&self, rule: RuleId) -> Option<&dyn Scanner> {
        let cell = self.end_scanners.get(rule.0)?;
        cell.get_or_init(|| match self.rule(rule) {
            Some(Rule::BeginEnd(r)) if !r.inert => match self.engine.compile(&[r.end.as_str()]) {
                Ok(scanner) => Some(scanner),
                Err(e) => {
                    log::warn!("{}: end pattern of rule {} failed: {}", self.scope_name, rule.0, e);
                    None
                }
            },
            _ => None,
        })
        .as_deref()
    }

    /// Scanner for an end pattern whose back-references were filled in
    pub(crate) fn dynamic_end_scanner(&self, pattern: &str) -> Option<Arc<dyn Scanner>> {
        if let Ok(cache) = self.dynamic_end_scanners.read() {
            if let Some(scanner) = cache.get(pattern) {
                return scanner.clone();
            }
        }

        let scanner: Option<Arc<dyn Scanner>> = match self.engine.compile(&[pattern]) {
            Ok(scanner) => Some(Arc::from(scanner)),
            Err(e) => {
                log::warn!("{}: resolved end pattern failed: {}", self.scope_name, e);
                None
            }
        };

        if let Ok(mut cache) = self.dynamic_end_scanners.write() {
            if cache.len() >= DYNAMIC_END_CACHE_LIMIT {
                cache.clear();
            }
            cache.insert(pattern.to_string(), scanner.clone());
        }
        scanner
    }
}

/// Accumulates rules while walking the raw document
struct Builder<'e> {
    engine: &'e dyn PatternEngine,
    rules: Vec<Rule>,
    diagnostics: Vec<Diagnostic>,
    includes: Vec<IncludeTarget>,
}

impl Builder<'_> {
    fn push(&mut self, rule: Rule) -> RuleId {
        self.rules.push(rule);
        RuleId(self.rules.len() - 1)
    }

    fn add(&mut self, raw: &RawRule) -> Result<RuleId, GrammarParseError> {
        if let Some(include) = &raw.include {
            let target = IncludeTarget::parse(include);
            self.includes.push(target.clone());
            return Ok(self.push(Rule::Include(IncludeRule { target })));
        }

        let name = raw.name.as_deref().map(parse_scope_names).unwrap_or_default();

        if let Some(pattern) = &raw.match_ {
            self.require_supported(pattern)?;
            let id = self.push(Rule::Match(MatchRule {
                name,
                pattern: pattern.clone(),
                captures: convert_captures(raw.captures.as_ref()),
                inert: false,
            }));
            if let Err(error) = self.engine.compile(&[pattern.as_str()]) {
                self.make_inert(id, error);
            }
            return Ok(id);
        }

        let children = raw
            .patterns
            .iter()
            .flatten()
            .map(|r| self.add(r))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(begin) = &raw.begin {
            self.require_supported(begin)?;
            let end = raw.end.clone().unwrap_or_else(|| NEVER_MATCHES.to_string());
            let end_has_backrefs = has_backreferences(&end);
            // Back-references are filled in per match; check the rest
            let end_template = resolve_backreferences(&end, "", &[]);
            self.require_supported(&end_template)?;

            let id = self.push(Rule::BeginEnd(BeginEndRule {
                name,
                content_name: raw
                    .content_name
                    .as_deref()
                    .map(parse_scope_names)
                    .unwrap_or_default(),
                begin: begin.clone(),
                end: end.clone(),
                begin_captures: convert_captures(raw.begin_captures.as_ref().or(raw.captures.as_ref())),
                end_captures: convert_captures(raw.end_captures.as_ref().or(raw.captures.as_ref())),
                patterns: children,
                apply_end_pattern_last: raw.apply_end_pattern_last.map_or(false, |f| f.as_bool()),
                allow_empty_span: raw.allow_empty_span.unwrap_or(true),
                end_has_backrefs,
                inert: false,
            }));
            let checked = self
                .engine
                .compile(&[begin.as_str()])
                .and_then(|_| self.engine.compile(&[end_template.as_str()]));
            if let Err(error) = checked {
                self.make_inert(id, error);
            }
            return Ok(id);
        }

        Ok(self.push(Rule::Group(GroupRule { patterns: children })))
    }

    fn require_supported(&self, pattern: &str) -> Result<(), GrammarParseError> {
        match self.engine.unsupported_feature(pattern) {
            Some(feature) => Err(GrammarParseError::UnsupportedFeature {
                pattern: pattern.to_string(),
                feature,
            }),
            None => Ok(()),
        }
    }

    fn make_inert(&mut self, id: RuleId, error: PatternCompileError) {
        log::warn!("rule {} is inert: {}", id.0, error);
        match &mut self.rules[id.0] {
            Rule::Match(r) => r.inert = true,
            Rule::BeginEnd(r) => r.inert = true,
            Rule::Include(_) | Rule::Group(_) => {}
        }
        self.diagnostics.push(Diagnostic::PatternCompile { rule: id, error });
    }
}

fn convert_captures(raw: Option<&BTreeMap<String, RawCapture>>) -> Captures {
    let Some(raw) = raw else {
        return Captures::default();
    };
    Captures::from_pairs(raw.iter().filter_map(|(group, capture)| {
        let group = group.parse::<usize>().ok()?;
        let scopes = capture.name.as_deref().map(parse_scope_names)?;
        Some((group, scopes))
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGrammar {
    scope_name: Option<String>,
    name: Option<String>,
    #[serde(default)]
    file_types: Vec<String>,
    patterns: Option<Vec<RawRule>>,
    #[serde(default)]
    repository: BTreeMap<String, RawRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRule {
    include: Option<String>,
    name: Option<String>,
    content_name: Option<String>,
    #[serde(rename = "match")]
    match_: Option<String>,
    begin: Option<String>,
    end: Option<String>,
    captures: Option<BTreeMap<String, RawCapture>>,
    begin_captures: Option<BTreeMap<String, RawCapture>>,
    end_captures: Option<BTreeMap<String, RawCapture>>,
    patterns: Option<Vec<RawRule>>,
    apply_end_pattern_last: Option<Flag>,
    allow_empty_span: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawCapture {
    name: Option<String>,
}

/// Grammar files write flags as `true` or `1`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn as_bool(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}
