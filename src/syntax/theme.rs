//! Theme and color palette
//!
//! A theme is read from the editor-theme JSON shape and turned into a
//! palette of distinct colors plus a rule list. Scope stacks resolve to a
//! [`Style`] of palette indices; results are cached per stack because the
//! same stacks recur on nearly every line.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::RwLock;

use serde::Deserialize;

use super::style::{FontStyle, Rgb, Style};
use super::tokens::Scope;
use crate::error::ThemeError;

/// Palette index of the default foreground
pub const DEFAULT_FOREGROUND: u32 = 1;
/// Palette index of the default background
pub const DEFAULT_BACKGROUND: u32 = 2;

const FALLBACK_FOREGROUND: Rgb = Rgb::new(0xD4, 0xD4, 0xD4);
const FALLBACK_BACKGROUND: Rgb = Rgb::new(0x1E, 0x1E, 0x1E);

/// Ordered color table; tokens refer to colors by index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMap {
    colors: Vec<Rgb>,
}

impl ColorMap {
    fn new(foreground: Rgb, background: Rgb) -> Self {
        // Index 0 means "no color" and holds a placeholder
        Self {
            colors: vec![Rgb::default(), foreground, background],
        }
    }

    /// Index for a color, appending it if it is new
    fn intern(&mut self, color: Rgb) -> u32 {
        match self.colors.iter().skip(1).position(|c| *c == color) {
            Some(i) => (i + 1) as u32,
            None => {
                self.colors.push(color);
                (self.colors.len() - 1) as u32
            }
        }
    }

    /// All entries, index 0 included
    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    /// Get the color at a palette index (0 is no color)
    pub fn get(&self, index: u32) -> Option<Rgb> {
        if index == 0 {
            return None;
        }
        self.colors.get(index as usize).copied()
    }

    /// Number of palette entries including the reserved one
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.len() <= 1
    }

    /// CSS rules for each palette index plus the font style classes
    pub fn stylesheet(&self) -> String {
        let mut css = String::new();
        for (index, color) in self.colors.iter().enumerate().skip(1) {
            let _ = writeln!(css, ".mtk{} {{ color: {}; }}", index, color.to_hex());
        }
        css.push_str(".mtki { font-style: italic; }\n");
        css.push_str(".mtkb { font-weight: bold; }\n");
        css.push_str(".mtku { text-decoration: underline; text-underline-position: under; }\n");
        css.push_str(".mtks { text-decoration: line-through; }\n");
        css.push_str(
            ".mtks.mtku { text-decoration: underline line-through; text-underline-position: under; }\n",
        );
        css
    }
}

/// One selector of a theme entry with the attributes it sets
#[derive(Debug, Clone)]
struct ThemeRule {
    /// Scope the selector targets, e.g. `string.quoted`
    target: String,
    /// Ancestor selectors, outermost first
    parents: Vec<String>,
    /// Declaration order across the whole theme
    order: usize,
    foreground: Option<u32>,
    background: Option<u32>,
    font_style: Option<FontStyle>,
}

impl ThemeRule {
    fn matches(&self, scope: &Scope, ancestors: &[Scope]) -> bool {
        if !scope.starts_with_selector(&self.target) {
            return false;
        }
        let mut remaining = ancestors;
        for parent in self.parents.iter().rev() {
            match remaining.iter().rposition(|s| s.starts_with_selector(parent)) {
                Some(i) => remaining = &remaining[..i],
                None => return false,
            }
        }
        true
    }

    fn specificity(&self) -> (usize, usize, usize) {
        (self.target.split('.').count(), self.parents.len(), self.order)
    }
}

/// A loaded color theme
#[derive(Debug)]
pub struct Theme {
    name: Option<String>,
    rules: Vec<ThemeRule>,
    defaults: Style,
    color_map: ColorMap,
    cache: RwLock<HashMap<Vec<Scope>, Style>>,
}

impl Theme {
    /// Parse a theme document
    pub fn load(source: &str) -> Result<Self, ThemeError> {
        let raw: RawTheme = serde_json::from_str(source)?;

        let mut default_fg = None;
        let mut default_bg = None;
        let mut default_font = FontStyle::NONE;
        for entry in raw.settings.iter().filter(|e| e.selectors().is_empty()) {
            if let Some(fg) = &entry.settings.foreground {
                default_fg = Some(fg.parse::<Rgb>()?);
            }
            if let Some(bg) = &entry.settings.background {
                default_bg = Some(bg.parse::<Rgb>()?);
            }
            if let Some(font) = &entry.settings.font_style {
                default_font = FontStyle::parse(font);
            }
        }

        let mut color_map = ColorMap::new(
            default_fg.unwrap_or(FALLBACK_FOREGROUND),
            default_bg.unwrap_or(FALLBACK_BACKGROUND),
        );

        let mut rules = Vec::new();
        for entry in &raw.settings {
            let selectors = entry.selectors();
            if selectors.is_empty() {
                continue;
            }
            let foreground = match &entry.settings.foreground {
                Some(c) => Some(color_map.intern(c.parse()?)),
                None => None,
            };
            let background = match &entry.settings.background {
                Some(c) => Some(color_map.intern(c.parse()?)),
                None => None,
            };
            let font_style = entry.settings.font_style.as_deref().map(FontStyle::parse);

            for selector in selectors {
                let mut parts: Vec<String> = selector.split_whitespace().map(str::to_string).collect();
                let Some(target) = parts.pop() else {
                    continue;
                };
                rules.push(ThemeRule {
                    target,
                    parents: parts,
                    order: rules.len(),
                    foreground,
                    background,
                    font_style,
                });
            }
        }

        log::debug!(
            "loaded theme {} ({} rules, {} colors)",
            raw.name.as_deref().unwrap_or("<unnamed>"),
            rules.len(),
            color_map.len() - 1
        );

        Ok(Self {
            name: raw.name,
            rules,
            defaults: Style {
                fg: DEFAULT_FOREGROUND,
                bg: DEFAULT_BACKGROUND,
                font_style: default_font,
            },
            color_map,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get the theme name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the style used when no rule matches
    pub fn default_style(&self) -> Style {
        self.defaults
    }

    /// Get the palette
    pub fn color_map(&self) -> &ColorMap {
        &self.color_map
    }

    /// Stylesheet for the current palette
    pub fn stylesheet(&self) -> String {
        self.color_map.stylesheet()
    }

    /// Foreground palette index for a scope stack
    pub fn color_index_for(&self, scopes: &[Scope]) -> u32 {
        self.resolve(scopes).fg
    }

    /// Resolve a scope stack (outermost first) to palette indices
    pub fn resolve(&self, scopes: &[Scope]) -> Style {
        if let Ok(cache) = self.cache.read() {
            if let Some(style) = cache.get(scopes) {
                return *style;
            }
        }

        let style = Style {
            fg: self.lookup(scopes, |r| r.foreground).unwrap_or(self.defaults.fg),
            bg: self.lookup(scopes, |r| r.background).unwrap_or(self.defaults.bg),
            font_style: self
                .lookup(scopes, |r| r.font_style)
                .unwrap_or(self.defaults.font_style),
        };

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(scopes.to_vec(), style);
        }
        style
    }

    /// Innermost scope with a rule setting the attribute decides it
    fn lookup<T>(&self, scopes: &[Scope], attribute: impl Fn(&ThemeRule) -> Option<T>) -> Option<T> {
        for depth in (0..scopes.len()).rev() {
            let (ancestors, rest) = scopes.split_at(depth);
            let scope = &rest[0];
            let best = self
                .rules
                .iter()
                .filter(|r| attribute(r).is_some() && r.matches(scope, ancestors))
                .max_by_key(|r| r.specificity());
            if let Some(rule) = best {
                return attribute(rule);
            }
        }
        None
    }

    #[cfg(test)]
    fn cached_stacks(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTheme {
    name: Option<String>,
    #[serde(default, alias = "tokenColors")]
    settings: Vec<RawThemeEntry>,
}

#[derive(Debug, Deserialize)]
struct RawThemeEntry {
    scope: Option<RawScope>,
    #[serde(default)]
    settings: RawThemeSettings,
}

impl RawThemeEntry {
    fn selectors(&self) -> Vec<&str> {
        match &self.scope {
            None => Vec::new(),
            Some(RawScope::One(s)) => split_selectors(s).collect(),
            Some(RawScope::Many(list)) => list.iter().flat_map(|s| split_selectors(s)).collect(),
        }
    }
}

/// `"a, b c"` holds the selectors `a` and `b c`
fn split_selectors(scope: &str) -> impl Iterator<Item = &str> {
    scope.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawScope {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThemeSettings {
    foreground: Option<String>,
    background: Option<String>,
    font_style: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const THEME: &str = r##"{
        "name": "Test Dark",
        "settings": [
            { "settings": { "foreground": "#D4D4D4", "background": "#1E1E1E" } },
            { "scope": "string", "settings": { "foreground": "#CE9178" } },
            { "scope": "string.quoted.single", "settings": { "foreground": "#D16969" } },
            { "scope": "constant.numeric, constant.language", "settings": { "foreground": "#B5CEA8" } },
            { "scope": ["comment"], "settings": { "foreground": "#6A9955", "fontStyle": "italic" } },
            { "scope": "meta.compound string", "settings": { "fontStyle": "bold" } },
            { "scope": "keyword", "settings": { "foreground": "#ce9178" } }
        ]
    }"##;

    fn stack(names: &[&str]) -> Vec<Scope> {
        names.iter().map(|n| Scope::new(n)).collect()
    }

    #[test]
    fn test_palette_layout() {
        let theme = Theme::load(THEME).unwrap();
        let map = theme.color_map();
        assert_eq!(theme.name(), Some("Test Dark"));
        assert_eq!(map.get(0), None);
        assert_eq!(map.get(DEFAULT_FOREGROUND), Some(Rgb::new(0xD4, 0xD4, 0xD4)));
        assert_eq!(map.get(DEFAULT_BACKGROUND), Some(Rgb::new(0x1E, 0x1E, 0x1E)));
        // Distinct colors in declaration order; the repeated one is reused
        let hex: Vec<String> = map.colors()[3..].iter().map(Rgb::to_hex).collect();
        assert_eq!(hex, vec!["#CE9178", "#D16969", "#B5CEA8", "#6A9955"]);
    }

    #[test]
    fn test_more_specific_selector_wins() {
        let theme = Theme::load(THEME).unwrap();
        let double = theme.resolve(&stack(&["source.snbt", "string.quoted.double.snbt"]));
        let single = theme.resolve(&stack(&["source.snbt", "string.quoted.single.snbt"]));
        assert_eq!(double.fg, 3);
        assert_eq!(single.fg, 4);
        assert_eq!(double.bg, DEFAULT_BACKGROUND);
    }

    #[test]
    fn test_innermost_scope_decides() {
        let theme = Theme::load(THEME).unwrap();
        let style = theme.resolve(&stack(&["source.snbt", "string.quoted.double", "constant.numeric"]));
        assert_eq!(style.fg, 5);

        // Nothing matches the innermost scope, so the string rule applies
        let style = theme.resolve(&stack(&["source.snbt", "string.quoted", "punctuation"]));
        assert_eq!(style.fg, 3);

        let plain = theme.resolve(&stack(&["source.snbt"]));
        assert_eq!(plain, theme.default_style());
    }

    #[test]
    fn test_parent_selector_and_font_style() {
        let theme = Theme::load(THEME).unwrap();
        let nested = theme.resolve(&stack(&["source.snbt", "meta.compound.snbt", "string.quoted"]));
        assert!(nested.font_style.contains(FontStyle::BOLD));
        // Attributes resolve independently
        assert_eq!(nested.fg, 3);

        let top = theme.resolve(&stack(&["source.snbt", "string.quoted"]));
        assert!(top.font_style.is_empty());

        let comment = theme.resolve(&stack(&["source.snbt", "comment.line"]));
        assert!(comment.font_style.contains(FontStyle::ITALIC));
    }

    #[test]
    fn test_later_declaration_wins_ties() {
        let first = r##"{ "settings": [
            { "scope": "constant", "settings": { "foreground": "#111111" } },
            { "scope": "constant", "settings": { "foreground": "#222222" } }
        ] }"##;
        let second = r##"{ "settings": [
            { "scope": "constant", "settings": { "foreground": "#222222" } },
            { "scope": "constant", "settings": { "foreground": "#111111" } }
        ] }"##;
        let scopes = stack(&["source.x", "constant.numeric"]);

        let a = Theme::load(first).unwrap();
        let b = Theme::load(second).unwrap();
        let a_color = a.color_map().get(a.color_index_for(&scopes)).unwrap();
        let b_color = b.color_map().get(b.color_index_for(&scopes)).unwrap();
        assert_eq!(a_color, Rgb::new(0x22, 0x22, 0x22));
        assert_eq!(b_color, Rgb::new(0x11, 0x11, 0x11));
    }

    #[test]
    fn test_resolution_is_cached_and_stable() {
        let theme = Theme::load(THEME).unwrap();
        let scopes = stack(&["source.snbt", "constant.language.boolean"]);
        let first = theme.color_index_for(&scopes);
        assert_eq!(theme.cached_stacks(), 1);
        assert_eq!(theme.color_index_for(&scopes), first);
        assert_eq!(theme.cached_stacks(), 1);
    }

    #[test]
    fn test_defaults_without_global_entry() {
        let theme = Theme::load(r#"{ "settings": [] }"#).unwrap();
        assert_eq!(theme.color_map().get(DEFAULT_FOREGROUND), Some(FALLBACK_FOREGROUND));
        assert_eq!(theme.color_map().len(), 3);
    }

    #[test]
    fn test_invalid_color() {
        let err = Theme::load(r#"{ "settings": [ { "scope": "x", "settings": { "foreground": "red" } } ] }"#)
            .unwrap_err();
        assert!(matches!(err, ThemeError::InvalidColor(c) if c == "red"));
        assert!(matches!(Theme::load("[").unwrap_err(), ThemeError::Syntax(_)));
    }

    #[test]
    fn test_stylesheet() {
        let theme = Theme::load(THEME).unwrap();
        let css = theme.stylesheet();
        assert!(css.starts_with(".mtk1 { color: #D4D4D4; }\n.mtk2 { color: #1E1E1E; }\n"));
        assert!(css.contains(".mtk3 { color: #CE9178; }"));
        assert!(!css.contains(".mtk0"));
        assert!(css.contains(".mtki { font-style: italic; }"));
        assert!(css.contains(".mtks.mtku"));
    }
}
