//! Language declarations for the editor surface
//!
//! Pure data: the language entry the surface registers and the bracket,
//! comment and auto-closing configuration it applies on its own.

use serde::{Deserialize, Serialize};

/// A language the editor surface should know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDefinition {
    /// Language id (e.g., "snbt")
    pub id: String,
    /// File extensions without the dot
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Display names
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl LanguageDefinition {
    /// Create a new language definition
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            extensions: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Add a file extension
    pub fn add_extension(&mut self, ext: &str) {
        let ext = ext.trim_start_matches('.').to_lowercase();
        if !ext.is_empty() && !self.extensions.contains(&ext) {
            self.extensions.push(ext);
        }
    }

    /// Add an alias
    pub fn add_alias(&mut self, alias: &str) {
        if !self.aliases.iter().any(|a| a == alias) {
            self.aliases.push(alias.to_string());
        }
    }

    /// Whether a file name has one of this language's extensions
    pub fn matches_file(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .map_or(false, |ext| self.extensions.contains(&ext))
    }
}

/// Comment delimiters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRule {
    pub line_comment: Option<String>,
    pub block_comment: Option<(String, String)>,
}

/// A pair the editor closes automatically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoClosingPair {
    pub open: String,
    pub close: String,
    /// Token classes in which the pair is not closed (e.g. "string")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_in: Vec<String>,
}

impl AutoClosingPair {
    /// Create a new auto-closing pair
    pub fn new(open: &str, close: &str) -> Self {
        Self {
            open: open.to_string(),
            close: close.to_string(),
            not_in: Vec::new(),
        }
    }

    /// Builder: do not auto-close inside `token_class`
    pub fn not_in(mut self, token_class: &str) -> Self {
        self.not_in.push(token_class.to_string());
        self
    }
}

/// Bracket matching and auto-closing behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<CommentRule>,
    #[serde(default)]
    pub brackets: Vec<(String, String)>,
    #[serde(default)]
    pub auto_closing_pairs: Vec<AutoClosingPair>,
    #[serde(default)]
    pub surrounding_pairs: Vec<AutoClosingPair>,
}

impl LanguageConfiguration {
    /// Configuration for SNBT: no comments, three bracket kinds, two quotes
    pub fn snbt() -> Self {
        let brackets = [("{", "}"), ("[", "]"), ("(", ")")];
        let quotes = [("\"", "\""), ("'", "'")];

        Self {
            comments: None,
            brackets: brackets
                .iter()
                .map(|(o, c)| (o.to_string(), c.to_string()))
                .collect(),
            auto_closing_pairs: brackets
                .iter()
                .map(|(o, c)| AutoClosingPair::new(o, c))
                .chain(quotes.iter().map(|(o, c)| AutoClosingPair::new(o, c).not_in("string")))
                .collect(),
            surrounding_pairs: brackets
                .iter()
                .chain(quotes.iter())
                .map(|(o, c)| AutoClosingPair::new(o, c))
                .collect(),
        }
    }

    /// Closing bracket for an opening one
    pub fn closing_bracket(&self, open: &str) -> Option<&str> {
        self.brackets
            .iter()
            .find(|(o, _)| o == open)
            .map(|(_, c)| c.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snbt_configuration() {
        let conf = LanguageConfiguration::snbt();
        assert!(conf.comments.is_none());
        assert_eq!(conf.brackets.len(), 3);
        assert_eq!(conf.closing_bracket("["), Some("]"));
        assert_eq!(conf.closing_bracket("<"), None);
        assert_eq!(conf.auto_closing_pairs.len(), 5);
        assert_eq!(conf.surrounding_pairs.len(), 5);

        let quote = conf.auto_closing_pairs.iter().find(|p| p.open == "'").unwrap();
        assert_eq!(quote.not_in, vec!["string".to_string()]);
    }

    #[test]
    fn test_configuration_json_shape() {
        let json = serde_json::to_value(LanguageConfiguration::snbt()).unwrap();
        assert!(json.get("comments").is_none());
        assert_eq!(json["brackets"][0], serde_json::json!(["{", "}"]));
        assert_eq!(json["autoClosingPairs"][3]["notIn"], serde_json::json!(["string"]));
        assert!(json["autoClosingPairs"][0].get("notIn").is_none());

        let back: LanguageConfiguration = serde_json::from_value(json).unwrap();
        assert_eq!(back, LanguageConfiguration::snbt());
    }

    #[test]
    fn test_extensions() {
        let mut lang = LanguageDefinition::new("snbt");
        lang.add_extension(".SNBT");
        lang.add_extension("snbt");
        lang.add_alias("SNBT");
        assert_eq!(lang.extensions, vec!["snbt".to_string()]);
        assert!(lang.matches_file("level.snbt"));
        assert!(!lang.matches_file("level.nbt"));
        assert!(!lang.matches_file("snbt"));
    }
}
