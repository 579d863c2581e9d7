use std::fmt;

use serde::{Deserialize, Serialize};

/// A single `name = value` configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    name: String,
    value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(\"{}\" = \"{}\")", self.name, self.value)
    }
}

/// Ordered list of parameters attached to a robot, a device or an action.
///
/// Names are not required to be unique. Lookups return the first entry
/// with the requested name, so a value pushed later never shadows one
/// that was already present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamList(Vec<Param>);

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, param: Param) {
        self.0.push(param);
    }

    /// Builder-style push.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(Param::new(name, value));
        self
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.0.iter().any(|p| p.name == name)
    }

    pub fn find_param(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.0.iter()
    }
}

impl From<Vec<Param>> for ParamList {
    fn from(params: Vec<Param>) -> Self {
        Self(params)
    }
}

impl FromIterator<Param> for ParamList {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ParamList {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ParamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, param) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

/// Split a list-valued parameter into its items.
///
/// Accepts either a parenthesised list `(left right)` or bare
/// whitespace-separated names. Quotes around items are dropped.
pub fn parse_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(trimmed);

    inner
        .split_whitespace()
        .map(|item| item.trim_matches('"').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_param_first_wins() {
        let params = ParamList::new()
            .with("target", "left_arm")
            .with("target", "right_arm");

        assert!(params.has_param("target"));
        assert_eq!(params.find_param("target"), Some("left_arm"));
        assert_eq!(params.find_param("missing"), None);
    }

    #[test]
    fn test_parse_list_parenthesised() {
        assert_eq!(parse_list("(left right)"), vec!["left", "right"]);
        assert_eq!(parse_list("  ( \"torso\"  head ) "), vec!["torso", "head"]);
    }

    #[test]
    fn test_parse_list_bare() {
        assert_eq!(parse_list("left right"), vec!["left", "right"]);
        assert!(parse_list("()").is_empty());
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_display() {
        let params = ParamList::new().with("a", "1").with("b", "2");
        assert_eq!(params.to_string(), "(\"a\" = \"1\"), (\"b\" = \"2\")");
    }

    #[test]
    fn test_serialization_is_a_plain_list() {
        let params = ParamList::new().with("verbose", "1");
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["name"], "verbose");
    }
}
