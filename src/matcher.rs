//! Value matchers.
//!
//! A matcher is a side-effect free predicate over a single value paired with a
//! human-readable description. Matchers registered for the same key are
//! ANDed together through [`MatcherList`].

use crate::error::EngineError;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type StrPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type NumberPredicate = Arc<dyn Fn(i64) -> bool + Send + Sync>;

/// Predicate over an optional string value (header, path, body, parameter...).
#[derive(Clone)]
pub enum Matcher {
    /// Matches anything, including an absent value.
    Any,
    /// Matches an absent or empty value.
    EmptyOrAbsent,
    Equals(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Regex(Regex),
    Glob {
        pattern: String,
        glob: globset::GlobMatcher,
    },
    /// Path template such as `/users/{id}`.
    Template(PathTemplate),
    /// Value parses as JSON equal to the expected document.
    Json(serde_json::Value),
    /// JSON path expression resolves to the expected value
    /// (`null` means "resolves to anything").
    JsonPath {
        expression: String,
        expected: serde_json::Value,
    },
    Not(Box<Matcher>),
    Custom {
        description: String,
        predicate: StrPredicate,
    },
}

impl Matcher {
    pub fn equal_to(value: impl Into<String>) -> Self {
        Matcher::Equals(value.into())
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Matcher::Contains(value.into())
    }

    pub fn starts_with(value: impl Into<String>) -> Self {
        Matcher::StartsWith(value.into())
    }

    pub fn ends_with(value: impl Into<String>) -> Self {
        Matcher::EndsWith(value.into())
    }

    /// Compile a regex matcher. The whole value must match.
    pub fn regex(pattern: &str) -> Result<Self, EngineError> {
        let anchored = format!("^(?:{})$", pattern);
        Regex::new(&anchored)
            .map(Matcher::Regex)
            .map_err(|e| EngineError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn glob(pattern: &str) -> Result<Self, EngineError> {
        let glob = globset::Glob::new(pattern).map_err(|e| EngineError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Matcher::Glob {
            pattern: pattern.to_string(),
            glob: glob.compile_matcher(),
        })
    }

    pub fn template(template: &str) -> Self {
        Matcher::Template(PathTemplate::parse(template))
    }

    pub fn json(expected: serde_json::Value) -> Self {
        Matcher::Json(expected)
    }

    pub fn json_path(
        expression: &str,
        expected: serde_json::Value,
    ) -> Result<Self, EngineError> {
        use jsonpath_rust::JsonPath;

        let parsed: Result<JsonPath, _> = JsonPath::try_from(expression);
        if parsed.is_err() {
            return Err(EngineError::InvalidPattern {
                pattern: expression.to_string(),
                reason: "invalid JSON path expression".to_string(),
            });
        }
        Ok(Matcher::JsonPath {
            expression: expression.to_string(),
            expected,
        })
    }

    pub fn not(inner: Matcher) -> Self {
        Matcher::Not(Box::new(inner))
    }

    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Matcher::Custom {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Test a value. Only [`Matcher::Any`], [`Matcher::EmptyOrAbsent`] and
    /// negations accept an absent value.
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::EmptyOrAbsent => value.map_or(true, str::is_empty),
            Matcher::Not(inner) => !inner.matches(value),
            _ => match value {
                Some(v) => self.matches_present(v),
                None => false,
            },
        }
    }

    fn matches_present(&self, value: &str) -> bool {
        match self {
            Matcher::Equals(expected) => value == expected,
            Matcher::Contains(expected) => value.contains(expected.as_str()),
            Matcher::StartsWith(expected) => value.starts_with(expected.as_str()),
            Matcher::EndsWith(expected) => value.ends_with(expected.as_str()),
            Matcher::Regex(regex) => regex.is_match(value),
            Matcher::Glob { glob, .. } => glob.is_match(value),
            Matcher::Template(template) => template.captures(value).is_some(),
            Matcher::Json(expected) => serde_json::from_str::<serde_json::Value>(value)
                .map(|actual| actual == *expected)
                .unwrap_or(false),
            Matcher::JsonPath {
                expression,
                expected,
            } => match serde_json::from_str::<serde_json::Value>(value) {
                Ok(json) => matches_json_path(&json, expression, expected),
                Err(_) => false,
            },
            Matcher::Custom { predicate, .. } => predicate(value),
            Matcher::Any | Matcher::EmptyOrAbsent | Matcher::Not(_) => self.matches(Some(value)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Matcher::Any => "ANYTHING".to_string(),
            Matcher::EmptyOrAbsent => "(null or an empty string)".to_string(),
            Matcher::Equals(v) => format!("{:?}", v),
            Matcher::Contains(v) => format!("a string containing {:?}", v),
            Matcher::StartsWith(v) => format!("a string starting with {:?}", v),
            Matcher::EndsWith(v) => format!("a string ending with {:?}", v),
            Matcher::Regex(regex) => format!("a string matching /{}/", regex.as_str()),
            Matcher::Glob { pattern, .. } => format!("a string matching glob {:?}", pattern),
            Matcher::Template(template) => format!("a path like {:?}", template.source),
            Matcher::Json(expected) => format!("JSON equal to {}", expected),
            Matcher::JsonPath {
                expression,
                expected,
            } => {
                if expected.is_null() {
                    format!("JSON with a value at {}", expression)
                } else {
                    format!("JSON with {} equal to {}", expression, expected)
                }
            }
            Matcher::Not(inner) => format!("not {}", inner.describe()),
            Matcher::Custom { description, .. } => description.clone(),
        }
    }
}

fn matches_json_path(
    json: &serde_json::Value,
    expression: &str,
    expected: &serde_json::Value,
) -> bool {
    use jsonpath_rust::JsonPath;

    let path: JsonPath = match JsonPath::try_from(expression) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let found: serde_json::Value = path.find(json);

    // Results may come back wrapped in an array of hits.
    let single = match &found {
        serde_json::Value::Array(items) if items.len() == 1 && !expected.is_array() => {
            Some(&items[0])
        }
        _ => None,
    };

    if expected.is_null() {
        match &found {
            serde_json::Value::Null => false,
            serde_json::Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    } else {
        found == *expected || single == Some(expected)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matcher({})", self.describe())
    }
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        Matcher::equal_to(value)
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Matcher::Equals(value)
    }
}

/// Ordered list of matchers that must all accept a value.
#[derive(Debug, Clone, Default)]
pub struct MatcherList(Vec<Matcher>);

impl MatcherList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, matcher: Matcher) {
        self.0.push(matcher);
    }

    pub fn extend(&mut self, other: &MatcherList) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Matcher> {
        self.0.iter()
    }

    /// True when every matcher accepts the value (vacuously true when empty).
    pub fn all_match(&self, value: Option<&str>) -> bool {
        self.0.iter().all(|m| m.matches(value))
    }

    pub fn describe(&self) -> String {
        self.0
            .iter()
            .map(Matcher::describe)
            .collect::<Vec<_>>()
            .join(" and ")
    }
}

impl From<Matcher> for MatcherList {
    fn from(matcher: Matcher) -> Self {
        Self(vec![matcher])
    }
}

/// Predicate over an integer: ports and call counts.
#[derive(Clone)]
pub enum NumberMatcher {
    Any,
    Equals(i64),
    AtLeast(i64),
    AtMost(i64),
    Between(i64, i64),
    Custom {
        description: String,
        predicate: NumberPredicate,
    },
}

impl NumberMatcher {
    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(i64) -> bool + Send + Sync + 'static,
    {
        NumberMatcher::Custom {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, value: i64) -> bool {
        match self {
            NumberMatcher::Any => true,
            NumberMatcher::Equals(expected) => value == *expected,
            NumberMatcher::AtLeast(min) => value >= *min,
            NumberMatcher::AtMost(max) => value <= *max,
            NumberMatcher::Between(min, max) => (*min..=*max).contains(&value),
            NumberMatcher::Custom { predicate, .. } => predicate(value),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            NumberMatcher::Any => "ANYTHING".to_string(),
            NumberMatcher::Equals(v) => format!("<{}>", v),
            NumberMatcher::AtLeast(v) => format!("a value greater than or equal to <{}>", v),
            NumberMatcher::AtMost(v) => format!("a value less than or equal to <{}>", v),
            NumberMatcher::Between(min, max) => {
                format!("a value between <{}> and <{}>", min, max)
            }
            NumberMatcher::Custom { description, .. } => description.clone(),
        }
    }
}

impl fmt::Display for NumberMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for NumberMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NumberMatcher({})", self.describe())
    }
}

/// Path template with `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    source: String,
    segments: Vec<TemplateSegment>,
}

#[derive(Debug, Clone)]
enum TemplateSegment {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut in_param = false;
        let mut param_name = String::new();

        for ch in template.chars() {
            if ch == '{' && !in_param {
                if !current.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut current)));
                }
                in_param = true;
                param_name.clear();
            } else if ch == '}' && in_param {
                segments.push(TemplateSegment::Param(std::mem::take(&mut param_name)));
                in_param = false;
            } else if in_param {
                param_name.push(ch);
            } else {
                current.push(ch);
            }
        }

        if !current.is_empty() {
            segments.push(TemplateSegment::Literal(current));
        }

        Self {
            source: template.to_string(),
            segments,
        }
    }

    /// Match a path, returning the captured placeholder values.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut remaining = path;

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                TemplateSegment::Literal(lit) => {
                    remaining = remaining.strip_prefix(lit.as_str())?;
                }
                TemplateSegment::Param(name) => {
                    // A placeholder never spans a '/'; it ends at the next literal.
                    let segment_end = remaining.find('/').unwrap_or(remaining.len());
                    let end_pos = match self.segments.get(i + 1) {
                        Some(TemplateSegment::Literal(next_lit)) => remaining[..segment_end]
                            .find(next_lit.as_str())
                            .unwrap_or(segment_end),
                        _ => segment_end,
                    };

                    if end_pos == 0 {
                        return None;
                    }

                    params.insert(name.clone(), remaining[..end_pos].to_string());
                    remaining = &remaining[end_pos..];
                }
            }
        }

        // Must consume entire path
        if remaining.is_empty() {
            Some(params)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_matchers() {
        assert!(Matcher::equal_to("bar").matches(Some("bar")));
        assert!(!Matcher::equal_to("bar").matches(Some("baz")));
        assert!(!Matcher::equal_to("bar").matches(None));
        assert!(Matcher::contains("oo").matches(Some("foo")));
        assert!(Matcher::starts_with("a").matches(Some("abc")));
        assert!(Matcher::ends_with("c").matches(Some("abc")));
        assert!(!Matcher::ends_with("a").matches(Some("abc")));
    }

    #[test]
    fn test_any_and_empty() {
        assert!(Matcher::Any.matches(None));
        assert!(Matcher::Any.matches(Some("x")));
        assert!(Matcher::EmptyOrAbsent.matches(None));
        assert!(Matcher::EmptyOrAbsent.matches(Some("")));
        assert!(!Matcher::EmptyOrAbsent.matches(Some("ref")));
    }

    #[test]
    fn test_regex_is_anchored() {
        let m = Matcher::regex("[0-9]+").unwrap();
        assert!(m.matches(Some("123")));
        assert!(!m.matches(Some("a123")));
        assert!(Matcher::regex("(").is_err());
    }

    #[test]
    fn test_glob() {
        let m = Matcher::glob("/api/*/items").unwrap();
        assert!(m.matches(Some("/api/v1/items")));
        assert!(!m.matches(Some("/other")));
    }

    #[test]
    fn test_template_path_matching() {
        let template = PathTemplate::parse("/users/{id}");
        let params = template.captures("/users/123").unwrap();
        assert_eq!(params.get("id"), Some(&"123".to_string()));
        assert!(template.captures("/users/").is_none());
        assert!(template.captures("/users/1/posts").is_none());

        let nested = PathTemplate::parse("/users/{id}/posts/{post}");
        let params = nested.captures("/users/7/posts/9").unwrap();
        assert_eq!(params.get("post"), Some(&"9".to_string()));
    }

    #[test]
    fn test_json_matchers() {
        let m = Matcher::json(serde_json::json!({"foo": "bar"}));
        assert!(m.matches(Some(r#"{"foo" : "bar" }"#)));
        assert!(!m.matches(Some(r#"{"foo" : "quax" }"#)));
        assert!(!m.matches(Some("not json")));

        let m = Matcher::json_path("$.foo", serde_json::json!("bar")).unwrap();
        assert!(m.matches(Some(r#"{"foo": "bar", "other": 1}"#)));
        assert!(!m.matches(Some(r#"{"foo": "quax"}"#)));
    }

    #[test]
    fn test_not_and_custom() {
        let m = Matcher::not(Matcher::equal_to("x"));
        assert!(m.matches(Some("y")));
        assert!(m.matches(None));
        assert!(!m.matches(Some("x")));

        let even = Matcher::custom("an even length", |v| v.len() % 2 == 0);
        assert!(even.matches(Some("ab")));
        assert_eq!(even.describe(), "an even length");
    }

    #[test]
    fn test_descriptions() {
        let mut list = MatcherList::new();
        list.push(Matcher::starts_with("a"));
        list.push(Matcher::ends_with("b"));
        assert_eq!(
            list.describe(),
            "a string starting with \"a\" and a string ending with \"b\""
        );
        assert_eq!(Matcher::equal_to("bar").describe(), "\"bar\"");
        assert_eq!(NumberMatcher::Equals(8080).describe(), "<8080>");
    }

    #[test]
    fn test_matcher_list_ands() {
        let mut list = MatcherList::new();
        assert!(list.all_match(Some("anything")));
        list.push(Matcher::starts_with("a"));
        list.push(Matcher::ends_with("b"));
        assert!(list.all_match(Some("aab")));
        assert!(!list.all_match(Some("aa")));
    }

    #[test]
    fn test_number_matchers() {
        assert!(NumberMatcher::Equals(-1).matches(-1));
        assert!(NumberMatcher::AtLeast(2).matches(3));
        assert!(!NumberMatcher::AtMost(2).matches(3));
        assert!(NumberMatcher::Between(1, 3).matches(3));
        assert!(NumberMatcher::custom("odd", |v| v % 2 == 1).matches(5));
    }
}
