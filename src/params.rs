//! Multi-valued parameter matching for query strings and form bodies.

use crate::debugger::Debugger;
use crate::matcher::{Matcher, MatcherList};
use std::collections::BTreeMap;

/// Decode an urlencoded `a=1&b=2` string into ordered pairs.
pub fn parse_pairs(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_default()
}

/// Expected parameter name -> list of matchers that must all hold.
///
/// Every occurrence of an expected name in the actual pairs must satisfy all
/// matchers registered for that name, and at least one occurrence must exist.
/// Two contradictory matchers on one name make that name unsatisfiable.
#[derive(Debug, Clone, Default)]
pub struct ParametersMatcher {
    matchers: BTreeMap<String, MatcherList>,
}

impl ParametersMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a matcher for `name`; earlier matchers are kept.
    pub fn put(&mut self, name: impl Into<String>, matcher: Matcher) {
        self.matchers.entry(name.into()).or_default().push(matcher);
    }

    pub fn put_all(&mut self, name: &str, matchers: &MatcherList) {
        self.matchers
            .entry(name.to_string())
            .or_default()
            .extend(matchers);
    }

    /// Merge another set key by key.
    pub fn merge(&mut self, other: &ParametersMatcher) {
        for (name, list) in &other.matchers {
            self.put_all(name, list);
        }
    }

    pub fn get(&self, name: &str) -> Option<&MatcherList> {
        self.matchers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.matchers.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Strict or lenient match over actual pairs.
    pub fn matches(&self, actual: &[(String, String)], allow_extra: bool) -> bool {
        (allow_extra || self.redundant(actual).is_empty())
            && self.missing(actual).is_empty()
            && self.all_values_match(actual)
    }

    fn all_values_match(&self, actual: &[(String, String)]) -> bool {
        actual.iter().all(|(name, value)| match self.matchers.get(name) {
            Some(list) => list.all_match(Some(value)),
            None => true,
        })
    }

    /// Actual names that were not expected, deduplicated, in request order.
    pub fn redundant<'a>(&self, actual: &'a [(String, String)]) -> Vec<&'a str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in actual {
            if !self.matchers.contains_key(name) && !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Expected names absent from the actual pairs.
    pub fn missing(&self, actual: &[(String, String)]) -> Vec<&str> {
        self.matchers
            .keys()
            .filter(|name| !actual.iter().any(|(n, _)| n == *name))
            .map(String::as_str)
            .collect()
    }

    /// Emit one trace message per missing, present and unexpected parameter.
    /// `kind` is the prefix in messages ("query parameter", "form parameter").
    pub fn debug(
        &self,
        kind: &str,
        actual: &[(String, String)],
        allow_extra: bool,
        debugger: &dyn Debugger,
    ) {
        for name in self.missing(actual) {
            debugger.message(false, &format!("{} {} is missing from the request", kind, name));
        }

        for (name, value) in actual {
            match self.matchers.get(name) {
                Some(list) => {
                    let matched = list.all_match(Some(value));
                    debugger.message(matched, &format!("{} {} is {}", kind, name, list.describe()));
                }
                None if !allow_extra => {
                    debugger.message(
                        false,
                        &format!("{} {} was not expected to be in the request", kind, name),
                    );
                }
                None => {}
            }
        }
    }
}
