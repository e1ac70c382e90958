//! URL condition sets.
//!
//! A [`UrlConditions`] is a composite matcher over scheme, host, port, path,
//! reference (fragment) and query parameters. Partial sets built from
//! separate declarations (host, path, parameters...) are merged with
//! [`UrlConditions::join`].

use crate::debugger::Debugger;
use crate::error::EngineError;
use crate::matcher::{Matcher, MatcherList, NumberMatcher};
use crate::params::{parse_pairs, ParametersMatcher};
use std::collections::HashMap;

/// Port value used when a URL carries no explicit port.
pub const EMPTY_PORT: i64 = -1;

/// Components of a parsed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    pub host: String,
    pub port: i64,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl UrlParts {
    pub fn parse(text: &str) -> Result<Self, url::ParseError> {
        let url = url::Url::parse(text)?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port().map(i64::from).unwrap_or(EMPTY_PORT),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
            fragment: url.fragment().map(str::to_string),
        })
    }
}

/// Composite URL matcher.
///
/// An empty set matches any URL without a reference: scheme, host, path and
/// port are unconstrained, the reference defaults to empty-or-absent and no
/// query parameters are expected.
#[derive(Debug, Clone, Default)]
pub struct UrlConditions {
    scheme: Option<Matcher>,
    reference: Option<Matcher>,
    hosts: MatcherList,
    paths: MatcherList,
    ports: Vec<NumberMatcher>,
    parameters: ParametersMatcher,
    allow_extra_parameters: Option<bool>,
}

impl UrlConditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full condition set described by a URL: scheme, host, port
    /// (or [`EMPTY_PORT`]), path, each query parameter and the reference.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let parts = UrlParts::parse(text).map_err(|source| EngineError::InvalidUrl {
            url: text.to_string(),
            source,
        })?;

        let mut conditions = Self::new();
        conditions.scheme = Some(Matcher::equal_to(parts.scheme));
        conditions.hosts.push(Matcher::equal_to(parts.host));
        conditions.ports.push(NumberMatcher::Equals(parts.port));
        conditions.paths.push(Matcher::equal_to(parts.path));
        conditions.reference = Some(match parts.fragment {
            Some(fragment) => Matcher::Equals(fragment),
            None => Matcher::EmptyOrAbsent,
        });
        if let Some(query) = parts.query {
            for (name, value) in parse_pairs(&query) {
                conditions.parameters.put(name, Matcher::Equals(value));
            }
        }
        Ok(conditions)
    }

    /// Host-only conditions. Accepts a bare host or a URL with a host.
    pub fn for_host(host: &str) -> Result<Self, EngineError> {
        let mut conditions = Self::new();
        if host.contains("://") {
            let parsed = Self::parse(host)?;
            conditions.hosts = parsed.hosts;
        } else {
            conditions.hosts.push(Matcher::equal_to(host));
        }
        Ok(conditions)
    }

    pub fn for_host_matching(matcher: Matcher) -> Self {
        let mut conditions = Self::new();
        conditions.hosts.push(matcher);
        conditions
    }

    pub fn for_path(matcher: Matcher) -> Self {
        let mut conditions = Self::new();
        conditions.paths.push(matcher);
        conditions
    }

    pub fn for_reference(matcher: Matcher) -> Self {
        Self {
            reference: Some(matcher),
            ..Self::default()
        }
    }

    pub fn for_scheme(matcher: Matcher) -> Self {
        Self {
            scheme: Some(matcher),
            ..Self::default()
        }
    }

    pub fn for_port(matcher: NumberMatcher) -> Self {
        Self {
            ports: vec![matcher],
            ..Self::default()
        }
    }

    pub fn for_parameter(name: impl Into<String>, matcher: Matcher) -> Self {
        let mut conditions = Self::new();
        conditions.parameters.put(name, matcher);
        conditions
    }

    pub fn for_extra_parameters(allow: bool) -> Self {
        Self {
            allow_extra_parameters: Some(allow),
            ..Self::default()
        }
    }

    /// Merge `other` into `self`.
    ///
    /// Scalar fields (scheme, reference, extra-parameter flag) declared in
    /// `other` replace those of `self`; host, path and port lists are
    /// concatenated; parameter matchers accumulate per name.
    pub fn join(&mut self, other: &UrlConditions) {
        if let Some(scheme) = &other.scheme {
            self.scheme = Some(scheme.clone());
        }
        if let Some(reference) = &other.reference {
            self.reference = Some(reference.clone());
        }
        if let Some(allow) = other.allow_extra_parameters {
            self.allow_extra_parameters = Some(allow);
        }
        self.hosts.extend(&other.hosts);
        self.paths.extend(&other.paths);
        self.ports.extend(other.ports.iter().cloned());
        self.parameters.merge(&other.parameters);
    }

    pub fn allows_extra_parameters(&self) -> bool {
        self.allow_extra_parameters.unwrap_or(false)
    }

    fn reference_matcher(&self) -> &Matcher {
        self.reference.as_ref().unwrap_or(&Matcher::EmptyOrAbsent)
    }

    /// Match a raw URL. Malformed URLs never match.
    pub fn matches(&self, url: &str) -> bool {
        match UrlParts::parse(url) {
            Ok(parts) => self.matches_parts(&parts),
            Err(_) => false,
        }
    }

    pub fn matches_parts(&self, parts: &UrlParts) -> bool {
        let query = parts.query.as_deref().map(parse_pairs).unwrap_or_default();

        self.scheme
            .as_ref()
            .map_or(true, |m| m.matches(Some(&parts.scheme)))
            && self.hosts.all_match(Some(&parts.host))
            && self.paths.all_match(Some(&parts.path))
            && self.ports.iter().all(|m| m.matches(parts.port))
            && self.reference_matcher().matches(parts.fragment.as_deref())
            && self.parameters.matches(&query, self.allows_extra_parameters())
    }

    /// Placeholder values captured by `{name}` path templates.
    pub fn path_params(&self, url: &str) -> HashMap<String, String> {
        let Ok(parts) = UrlParts::parse(url) else {
            return HashMap::new();
        };
        let mut params = HashMap::new();
        for matcher in self.paths.iter() {
            if let Matcher::Template(template) = matcher {
                if let Some(captured) = template.captures(&parts.path) {
                    params.extend(captured);
                }
            }
        }
        params
    }

    /// Explain each URL sub-condition against `url`.
    pub fn debug(&self, url: &str, debugger: &dyn Debugger) {
        let parts = UrlParts::parse(url).ok();

        if let Some(scheme) = &self.scheme {
            let matched = parts
                .as_ref()
                .map_or(false, |p| scheme.matches(Some(&p.scheme)));
            debugger.message(matched, &format!("scheme is {}", scheme.describe()));
        }
        if !self.hosts.is_empty() {
            let matched = parts
                .as_ref()
                .map_or(false, |p| self.hosts.all_match(Some(&p.host)));
            debugger.message(matched, &format!("host is {}", self.hosts.describe()));
        }
        if !self.paths.is_empty() {
            let matched = parts
                .as_ref()
                .map_or(false, |p| self.paths.all_match(Some(&p.path)));
            debugger.message(matched, &format!("path is {}", self.paths.describe()));
        }
        if !self.ports.is_empty() {
            let matched = parts
                .as_ref()
                .map_or(false, |p| self.ports.iter().all(|m| m.matches(p.port)));
            let described = self
                .ports
                .iter()
                .map(NumberMatcher::describe)
                .collect::<Vec<_>>()
                .join(" and ");
            debugger.message(matched, &format!("port is {}", described));
        }
        if let Some(reference) = &self.reference {
            let matched = parts
                .as_ref()
                .map_or(false, |p| reference.matches(p.fragment.as_deref()));
            debugger.message(matched, &format!("reference is {}", reference.describe()));
        }

        let query = parts
            .as_ref()
            .and_then(|p| p.query.as_deref())
            .map(parse_pairs)
            .unwrap_or_default();
        self.parameters.debug(
            "query parameter",
            &query,
            self.allows_extra_parameters(),
            debugger,
        );
    }
}
