//! Normalized inbound request.

use crate::params::parse_pairs;
use crate::url_conditions::UrlParts;
use serde::Serialize;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A request issued against the engine.
///
/// Created once per call and kept in the request log afterwards. The URL is
/// stored raw; a URL that does not parse simply matches no URL condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new("PUT", url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url)
    }

    /// Append a header. Repeated names are kept in order.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json(self, json: &serde_json::Value) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(json.to_string())
    }

    /// Set an urlencoded form body and its content type.
    pub fn with_form<K, V>(self, pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = encode_pairs(pairs);
        self.with_header("Content-Type", FORM_CONTENT_TYPE)
            .with_body(encoded)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Body as UTF-8 text, if present and valid.
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn url_parts(&self) -> Option<UrlParts> {
        UrlParts::parse(&self.url).ok()
    }

    /// Decoded query parameters in request order.
    pub fn query_parameters(&self) -> Vec<(String, String)> {
        self.url_parts()
            .and_then(|parts| parts.query)
            .map(|q| parse_pairs(&q))
            .unwrap_or_default()
    }

    /// Decoded form parameters. Empty unless the body is urlencoded.
    pub fn form_parameters(&self) -> Vec<(String, String)> {
        let is_form = self
            .content_type()
            .map(|ct| ct.to_ascii_lowercase().contains(FORM_CONTENT_TYPE))
            .unwrap_or(false);
        if !is_form {
            return Vec::new();
        }
        self.body_text().map(parse_pairs).unwrap_or_default()
    }
}

pub(crate) fn encode_pairs<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let pairs: Vec<(&str, &str)> = pairs
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();
    serde_urlencoded::to_string(pairs).unwrap_or_default()
}
