//! Engine settings and declarative stub files.
//!
//! Stubs can be declared in YAML instead of through the fluent API:
//!
//! ```yaml
//! settings:
//!   default_host: http://localhost
//! stubs:
//!   - id: login
//!     request:
//!       method: POST
//!       url: /login
//!       form:
//!         username: john
//!     responses:
//!       - status: 200
//!         body:
//!           type: json
//!           content: { token: abc }
//!       - error:
//!           kind: timeout
//!           message: read timed out
//! ```

use crate::action::Action;
use crate::error::{EngineError, TransportError, TransportErrorKind};
use crate::matcher::Matcher;
use crate::template::TemplateEngine;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// When the debugger explains a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebugMode {
    Off,
    /// Only requests answered by the 404 fallback rule.
    #[default]
    Unmatched,
    Always,
}

/// Engine-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    /// Prefix for registration URLs starting with `/`.
    #[serde(default)]
    pub default_host: String,

    #[serde(default)]
    pub debug: DebugMode,

    /// Accept undeclared query parameters unless a rule says otherwise.
    #[serde(default)]
    pub allow_extra_parameters: bool,

    /// Accept undeclared form parameters unless a rule says otherwise.
    #[serde(default)]
    pub allow_extra_form_parameters: bool,

    #[serde(default = "default_true")]
    pub log_matches: bool,

    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Content type of text responses that do not declare one.
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_host: String::new(),
            debug: DebugMode::default(),
            allow_extra_parameters: false,
            allow_extra_form_parameters: false,
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

/// A settings block plus stubs, as read from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    #[serde(default)]
    pub settings: EngineSettings,

    #[serde(default)]
    pub stubs: Vec<StubDefinition>,
}

impl MockConfig {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse stub configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid stub file {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, stub) in self.stubs.iter().enumerate() {
            stub.validate()
                .with_context(|| format!("Stub {} ({})", i, stub.id))?;
        }
        Ok(())
    }
}

/// One declarative rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDefinition {
    pub id: String,

    #[serde(default)]
    pub request: RequestDefinition,

    /// Answered in order; the last one repeats.
    pub responses: Vec<ResponseDefinition>,
}

impl StubDefinition {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("Stub id cannot be empty");
        }
        if self.responses.is_empty() {
            anyhow::bail!("Stub needs at least one response");
        }
        self.request.validate()?;
        for response in &self.responses {
            response.validate()?;
        }
        Ok(())
    }
}

/// A string matcher: a bare string means equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueMatcher {
    Exact(String),
    Rule(MatcherRule),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatcherRule {
    Exact { value: String },
    Prefix { value: String },
    Suffix { value: String },
    Contains { value: String },
    Regex { pattern: String },
    Glob { pattern: String },
    /// Path with placeholders, e.g. `/users/{id}`.
    Template { template: String },
    Json { value: serde_json::Value },
    JsonPath {
        expression: String,
        value: serde_json::Value,
    },
    Any,
    Absent,
    Not { matcher: Box<ValueMatcher> },
}

impl ValueMatcher {
    pub fn to_matcher(&self) -> Result<Matcher, EngineError> {
        let rule = match self {
            ValueMatcher::Exact(value) => return Ok(Matcher::equal_to(value.as_str())),
            ValueMatcher::Rule(rule) => rule,
        };
        Ok(match rule {
            MatcherRule::Exact { value } => Matcher::equal_to(value.as_str()),
            MatcherRule::Prefix { value } => Matcher::starts_with(value.as_str()),
            MatcherRule::Suffix { value } => Matcher::ends_with(value.as_str()),
            MatcherRule::Contains { value } => Matcher::contains(value.as_str()),
            MatcherRule::Regex { pattern } => Matcher::regex(pattern)?,
            MatcherRule::Glob { pattern } => Matcher::glob(pattern)?,
            MatcherRule::Template { template } => Matcher::template(template),
            MatcherRule::Json { value } => Matcher::json(value.clone()),
            MatcherRule::JsonPath { expression, value } => {
                Matcher::json_path(expression, value.clone())?
            }
            MatcherRule::Any => Matcher::Any,
            MatcherRule::Absent => Matcher::EmptyOrAbsent,
            MatcherRule::Not { matcher } => Matcher::not(matcher.to_matcher()?),
        })
    }
}

/// Request side of a stub. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestDefinition {
    /// Any method when absent.
    #[serde(default)]
    pub method: Option<String>,

    /// Full or host-relative URL; any URL when absent.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub path: Option<ValueMatcher>,

    #[serde(default)]
    pub reference: Option<ValueMatcher>,

    #[serde(default)]
    pub headers: HashMap<String, ValueMatcher>,

    #[serde(default)]
    pub query: HashMap<String, ValueMatcher>,

    #[serde(default)]
    pub form: HashMap<String, ValueMatcher>,

    #[serde(default)]
    pub body: Option<ValueMatcher>,

    #[serde(default)]
    pub extra_parameters: Option<bool>,

    #[serde(default)]
    pub extra_form_parameters: Option<bool>,
}

impl RequestDefinition {
    pub fn validate(&self) -> anyhow::Result<()> {
        let matchers = self
            .path
            .iter()
            .chain(self.reference.iter())
            .chain(self.body.iter())
            .chain(self.headers.values())
            .chain(self.query.values())
            .chain(self.form.values());
        for matcher in matchers {
            matcher.to_matcher()?;
        }
        Ok(())
    }
}

/// Response side of a stub: either a response or a transport error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    #[serde(default = "default_status")]
    pub status: u16,

    /// Applied in name order.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Render text and JSON bodies with Handlebars.
    #[serde(default)]
    pub template: bool,

    #[serde(default)]
    pub error: Option<ErrorDefinition>,
}

fn default_status() -> u16 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorDefinition {
    pub kind: TransportErrorKind,
    #[serde(default)]
    pub message: String,
}

impl ResponseDefinition {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(100..=599).contains(&self.status) {
            return Err(EngineError::InvalidStatus(self.status).into());
        }
        if let Some(ResponseBody::Base64 { content }) = &self.body {
            decode_base64(content)?;
        }
        Ok(())
    }

    /// Build the action for this response, headers and cookies included.
    pub fn to_action(
        &self,
        default_content_type: &str,
        templates: &Arc<TemplateEngine>,
    ) -> anyhow::Result<Action> {
        if let Some(error) = &self.error {
            return Ok(Action::Throw(TransportError::new(
                error.kind,
                error.message.clone(),
            )));
        }

        let status = self.status;
        let mut action = match &self.body {
            None => Action::Status(status),
            Some(ResponseBody::Text { content }) if self.template => Action::Template {
                status,
                template: content.clone(),
                content_type: default_content_type.to_string(),
                engine: Arc::clone(templates),
            },
            Some(ResponseBody::Text { content }) => {
                Action::text(status, content.clone(), default_content_type)
            }
            Some(ResponseBody::Json { content }) if self.template => Action::JsonTemplate {
                status,
                document: content.clone(),
                engine: Arc::clone(templates),
            },
            Some(ResponseBody::Json { content }) => Action::Body {
                status,
                body: serde_json::to_vec(content)?,
                content_type: "application/json".to_string(),
            },
            Some(ResponseBody::Base64 { content }) => Action::Body {
                status,
                body: decode_base64(content)?,
                content_type: "application/octet-stream".to_string(),
            },
            Some(ResponseBody::Form { content }) => Action::Form {
                status,
                pairs: content.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            },
        };

        for (name, value) in &self.headers {
            action = action.with_header(name.clone(), value.clone());
        }
        for (name, value) in &self.cookies {
            action = action.with_cookie(name.clone(), value.clone());
        }
        Ok(action)
    }
}

fn decode_base64(content: &str) -> anyhow::Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(content)
        .context("Invalid base64 body")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    Text { content: String },
    Json { content: serde_json::Value },
    /// Binary body, base64 encoded.
    Base64 { content: String },
    /// Urlencoded form; pairs are emitted in declaration order.
    Form { content: Vec<(String, String)> },
}
