//! Handlebars rendering for templated response bodies.
//!
//! Templates see the inbound request: `method`, `url`, `scheme`, `host`,
//! `port`, `path`, `reference`, `query.<name>`, `form.<name>`,
//! `headers.<lowercase-name>`, `body` and, when the body parses as JSON,
//! `json`. Values captured by `{name}` path templates are under
//! `params.<name>`.

use crate::request::Request;
use handlebars::{
    handlebars_helper, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
    RenderError,
};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Request view exposed to templates.
#[derive(Debug, Default, Serialize)]
pub struct TemplateContext {
    pub method: String,
    pub url: String,
    pub scheme: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Path template captures.
    pub params: HashMap<String, String>,
    /// First value of each query parameter.
    pub query: HashMap<String, String>,
    /// First value of each form parameter.
    pub form: HashMap<String, String>,
    /// First value of each header, keyed by lowercase name.
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

fn first_values(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (name, value) in pairs {
        map.entry(name).or_insert(value);
    }
    map
}

impl TemplateContext {
    pub fn from_request(request: &Request) -> Self {
        let mut ctx = TemplateContext {
            method: request.method().to_string(),
            url: request.url().to_string(),
            query: first_values(request.query_parameters()),
            form: first_values(request.form_parameters()),
            headers: first_values(
                request
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                    .collect(),
            ),
            body: request.body_text().map(str::to_string),
            json: request
                .body_text()
                .and_then(|body| serde_json::from_str(body).ok()),
            ..TemplateContext::default()
        };
        if let Some(parts) = request.url_parts() {
            ctx.scheme = parts.scheme;
            ctx.host = parts.host;
            ctx.port = u16::try_from(parts.port).ok();
            ctx.path = parts.path;
            ctx.reference = parts.fragment;
        }
        ctx
    }

    pub fn with_params(mut self, params: &HashMap<String, String>) -> Self {
        self.params = params.clone();
        self
    }
}

/// Renders response templates against requests.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

handlebars_helper!(upper: |value: str| value.to_uppercase());
handlebars_helper!(lower: |value: str| value.to_lowercase());

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper));
        handlebars.register_helper("lower", Box::new(lower));
        // Bodies are not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    pub fn render(&self, template: &str, ctx: &TemplateContext) -> Result<String, RenderError> {
        self.handlebars.render_template(template, ctx)
    }

    /// Render every string inside `document` that contains `{{`.
    pub fn render_json(
        &self,
        document: &Value,
        ctx: &TemplateContext,
    ) -> Result<Value, RenderError> {
        self.render_value(document, ctx)
    }

    fn render_value(&self, value: &Value, ctx: &TemplateContext) -> Result<Value, RenderError> {
        Ok(match value {
            Value::String(s) if s.contains("{{") => {
                Value::String(self.handlebars.render_template(s, ctx)?)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.render_value(item, ctx))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(fields) => {
                let mut rendered = serde_json::Map::with_capacity(fields.len());
                for (key, field) in fields {
                    rendered.insert(key.clone(), self.render_value(field, ctx)?);
                }
                Value::Object(rendered)
            }
            other => other.clone(),
        })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn str_param<'a>(h: &'a Helper, index: usize) -> Option<&'a str> {
    h.param(index).and_then(|p| p.value().as_str())
}

/// `{{json text}}` pretty-prints `text` if it is JSON, otherwise echoes it.
fn json_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let text = str_param(h, 0).unwrap_or_default();
    match serde_json::from_str::<Value>(text) {
        Ok(json) => out.write(&serde_json::to_string_pretty(&json).unwrap_or_default())?,
        Err(_) => out.write(text)?,
    }
    Ok(())
}

fn uuid_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    // Version 4, RFC 4122 variant.
    let variant = ['8', '9', 'a', 'b'][rng.gen_range(0..4)];
    out.write(&format!(
        "{}-{}-4{}-{}{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[13..16],
        variant,
        &hex[17..20],
        &hex[20..32]
    ))?;
    Ok(())
}

/// `{{now}}` or `{{now "%Y"}}`, in UTC.
fn now_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let format = str_param(h, 0).unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");
    out.write(&chrono::Utc::now().format(format).to_string())?;
    Ok(())
}

/// `{{random min max}}`, inclusive, defaulting to 0..=100.
fn random_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let min = h.param(0).and_then(|p| p.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|p| p.value().as_i64()).unwrap_or(100);
    let value = if min < max {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    out.write(&value.to_string())?;
    Ok(())
}

/// `{{default value "fallback"}}` writes the fallback for null or empty values.
fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let fallback = str_param(h, 1).unwrap_or_default();
    match h.param(0).map(|p| p.value()) {
        Some(Value::String(s)) if !s.is_empty() => out.write(s)?,
        Some(Value::String(_)) | Some(Value::Null) | None => out.write(fallback)?,
        Some(other) => out.write(&other.to_string())?,
    }
    Ok(())
}
