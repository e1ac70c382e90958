//! Response-producing actions.
//!
//! An [`Action`] turns a request into a [`Response`] or raises a simulated
//! [`TransportError`]. Decorators (`WithHeader`, `WithStatus`, `WithCookie`)
//! wrap a previously configured action and alter one attribute of the
//! response it produces.

use crate::error::TransportError;
use crate::request::{encode_pairs, Request, FORM_CONTENT_TYPE};
use crate::template::{TemplateContext, TemplateEngine};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

type ResponseFn = Arc<dyn Fn(&Request) -> Result<Response, TransportError> + Send + Sync>;

/// A cookie set by a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Response description produced by an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<Cookie>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Response {
    /// Status-only response. The body is empty, or absent for 204.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            reason: reason_phrase(status).to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: if status == 204 { None } else { Some(Vec::new()) },
            content_type: None,
        }
    }

    pub fn with_body(status: u16, body: Vec<u8>, content_type: &str) -> Self {
        Self {
            status,
            reason: reason_phrase(status).to_string(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            cookies: Vec::new(),
            body: Some(body),
            content_type: Some(content_type.to_string()),
        }
    }

    /// Body decoded as UTF-8 (lossy).
    pub fn text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.value.as_str())
    }
}

/// Standard reason phrase, or empty for unusual codes.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        418 => "I'm a teapot",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// One step of a rule's response sequence.
#[derive(Clone)]
pub enum Action {
    /// Status code with an empty body.
    Status(u16),
    /// Fixed body with a content type.
    Body {
        status: u16,
        body: Vec<u8>,
        content_type: String,
    },
    /// Urlencoded form body.
    Form {
        status: u16,
        pairs: Vec<(String, String)>,
    },
    /// Handlebars body rendered against the request.
    Template {
        status: u16,
        template: String,
        content_type: String,
        engine: Arc<TemplateEngine>,
    },
    /// JSON document whose string fields are rendered as templates.
    JsonTemplate {
        status: u16,
        document: serde_json::Value,
        engine: Arc<TemplateEngine>,
    },
    /// Raise a simulated transport failure.
    Throw(TransportError),
    WithHeader {
        inner: Box<Action>,
        name: String,
        value: String,
    },
    WithStatus {
        inner: Box<Action>,
        status: u16,
    },
    WithCookie {
        inner: Box<Action>,
        name: String,
        value: String,
    },
    Custom(ResponseFn),
}

impl Action {
    pub fn text(status: u16, body: impl Into<String>, content_type: impl Into<String>) -> Self {
        Action::Body {
            status,
            body: body.into().into_bytes(),
            content_type: content_type.into(),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, TransportError> + Send + Sync + 'static,
    {
        Action::Custom(Arc::new(f))
    }

    pub fn with_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        Action::WithHeader {
            inner: Box::new(self),
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn with_status(self, status: u16) -> Self {
        Action::WithStatus {
            inner: Box::new(self),
            status,
        }
    }

    pub fn with_cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        Action::WithCookie {
            inner: Box::new(self),
            name: name.into(),
            value: value.into(),
        }
    }

    /// Produce the response for `request`.
    pub fn execute(&self, request: &Request) -> Result<Response, TransportError> {
        self.respond(request, &HashMap::new())
    }

    /// Produce the response for `request`; templates also see `params`,
    /// the values captured by path templates.
    pub fn respond(
        &self,
        request: &Request,
        params: &HashMap<String, String>,
    ) -> Result<Response, TransportError> {
        match self {
            Action::Status(status) => Ok(Response::status(*status)),
            Action::Body {
                status,
                body,
                content_type,
            } => Ok(Response::with_body(*status, body.clone(), content_type)),
            Action::Form { status, pairs } => Ok(Response::with_body(
                *status,
                encode_pairs(pairs).into_bytes(),
                FORM_CONTENT_TYPE,
            )),
            Action::Template {
                status,
                template,
                content_type,
                engine,
            } => {
                let mut response = Response::with_body(*status, Vec::new(), content_type);
                let ctx = TemplateContext::from_request(request).with_params(params);
                match engine.render(template, &ctx) {
                    Ok(rendered) => response.body = Some(rendered.into_bytes()),
                    Err(e) => warn!(error = %e, "Failed to render response template"),
                }
                Ok(response)
            }
            Action::JsonTemplate {
                status,
                document,
                engine,
            } => {
                let mut response = Response::with_body(*status, Vec::new(), "application/json");
                let ctx = TemplateContext::from_request(request).with_params(params);
                match engine.render_json(document, &ctx) {
                    Ok(rendered) => response.body = Some(rendered.to_string().into_bytes()),
                    Err(e) => warn!(error = %e, "Failed to render JSON response template"),
                }
                Ok(response)
            }
            Action::Throw(error) => Err(error.clone()),
            Action::WithHeader { inner, name, value } => {
                let mut response = inner.respond(request, params)?;
                if name.eq_ignore_ascii_case("content-type") {
                    response.content_type = Some(value.clone());
                    response
                        .headers
                        .retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
                }
                response.headers.push((name.clone(), value.clone()));
                Ok(response)
            }
            Action::WithStatus { inner, status } => {
                let mut response = inner.respond(request, params)?;
                response.status = *status;
                response.reason = reason_phrase(*status).to_string();
                Ok(response)
            }
            Action::WithCookie { inner, name, value } => {
                let mut response = inner.respond(request, params)?;
                response.cookies.push(Cookie {
                    name: name.clone(),
                    value: value.clone(),
                });
                Ok(response)
            }
            Action::Custom(f) => f(request),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Status(status) => f.debug_tuple("Status").field(status).finish(),
            Action::Body {
                status,
                content_type,
                ..
            } => f
                .debug_struct("Body")
                .field("status", status)
                .field("content_type", content_type)
                .finish_non_exhaustive(),
            Action::Form { status, pairs } => f
                .debug_struct("Form")
                .field("status", status)
                .field("pairs", pairs)
                .finish(),
            Action::Template {
                status, template, ..
            } => f
                .debug_struct("Template")
                .field("status", status)
                .field("template", template)
                .finish_non_exhaustive(),
            Action::JsonTemplate {
                status, document, ..
            } => f
                .debug_struct("JsonTemplate")
                .field("status", status)
                .field("document", document)
                .finish_non_exhaustive(),
            Action::Throw(error) => f.debug_tuple("Throw").field(error).finish(),
            Action::WithHeader { inner, name, value } => f
                .debug_struct("WithHeader")
                .field("inner", inner)
                .field("name", name)
                .field("value", value)
                .finish(),
            Action::WithStatus { inner, status } => f
                .debug_struct("WithStatus")
                .field("inner", inner)
                .field("status", status)
                .finish(),
            Action::WithCookie { inner, name, value } => f
                .debug_struct("WithCookie")
                .field("inner", inner)
                .field("name", name)
                .field("value", value)
                .finish(),
            Action::Custom(_) => f.write_str("Custom"),
        }
    }
}
