//! Request conditions other than the URL.

use crate::debugger::Debugger;
use crate::matcher::Matcher;
use crate::params::ParametersMatcher;
use crate::request::Request;
use std::fmt;
use std::sync::Arc;

type RequestPredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Predicate over a whole request.
#[derive(Clone)]
pub enum Condition {
    /// HTTP method, compared case-insensitively.
    Method(String),
    /// First header with this name (case-insensitive) satisfies the matcher.
    Header { name: String, matcher: Matcher },
    /// UTF-8 body satisfies the matcher. A missing body never matches.
    Body(Matcher),
    /// Urlencoded form body parameters.
    Form {
        parameters: ParametersMatcher,
        allow_extra: bool,
    },
    Custom {
        description: String,
        predicate: RequestPredicate,
    },
}

impl Condition {
    pub fn method(method: impl Into<String>) -> Self {
        Condition::Method(method.into())
    }

    pub fn header(name: impl Into<String>, matcher: impl Into<Matcher>) -> Self {
        Condition::Header {
            name: name.into(),
            matcher: matcher.into(),
        }
    }

    pub fn body(matcher: impl Into<Matcher>) -> Self {
        Condition::Body(matcher.into())
    }

    pub fn custom<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        Condition::Custom {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Condition::Method(method) => request.method().eq_ignore_ascii_case(method),
            Condition::Header { name, matcher } => match request.header(name) {
                Some(value) => matcher.matches(Some(value)),
                None => false,
            },
            Condition::Body(matcher) => match request.body_text() {
                Some(body) => matcher.matches(Some(body)),
                None => false,
            },
            Condition::Form {
                parameters,
                allow_extra,
            } => parameters.matches(&request.form_parameters(), *allow_extra),
            Condition::Custom { predicate, .. } => predicate(request),
        }
    }

    pub fn debug(&self, request: &Request, debugger: &dyn Debugger) {
        match self {
            Condition::Method(method) => {
                debugger.message(self.matches(request), &format!("HTTP method is {}", method));
            }
            Condition::Header { name, matcher } => {
                debugger.message(
                    self.matches(request),
                    &format!("header {} is {}", name, matcher.describe()),
                );
            }
            Condition::Body(matcher) => {
                debugger.message(
                    self.matches(request),
                    &format!("body matches {}", matcher.describe()),
                );
            }
            Condition::Form {
                parameters,
                allow_extra,
            } => {
                parameters.debug(
                    "form parameter",
                    &request.form_parameters(),
                    *allow_extra,
                    debugger,
                );
            }
            Condition::Custom { description, .. } => {
                debugger.message(self.matches(request), description);
            }
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Method(method) => f.debug_tuple("Method").field(method).finish(),
            Condition::Header { name, matcher } => f
                .debug_struct("Header")
                .field("name", name)
                .field("matcher", matcher)
                .finish(),
            Condition::Body(matcher) => f.debug_tuple("Body").field(matcher).finish(),
            Condition::Form {
                parameters,
                allow_extra,
            } => f
                .debug_struct("Form")
                .field("parameters", parameters)
                .field("allow_extra", allow_extra)
                .finish(),
            Condition::Custom { description, .. } => {
                f.debug_tuple("Custom").field(description).finish()
            }
        }
    }
}
