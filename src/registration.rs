//! Fluent rule registration.
//!
//! ```ignore
//! engine
//!     .on_get("http://localhost/login")?
//!     .with_parameter("user", "john")
//!     .do_return("ok")
//!     .with_status(201);
//! ```
//!
//! Each statement stages its rule when the registration handle is dropped.
//! A handle kept in a variable stays invisible until it is dropped or
//! [`register`](ResponseRegistration::register)ed.
//!
//! Status codes are taken as given, including ones outside `100..=599`.
//! Declarative stubs are validated instead.

use crate::action::Action;
use crate::condition::Condition;
use crate::engine::MockEngine;
use crate::error::TransportError;
use crate::matcher::{Matcher, NumberMatcher};
use crate::registry::Ticket;
use crate::request::Request;
use crate::rule::RuleBuilder;
use crate::url_conditions::UrlConditions;
use std::sync::Arc;
use tracing::warn;

/// Condition vocabulary shared by registration and verification.
pub trait Conditions: Sized {
    #[doc(hidden)]
    fn rule_builder(&mut self) -> &mut RuleBuilder;

    fn with(mut self, condition: Condition) -> Self {
        self.rule_builder().add_condition(condition);
        self
    }

    fn with_custom<F>(self, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.with(Condition::custom(description, predicate))
    }

    fn with_header(self, name: impl Into<String>, value: &str) -> Self {
        self.with(Condition::header(name, Matcher::equal_to(value)))
    }

    fn with_header_matching(self, name: impl Into<String>, matcher: Matcher) -> Self {
        self.with(Condition::header(name, matcher))
    }

    fn with_body(self, matcher: impl Into<Matcher>) -> Self {
        self.with(Condition::body(matcher))
    }

    fn with_url_conditions(mut self, conditions: &UrlConditions) -> Self {
        self.rule_builder().add_url_conditions(conditions);
        self
    }

    /// Bare host (`localhost`) or a URL whose host is taken.
    fn with_host(self, host: &str) -> Self {
        let conditions = match UrlConditions::for_host(host) {
            Ok(conditions) => conditions,
            Err(e) => {
                warn!(host = %host, error = %e, "Host is not a valid URL, matching it literally");
                UrlConditions::for_host_matching(Matcher::equal_to(host))
            }
        };
        self.with_url_conditions(&conditions)
    }

    fn with_scheme(self, scheme: &str) -> Self {
        self.with_url_conditions(&UrlConditions::for_scheme(Matcher::equal_to(scheme)))
    }

    fn with_port(self, matcher: NumberMatcher) -> Self {
        self.with_url_conditions(&UrlConditions::for_port(matcher))
    }

    fn with_path(self, path: &str) -> Self {
        self.with_path_matching(Matcher::equal_to(path))
    }

    fn with_path_matching(self, matcher: Matcher) -> Self {
        self.with_url_conditions(&UrlConditions::for_path(matcher))
    }

    fn with_reference(self, reference: &str) -> Self {
        self.with_reference_matching(Matcher::equal_to(reference))
    }

    fn with_reference_matching(self, matcher: Matcher) -> Self {
        self.with_url_conditions(&UrlConditions::for_reference(matcher))
    }

    fn with_parameter(self, name: impl Into<String>, value: &str) -> Self {
        self.with_parameter_matching(name, Matcher::equal_to(value))
    }

    fn with_parameter_matching(self, name: impl Into<String>, matcher: Matcher) -> Self {
        self.with_url_conditions(&UrlConditions::for_parameter(name, matcher))
    }

    fn with_extra_parameters(self) -> Self {
        self.with_url_conditions(&UrlConditions::for_extra_parameters(true))
    }

    fn without_extra_parameters(self) -> Self {
        self.with_url_conditions(&UrlConditions::for_extra_parameters(false))
    }

    fn with_form_parameter(self, name: impl Into<String>, value: &str) -> Self {
        self.with_form_parameter_matching(name, Matcher::equal_to(value))
    }

    fn with_form_parameter_matching(mut self, name: impl Into<String>, matcher: Matcher) -> Self {
        self.rule_builder().add_form_parameter(name, matcher);
        self
    }

    fn with_extra_form_parameters(mut self) -> Self {
        self.rule_builder().set_extra_form_parameters(true);
        self
    }

    fn without_extra_form_parameters(mut self) -> Self {
        self.rule_builder().set_extra_form_parameters(false);
        self
    }
}

/// Condition stage of a registration.
///
/// Dropping the handle stages the rule; it becomes visible on the next
/// request. Rules are ordered by handle creation. A handle still alive when
/// the engine is reset is discarded.
pub struct RuleRegistration<'a> {
    engine: &'a MockEngine,
    ticket: Ticket,
    builder: RuleBuilder,
}

impl<'a> RuleRegistration<'a> {
    pub(crate) fn new(engine: &'a MockEngine, builder: RuleBuilder) -> Self {
        Self {
            engine,
            ticket: engine.registry().reserve(),
            builder,
        }
    }

    fn respond(mut self, action: Action) -> ResponseRegistration<'a> {
        self.builder.add_action(action);
        ResponseRegistration { registration: self }
    }

    fn content_type(&self) -> String {
        self.engine.settings().default_content_type.clone()
    }

    /// 200 with a text body and the default content type.
    pub fn do_return(self, body: impl Into<String>) -> ResponseRegistration<'a> {
        self.do_return_with_status(200, body)
    }

    pub fn do_return_with_status(
        self,
        status: u16,
        body: impl Into<String>,
    ) -> ResponseRegistration<'a> {
        let content_type = self.content_type();
        self.respond(Action::text(status, body, content_type))
    }

    /// Status only, empty body.
    pub fn do_return_status(self, status: u16) -> ResponseRegistration<'a> {
        self.respond(Action::Status(status))
    }

    pub fn do_return_json(self, body: impl Into<String>) -> ResponseRegistration<'a> {
        self.respond(Action::text(200, body, "application/json"))
    }

    pub fn do_return_xml(self, body: impl Into<String>) -> ResponseRegistration<'a> {
        self.respond(Action::text(200, body, "application/xml"))
    }

    pub fn do_return_form<K, V>(self, pairs: &[(K, V)]) -> ResponseRegistration<'a>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs = pairs
            .iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        self.respond(Action::Form { status: 200, pairs })
    }

    /// Handlebars body rendered against each matching request.
    pub fn do_return_template(self, template: impl Into<String>) -> ResponseRegistration<'a> {
        let action = Action::Template {
            status: 200,
            template: template.into(),
            content_type: self.content_type(),
            engine: Arc::clone(self.engine.templates()),
        };
        self.respond(action)
    }

    /// Fail the request with a simulated transport error.
    pub fn do_throw(self, error: TransportError) -> ResponseRegistration<'a> {
        self.respond(Action::Throw(error))
    }

    pub fn do_action(self, action: Action) -> ResponseRegistration<'a> {
        self.respond(action)
    }

    /// Stage the rule now. Without actions it answers 404.
    pub fn register(self) {
        drop(self);
    }
}

impl Conditions for RuleRegistration<'_> {
    fn rule_builder(&mut self) -> &mut RuleBuilder {
        &mut self.builder
    }
}

impl Drop for RuleRegistration<'_> {
    fn drop(&mut self) {
        let builder = std::mem::take(&mut self.builder);
        self.engine.registry().stage(self.ticket, builder);
    }
}

/// Action stage of a registration: decorate the last action or append more.
pub struct ResponseRegistration<'a> {
    registration: RuleRegistration<'a>,
}

impl<'a> ResponseRegistration<'a> {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.registration
            .builder
            .decorate_last_action(|action| action.with_header(name, value));
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.registration
            .builder
            .decorate_last_action(|action| action.with_status(status));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.registration
            .builder
            .decorate_last_action(|action| action.with_cookie(name, value));
        self
    }

    pub fn do_return(self, body: impl Into<String>) -> Self {
        self.registration.do_return(body)
    }

    pub fn do_return_with_status(self, status: u16, body: impl Into<String>) -> Self {
        self.registration.do_return_with_status(status, body)
    }

    pub fn do_return_status(self, status: u16) -> Self {
        self.registration.do_return_status(status)
    }

    pub fn do_return_json(self, body: impl Into<String>) -> Self {
        self.registration.do_return_json(body)
    }

    pub fn do_return_xml(self, body: impl Into<String>) -> Self {
        self.registration.do_return_xml(body)
    }

    pub fn do_return_form<K, V>(self, pairs: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.registration.do_return_form(pairs)
    }

    pub fn do_return_template(self, template: impl Into<String>) -> Self {
        self.registration.do_return_template(template)
    }

    pub fn do_throw(self, error: TransportError) -> Self {
        self.registration.do_throw(error)
    }

    pub fn do_action(self, action: Action) -> Self {
        self.registration.do_action(action)
    }

    /// Stage the rule now instead of at the end of the statement.
    pub fn register(self) {
        self.registration.register();
    }
}
