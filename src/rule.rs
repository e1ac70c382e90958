//! Rules: frozen condition sets with an ordered action sequence.

use crate::action::{Action, Response};
use crate::condition::Condition;
use crate::debugger::Debugger;
use crate::error::TransportError;
use crate::matcher::Matcher;
use crate::params::ParametersMatcher;
use crate::request::Request;
use crate::url_conditions::UrlConditions;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A frozen rule.
///
/// Matching is a pure function of the request. The action cursor advances on
/// every selection and saturates at the last action, so a rule with actions
/// `A, B, C` answers `A, B, C, C, C...`.
#[derive(Debug)]
pub struct Rule {
    url: UrlConditions,
    conditions: Vec<Condition>,
    actions: Vec<Action>,
    cursor: AtomicUsize,
}

impl Rule {
    /// Fallback rule used when nothing matches: 404 with an empty body.
    pub fn not_found() -> Self {
        Self {
            url: UrlConditions::new(),
            conditions: Vec::new(),
            actions: vec![Action::Status(404)],
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn matches(&self, request: &Request) -> bool {
        self.conditions.iter().all(|c| c.matches(request)) && self.url.matches(request.url())
    }

    /// Return the current action and advance the cursor.
    pub fn next_action(&self) -> &Action {
        let last = self.actions.len().saturating_sub(1);
        let index = match self.cursor.fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
            (i < last).then_some(i + 1)
        }) {
            Ok(previous) => previous,
            Err(current) => current,
        };
        &self.actions[index]
    }

    /// Answer `request` with the next action, exposing path template
    /// captures to templated bodies.
    pub fn respond(&self, request: &Request) -> Result<Response, TransportError> {
        let params = self.url.path_params(request.url());
        self.next_action().respond(request, &params)
    }

    /// Report every condition of this rule to `debugger`.
    pub fn debug(&self, request: &Request, debugger: &dyn Debugger) {
        let mut conditions = self.conditions.iter();
        // Method first.
        if let Some(first) = conditions.next() {
            first.debug(request, debugger);
        }
        self.url.debug(request.url(), debugger);
        for condition in conditions {
            condition.debug(request, debugger);
        }
    }
}

/// Mutable rule under construction.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    url: UrlConditions,
    conditions: Vec<Condition>,
    form: ParametersMatcher,
    /// Declared on the rule; checked even with no form parameters.
    allow_extra_form: Option<bool>,
    default_extra_form: bool,
    actions: Vec<Action>,
}

impl RuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn add_url_conditions(&mut self, conditions: &UrlConditions) {
        self.url.join(conditions);
    }

    pub fn add_form_parameter(&mut self, name: impl Into<String>, matcher: Matcher) {
        self.form.put(name, matcher);
    }

    pub fn set_extra_form_parameters(&mut self, allow: bool) {
        self.allow_extra_form = Some(allow);
    }

    /// Strictness used when form parameters are declared without an
    /// explicit extra-parameter choice.
    pub fn set_default_extra_form_parameters(&mut self, allow: bool) {
        self.default_extra_form = allow;
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Replace the most recent action with `wrap(action)`.
    pub fn decorate_last_action(&mut self, wrap: impl FnOnce(Action) -> Action) {
        if let Some(last) = self.actions.pop() {
            self.actions.push(wrap(last));
        }
    }

    /// Freeze into a [`Rule`]. A rule without actions answers 404.
    pub fn build(self) -> Rule {
        let mut conditions = self.conditions;
        if !self.form.is_empty() || self.allow_extra_form.is_some() {
            conditions.push(Condition::Form {
                parameters: self.form,
                allow_extra: self.allow_extra_form.unwrap_or(self.default_extra_form),
            });
        }
        let actions = if self.actions.is_empty() {
            vec![Action::Status(404)]
        } else {
            self.actions
        };
        Rule {
            url: self.url,
            conditions,
            actions,
            cursor: AtomicUsize::new(0),
        }
    }
}
