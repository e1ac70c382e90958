//! Match tracing.
//!
//! A [`Debugger`] receives one `(matched, expected)` message per condition
//! while [`explain`] walks every registered rule against a request. It is a
//! pure observer and never influences which rule wins.

use crate::request::Request;
use crate::rule::Rule;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Sink for match explanations.
pub trait Debugger: Send + Sync {
    /// Called once before the rules of a request are explained.
    fn request(&self, _request: &Request) {}

    /// Called before the conditions of the rule at `index` (0-based).
    fn rule(&self, _index: usize) {}

    /// Called when no rules are registered at all.
    fn no_rules(&self) {}

    /// One condition of the current rule.
    fn message(&self, matched: bool, expected: &str);
}

/// Walk all rules against `request`, reporting every condition.
pub fn explain(rules: &[Arc<Rule>], request: &Request, debugger: &dyn Debugger) {
    debugger.request(request);
    if rules.is_empty() {
        debugger.no_rules();
    }
    for (index, rule) in rules.iter().enumerate() {
        debugger.rule(index);
        rule.debug(request, debugger);
    }
}

/// Default debugger: writes the explanation as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDebugger;

impl Debugger for TracingDebugger {
    fn request(&self, request: &Request) {
        info!(method = %request.method(), url = %request.url(), "Explaining request");
    }

    fn rule(&self, index: usize) {
        info!(rule = index + 1, "Rule");
    }

    fn no_rules(&self) {
        info!("No rules were defined");
    }

    fn message(&self, matched: bool, expected: &str) {
        info!(matches = matched, expected = %expected, "Condition");
    }
}

/// Debugger that records everything it is told, for assertions.
#[derive(Debug, Default)]
pub struct CapturingDebugger {
    requests: Mutex<Vec<String>>,
    matching: Mutex<Vec<String>>,
    not_matching: Mutex<Vec<String>>,
}

impl CapturingDebugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs of explained requests.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn matching(&self) -> Vec<String> {
        self.matching.lock().clone()
    }

    pub fn not_matching(&self) -> Vec<String> {
        self.not_matching.lock().clone()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
        self.matching.lock().clear();
        self.not_matching.lock().clear();
    }
}

impl Debugger for CapturingDebugger {
    fn request(&self, request: &Request) {
        self.requests.lock().push(request.url().to_string());
    }

    fn message(&self, matched: bool, expected: &str) {
        if matched {
            self.matching.lock().push(expected.to_string());
        } else {
            self.not_matching.lock().push(expected.to_string());
        }
    }
}
