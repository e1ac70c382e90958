//! Post-hoc verification against the request log.

use crate::engine::MockEngine;
use crate::error::{EngineError, VerificationError};
use crate::matcher::NumberMatcher;
use crate::registration::Conditions;
use crate::rule::RuleBuilder;

/// Entry point returned by [`MockEngine::verify`].
pub struct Verification<'a> {
    engine: &'a MockEngine,
}

impl<'a> Verification<'a> {
    pub(crate) fn new(engine: &'a MockEngine) -> Self {
        Self { engine }
    }

    /// Requests with `method` on `url`. Relative URLs get the default host.
    pub fn request(self, method: &str, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        let builder = self.engine.rule_builder(Some(method), Some(url))?;
        Ok(VerifyBuilder::new(self.engine, builder))
    }

    /// Requests with `method` on any URL.
    pub fn method(self, method: &str) -> VerifyBuilder<'a> {
        self.any_url(Some(method))
    }

    /// Every logged request.
    pub fn any(self) -> VerifyBuilder<'a> {
        self.any_url(None)
    }

    fn any_url(self, method: Option<&str>) -> VerifyBuilder<'a> {
        VerifyBuilder::new(self.engine, self.engine.any_url_builder(method))
    }

    pub fn get(self, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        self.request("GET", url)
    }

    pub fn post(self, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        self.request("POST", url)
    }

    pub fn put(self, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        self.request("PUT", url)
    }

    pub fn delete(self, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        self.request("DELETE", url)
    }

    pub fn head(self, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        self.request("HEAD", url)
    }

    pub fn options(self, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        self.request("OPTIONS", url)
    }

    pub fn patch(self, url: &str) -> Result<VerifyBuilder<'a>, EngineError> {
        self.request("PATCH", url)
    }
}

/// Conditions to count logged requests against.
///
/// Accepts the same vocabulary as rule registration through [`Conditions`].
pub struct VerifyBuilder<'a> {
    engine: &'a MockEngine,
    builder: RuleBuilder,
}

impl<'a> VerifyBuilder<'a> {
    fn new(engine: &'a MockEngine, builder: RuleBuilder) -> Self {
        Self { engine, builder }
    }

    /// Number of logged requests satisfying every condition.
    pub fn count(self) -> usize {
        let rule = self.builder.build();
        self.engine.count_matching(&rule)
    }

    pub fn called_matching(self, expected: NumberMatcher) -> Result<(), VerificationError> {
        let actual = self.count();
        let within = i64::try_from(actual).map_or(false, |n| expected.matches(n));
        if within {
            Ok(())
        } else {
            Err(VerificationError {
                expected: expected.describe(),
                actual,
            })
        }
    }

    pub fn called(self, times: usize) -> Result<(), VerificationError> {
        let expected = i64::try_from(times).unwrap_or(i64::MAX);
        self.called_matching(NumberMatcher::Equals(expected))
    }

    /// At least one matching request.
    pub fn called_at_least_once(self) -> Result<(), VerificationError> {
        self.called_matching(NumberMatcher::AtLeast(1))
    }

    pub fn called_once(self) -> Result<(), VerificationError> {
        self.called(1)
    }

    pub fn not_called(self) -> Result<(), VerificationError> {
        self.called(0)
    }
}

impl Conditions for VerifyBuilder<'_> {
    fn rule_builder(&mut self) -> &mut RuleBuilder {
        &mut self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    fn engine_with_login_calls() -> MockEngine {
        let engine = MockEngine::with_host("http://localhost");
        for request in [
            Request::post("http://localhost/login").with_form(&[("user", "john")]),
            Request::post("http://localhost/login").with_form(&[("user", "jane")]),
            Request::put("http://localhost/login"),
            Request::get("http://localhost/login?foo=bar"),
        ] {
            engine.execute(request).unwrap();
        }
        engine
    }

    #[test]
    fn test_count_by_method_and_url() {
        let engine = engine_with_login_calls();

        engine.verify().post("/login").unwrap().called(2).unwrap();
        engine.verify().put("/login").unwrap().called_once().unwrap();
        engine.verify().delete("/login").unwrap().not_called().unwrap();
        assert_eq!(engine.verify().method("GET").count(), 1);
        assert_eq!(engine.verify().any().count(), 4);
    }

    #[test]
    fn test_parameters_in_verification_url() {
        let engine = engine_with_login_calls();

        engine.verify().get("/login?foo=bar").unwrap().called_once().unwrap();
        engine.verify().get("/login").unwrap().not_called().unwrap();
        engine
            .verify()
            .get("/login")
            .unwrap()
            .with_parameter("foo", "bar")
            .called_once()
            .unwrap();
    }

    #[test]
    fn test_conditions_narrow_the_count() {
        let engine = engine_with_login_calls();

        engine
            .verify()
            .post("/login")
            .unwrap()
            .with_form_parameter("user", "john")
            .called_once()
            .unwrap();
    }

    #[test]
    fn test_mismatch_reports_expected_and_actual() {
        let engine = engine_with_login_calls();

        let err = engine.verify().post("/login").unwrap().called(3).unwrap_err();
        assert_eq!(err.actual, 2);
        assert_eq!(err.to_string(), "Expected <3> calls, but found 2.");
    }

    #[test]
    fn test_called_at_least_once() {
        let engine = engine_with_login_calls();

        engine.verify().post("/login").unwrap().called_at_least_once().unwrap();
        engine.verify().put("/login").unwrap().called_at_least_once().unwrap();
        let err = engine
            .verify()
            .delete("/login")
            .unwrap()
            .called_at_least_once()
            .unwrap_err();
        assert_eq!(err.actual, 0);
    }

    #[test]
    fn test_called_matching() {
        let engine = engine_with_login_calls();

        engine
            .verify()
            .post("/login")
            .unwrap()
            .called_matching(NumberMatcher::AtLeast(1))
            .unwrap();
        assert!(engine
            .verify()
            .post("/login")
            .unwrap()
            .called_matching(NumberMatcher::AtMost(1))
            .is_err());
    }
}
