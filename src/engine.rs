//! The stub engine: registration, execution and the request log.

use crate::action::Response;
use crate::condition::Condition;
use crate::config::{DebugMode, EngineSettings, MockConfig, StubDefinition};
use crate::debugger::{explain, Debugger, TracingDebugger};
use crate::error::{EngineError, TransportError};
use crate::matcher::Matcher;
use crate::registration::RuleRegistration;
use crate::registry::RuleRegistry;
use crate::request::Request;
use crate::rule::{Rule, RuleBuilder};
use crate::template::TemplateEngine;
use crate::url_conditions::UrlConditions;
use crate::verify::Verification;
use anyhow::Context;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A logged request and what the engine answered.
#[derive(Debug, Clone)]
pub struct Call {
    pub request: Request,
    pub outcome: Result<Response, TransportError>,
}

impl Call {
    pub fn response(&self) -> Option<&Response> {
        self.outcome.as_ref().ok()
    }
}

/// In-process HTTP stub engine.
///
/// Rules are registered with the `on_*` methods (or loaded from a
/// [`MockConfig`]) and requests are answered by [`MockEngine::execute`].
/// Every request is logged for later [`verify`](MockEngine::verify) calls.
/// The engine is `Sync`; requests may be executed from many threads.
pub struct MockEngine {
    settings: EngineSettings,
    registry: RuleRegistry,
    calls: RwLock<Vec<Call>>,
    debugger: Arc<dyn Debugger>,
    debug_always: AtomicBool,
    templates: Arc<TemplateEngine>,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    /// Engine whose relative registration URLs are prefixed with `host`.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self::with_settings(EngineSettings {
            default_host: host.into(),
            ..EngineSettings::default()
        })
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        debug!(
            default_host = %settings.default_host,
            debug = ?settings.debug,
            "Stub engine initialized"
        );
        Self {
            settings,
            registry: RuleRegistry::new(),
            calls: RwLock::new(Vec::new()),
            debugger: Arc::new(TracingDebugger),
            debug_always: AtomicBool::new(false),
            templates: Arc::new(TemplateEngine::new()),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        }
    }

    /// Engine configured and populated from a stub file.
    pub fn from_config(config: &MockConfig) -> anyhow::Result<Self> {
        let engine = Self::with_settings(config.settings.clone());
        engine.load(config)?;
        Ok(engine)
    }

    /// Replace the debugger used to explain requests.
    pub fn with_debugger(mut self, debugger: Arc<dyn Debugger>) -> Self {
        self.debugger = debugger;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub(crate) fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub(crate) fn templates(&self) -> &Arc<TemplateEngine> {
        &self.templates
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.settings.default_host, url)
        } else {
            url.to_string()
        }
    }

    /// Builder carrying the engine defaults and the method condition.
    fn base_builder(&self, method: Option<&str>) -> RuleBuilder {
        let mut builder = RuleBuilder::new();
        builder.add_url_conditions(&UrlConditions::for_extra_parameters(
            self.settings.allow_extra_parameters,
        ));
        builder.set_default_extra_form_parameters(self.settings.allow_extra_form_parameters);
        if let Some(method) = method {
            builder.add_condition(Condition::method(method));
        }
        builder
    }

    /// Builder matching `method` (any when `None`) on every URL.
    pub(crate) fn any_url_builder(&self, method: Option<&str>) -> RuleBuilder {
        let mut builder = self.base_builder(method);
        builder.add_url_conditions(&UrlConditions::for_extra_parameters(true));
        builder.add_url_conditions(&UrlConditions::for_reference(Matcher::Any));
        builder
    }

    /// Builder for `method` (any when `None`) and `url` (any when `None`).
    pub(crate) fn rule_builder(
        &self,
        method: Option<&str>,
        url: Option<&str>,
    ) -> Result<RuleBuilder, EngineError> {
        let Some(url) = url else {
            return Ok(self.any_url_builder(method));
        };
        let mut builder = self.base_builder(method);
        builder.add_url_conditions(&UrlConditions::parse(&self.absolute_url(url))?);
        Ok(builder)
    }

    /// Start a rule for `method` on `url`. Relative URLs get the default host.
    ///
    /// The rule is staged when the returned handle is dropped, normally at
    /// the end of the statement, and is visible from the next request on. A
    /// handle bound to a variable stays invisible until it is dropped or
    /// [`register`](RuleRegistration::register)ed.
    pub fn on(&self, method: &str, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        let builder = self.rule_builder(Some(method), Some(url))?;
        Ok(RuleRegistration::new(self, builder))
    }

    /// Start a rule matching `method` on any URL.
    pub fn on_method(&self, method: &str) -> RuleRegistration<'_> {
        RuleRegistration::new(self, self.any_url_builder(Some(method)))
    }

    pub fn on_get(&self, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        self.on("GET", url)
    }

    pub fn on_post(&self, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        self.on("POST", url)
    }

    pub fn on_put(&self, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        self.on("PUT", url)
    }

    pub fn on_delete(&self, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        self.on("DELETE", url)
    }

    pub fn on_head(&self, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        self.on("HEAD", url)
    }

    pub fn on_options(&self, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        self.on("OPTIONS", url)
    }

    pub fn on_patch(&self, url: &str) -> Result<RuleRegistration<'_>, EngineError> {
        self.on("PATCH", url)
    }

    /// Register every stub of `config`, in order.
    pub fn load(&self, config: &MockConfig) -> anyhow::Result<()> {
        config.validate()?;
        for stub in &config.stubs {
            let builder = self
                .stub_builder(stub)
                .with_context(|| format!("Failed to register stub {}", stub.id))?;
            drop(RuleRegistration::new(self, builder));
            debug!(stub_id = %stub.id, responses = stub.responses.len(), "Registered stub");
        }
        info!(stubs = config.stubs.len(), "Loaded stub configuration");
        Ok(())
    }

    fn stub_builder(&self, stub: &StubDefinition) -> anyhow::Result<RuleBuilder> {
        let request = &stub.request;
        let mut builder = self.rule_builder(request.method.as_deref(), request.url.as_deref())?;

        if let Some(host) = &request.host {
            builder.add_url_conditions(&UrlConditions::for_host(host)?);
        }
        if let Some(path) = &request.path {
            builder.add_url_conditions(&UrlConditions::for_path(path.to_matcher()?));
        }
        if let Some(reference) = &request.reference {
            builder.add_url_conditions(&UrlConditions::for_reference(reference.to_matcher()?));
        }
        for (name, matcher) in &request.query {
            builder.add_url_conditions(&UrlConditions::for_parameter(
                name.as_str(),
                matcher.to_matcher()?,
            ));
        }
        if let Some(allow) = request.extra_parameters {
            builder.add_url_conditions(&UrlConditions::for_extra_parameters(allow));
        }
        for (name, matcher) in &request.headers {
            builder.add_condition(Condition::header(name.as_str(), matcher.to_matcher()?));
        }
        for (name, matcher) in &request.form {
            builder.add_form_parameter(name.as_str(), matcher.to_matcher()?);
        }
        if let Some(allow) = request.extra_form_parameters {
            builder.set_extra_form_parameters(allow);
        }
        if let Some(body) = &request.body {
            builder.add_condition(Condition::body(body.to_matcher()?));
        }

        for response in &stub.responses {
            builder.add_action(
                response.to_action(&self.settings.default_content_type, &self.templates)?,
            );
        }
        Ok(builder)
    }

    /// Answer `request` with the last registered matching rule.
    ///
    /// Returns the simulated transport error when the selected action raises
    /// one. The request is logged in both cases.
    pub fn execute(&self, request: Request) -> Result<Response, TransportError> {
        self.registry.freeze_staged();
        let rules = self.registry.snapshot();
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let selected = RuleRegistry::select(&rules, &request);
        let matched = selected.is_some();
        let rule = selected.unwrap_or_else(|| self.registry.not_found());
        let outcome = rule.respond(&request);

        if matched {
            self.requests_matched.fetch_add(1, Ordering::Relaxed);
            if self.settings.log_matches {
                info!(
                    method = %request.method(),
                    url = %request.url(),
                    status = ?outcome.as_ref().map(|r| r.status).ok(),
                    "Request matched rule"
                );
            }
        } else {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            if self.settings.log_unmatched {
                warn!(
                    method = %request.method(),
                    url = %request.url(),
                    rules = rules.len(),
                    "No matching rule found"
                );
            }
        }
        if let Err(e) = &outcome {
            debug!(error = %e, url = %request.url(), "Raising simulated transport error");
        }

        let explain_request = match self.debug_mode() {
            DebugMode::Always => true,
            DebugMode::Unmatched => !matched,
            DebugMode::Off => false,
        };
        if explain_request {
            explain(&rules, &request, self.debugger.as_ref());
        }

        self.calls.write().push(Call {
            request,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn debug_mode(&self) -> DebugMode {
        if self.debug_always.load(Ordering::Relaxed) {
            DebugMode::Always
        } else {
            self.settings.debug
        }
    }

    /// Explain every request, matched or not.
    pub fn debug_on(&self) {
        self.debug_always.store(true, Ordering::Relaxed);
    }

    /// Back to the configured debug mode.
    pub fn debug_off(&self) {
        self.debug_always.store(false, Ordering::Relaxed);
    }

    pub fn verify(&self) -> Verification<'_> {
        Verification::new(self)
    }

    /// Logged calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.read().clone()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.calls.read().iter().map(|c| c.request.clone()).collect()
    }

    pub(crate) fn count_matching(&self, rule: &Rule) -> usize {
        self.calls
            .read()
            .iter()
            .filter(|call| rule.matches(&call.request))
            .count()
    }

    /// Forget staged and frozen rules, the request log and the counters.
    pub fn reset(&self) {
        self.registry.clear();
        self.calls.write().clear();
        self.requests_total.store(0, Ordering::Relaxed);
        self.requests_matched.store(0, Ordering::Relaxed);
        self.requests_unmatched.store(0, Ordering::Relaxed);
        debug!("Stub engine reset");
    }

    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn total_matched(&self) -> u64 {
        self.requests_matched.load(Ordering::Relaxed)
    }

    pub fn total_unmatched(&self) -> u64 {
        self.requests_unmatched.load(Ordering::Relaxed)
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::CapturingDebugger;
    use crate::registration::Conditions;

    fn test_config() -> MockConfig {
        let yaml = r#"
settings:
  default_host: http://localhost
stubs:
  - id: hello
    request:
      method: GET
      url: /hello
    responses:
      - body:
          type: text
          content: Hello, World!
  - id: user
    request:
      method: GET
      path: { type: template, template: "/users/{id}" }
    responses:
      - template: true
        body:
          type: json
          content:
            id: "{{params.id}}"
            path: "{{path}}"
  - id: flaky
    request:
      method: POST
      url: /flaky
    responses:
      - error:
          kind: timeout
          message: read timed out
      - status: 200
"#;
        MockConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_engine_from_config() {
        let engine = MockEngine::from_config(&test_config()).unwrap();

        let hello = engine.execute(Request::get("http://localhost/hello")).unwrap();
        assert_eq!(hello.status, 200);
        assert_eq!(hello.text().as_deref(), Some("Hello, World!"));
        assert_eq!(hello.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_template_stub() {
        let engine = MockEngine::from_config(&test_config()).unwrap();

        let user = engine.execute(Request::get("http://any-host/users/42")).unwrap();
        assert_eq!(user.text().as_deref(), Some(r#"{"id":"42","path":"/users/42"}"#));
    }

    #[test]
    fn test_stub_response_sequence() {
        let engine = MockEngine::from_config(&test_config()).unwrap();

        let first = engine.execute(Request::post("http://localhost/flaky"));
        assert_eq!(first.unwrap_err(), TransportError::timeout("read timed out"));
        assert_eq!(
            engine.execute(Request::post("http://localhost/flaky")).unwrap().status,
            200
        );
        assert_eq!(
            engine.execute(Request::post("http://localhost/flaky")).unwrap().status,
            200
        );
    }

    #[test]
    fn test_no_match() {
        let engine = MockEngine::new();
        let response = engine.execute(Request::get("http://localhost/missing")).unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.text().as_deref(), Some(""));
        assert_eq!(engine.requests().len(), 1);
    }

    #[test]
    fn test_request_counters() {
        let engine = MockEngine::with_host("http://localhost");
        engine.on_get("/a").unwrap().do_return("a");

        engine.execute(Request::get("http://localhost/a")).unwrap();
        engine.execute(Request::get("http://localhost/b")).unwrap();

        assert_eq!(engine.total_requests(), 2);
        assert_eq!(engine.total_matched(), 1);
        assert_eq!(engine.total_unmatched(), 1);

        engine.reset();
        assert_eq!(engine.total_requests(), 0);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_debugger_runs_on_unmatched_only_by_default() {
        let debugger = Arc::new(CapturingDebugger::new());
        let engine = MockEngine::with_host("http://localhost").with_debugger(debugger.clone());
        engine.on_get("/login").unwrap().do_return("ok");

        engine.execute(Request::get("http://localhost/login")).unwrap();
        assert!(debugger.requests().is_empty());

        engine.execute(Request::post("http://localhost/login")).unwrap();
        assert_eq!(debugger.requests(), vec!["http://localhost/login"]);
        assert_eq!(debugger.not_matching(), vec!["HTTP method is GET"]);
    }

    #[test]
    fn test_debug_on_explains_matches_too() {
        let debugger = Arc::new(CapturingDebugger::new());
        let engine = MockEngine::with_host("http://localhost").with_debugger(debugger.clone());
        engine.on_get("/login").unwrap().do_return("ok");

        engine.debug_on();
        engine.execute(Request::get("http://localhost/login")).unwrap();
        assert_eq!(debugger.requests().len(), 1);

        engine.debug_off();
        engine.execute(Request::get("http://localhost/login")).unwrap();
        assert_eq!(debugger.requests().len(), 1);
    }

    #[test]
    fn test_debug_off_setting() {
        let debugger = Arc::new(CapturingDebugger::new());
        let settings = EngineSettings {
            debug: DebugMode::Off,
            ..EngineSettings::default()
        };
        let engine = MockEngine::with_settings(settings).with_debugger(debugger.clone());

        engine.execute(Request::get("http://localhost/")).unwrap();
        assert!(debugger.requests().is_empty());
    }

    #[test]
    fn test_settings_allow_extra_parameters() {
        let settings = EngineSettings {
            default_host: "http://localhost".to_string(),
            allow_extra_parameters: true,
            ..EngineSettings::default()
        };
        let engine = MockEngine::with_settings(settings);
        engine.on_get("/search?q=rust").unwrap().do_return("found");
        engine
            .on_get("/strict?q=rust")
            .unwrap()
            .without_extra_parameters()
            .do_return("strict");

        let lenient = engine
            .execute(Request::get("http://localhost/search?q=rust&page=2"))
            .unwrap();
        assert_eq!(lenient.text().as_deref(), Some("found"));

        let strict = engine
            .execute(Request::get("http://localhost/strict?q=rust&page=2"))
            .unwrap();
        assert_eq!(strict.status, 404);
    }

    #[test]
    fn test_load_rejects_bad_url() {
        let yaml = r#"
stubs:
  - id: relative
    request:
      url: /needs-a-host
    responses:
      - status: 200
"#;
        let config = MockConfig::from_yaml(yaml).unwrap();
        let err = MockEngine::from_config(&config).err().unwrap();
        assert!(format!("{:#}", err).contains("relative"));
    }
}
