use http_stub_engine::{
    Action, CapturingDebugger, Conditions, MockConfig, MockEngine, Matcher, Request, Response,
    TransportError,
};
use std::sync::Arc;
use std::thread;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn engine() -> MockEngine {
    init_tracing();
    MockEngine::with_host("http://localhost")
}

fn body(engine: &MockEngine, request: Request) -> String {
    engine
        .execute(request)
        .unwrap()
        .text()
        .unwrap_or_default()
}

#[test]
fn unmatched_request_gets_not_found_and_is_logged() {
    let engine = engine();
    engine.on_get("/login").unwrap().do_return("login");

    let response = engine.execute(Request::get("http://localhost/other")).unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(response.body.as_deref(), Some(&b""[..]));
    assert_eq!(engine.requests(), vec![Request::get("http://localhost/other")]);
}

#[test]
fn last_registered_rule_wins() {
    let engine = engine();
    engine.on_get("/login").unwrap().do_return("first");
    engine.on_get("/login").unwrap().do_return("second");

    for _ in 0..3 {
        assert_eq!(body(&engine, Request::get("http://localhost/login")), "second");
    }
}

#[test]
fn overlapping_rules_prefer_the_later_one() {
    let engine = engine();
    engine
        .on_get("/login")
        .unwrap()
        .with_extra_parameters()
        .do_return("any");
    engine
        .on_get("/login?user=admin")
        .unwrap()
        .do_return("admin");

    assert_eq!(body(&engine, Request::get("http://localhost/login?user=admin")), "admin");
    assert_eq!(body(&engine, Request::get("http://localhost/login?user=john")), "any");
}

#[test]
fn actions_are_replayed_in_sequence() {
    let engine = engine();
    engine
        .on_get("/login")
        .unwrap()
        .do_return("A")
        .do_return("B")
        .do_return("C");

    let bodies: Vec<String> = (0..5)
        .map(|_| body(&engine, Request::get("http://localhost/login")))
        .collect();
    assert_eq!(bodies, vec!["A", "B", "C", "C", "C"]);
}

#[test]
fn separate_host_path_and_parameter_declarations_compose() {
    let engine = MockEngine::new();
    engine
        .on_method("GET")
        .with_host("localhost")
        .with_path("/foo")
        .with_parameter("a", "1")
        .without_extra_parameters()
        .do_return("ok");
    engine
        .on_method("GET")
        .without_extra_parameters()
        .with_parameter("a", "1")
        .with_path("/bar")
        .with_host("http://localhost")
        .do_return("reordered");

    assert_eq!(body(&engine, Request::get("http://localhost/foo?a=1")), "ok");
    assert_eq!(body(&engine, Request::get("http://localhost/bar?a=1")), "reordered");
    assert_eq!(
        engine.execute(Request::get("http://localhost/foo?a=2")).unwrap().status,
        404
    );
    assert_eq!(
        engine.execute(Request::get("http://localhost/foo?a=1&b=2")).unwrap().status,
        404
    );
}

#[test]
fn reference_declared_twice_keeps_the_last() {
    let engine = engine();
    engine
        .on_get("/page")
        .unwrap()
        .with_reference("first")
        .with_reference("second")
        .do_return("page");

    assert_eq!(body(&engine, Request::get("http://localhost/page#second")), "page");
    assert_eq!(
        engine.execute(Request::get("http://localhost/page#first")).unwrap().status,
        404
    );
}

#[test]
fn extra_parameters_are_rejected_unless_allowed() {
    let engine = engine();
    engine.on_get("/strict?foo=bar").unwrap().do_return("strict");
    engine
        .on_get("/lenient?foo=bar")
        .unwrap()
        .with_extra_parameters()
        .do_return("lenient");

    assert_eq!(
        engine
            .execute(Request::get("http://localhost/strict?foo=bar&abc=123"))
            .unwrap()
            .status,
        404
    );
    assert_eq!(
        body(&engine, Request::get("http://localhost/lenient?foo=bar&abc=123")),
        "lenient"
    );
    assert_eq!(
        body(&engine, Request::get("http://localhost/lenient?abc=123&foo=bar&x=y")),
        "lenient"
    );
}

#[test]
fn verification_counts_login_calls() {
    let engine = engine();
    engine.execute(Request::post("http://localhost/login")).unwrap();
    engine.execute(Request::post("http://localhost/login")).unwrap();
    engine.execute(Request::put("http://localhost/login")).unwrap();

    engine.verify().post("/login").unwrap().called(2).unwrap();
    engine.verify().put("/login").unwrap().called(1).unwrap();
    engine.verify().get("/login").unwrap().not_called().unwrap();
}

#[test]
fn transport_error_propagates_and_is_logged() {
    let engine = engine();
    engine
        .on_get("/login")
        .unwrap()
        .do_throw(TransportError::connection_refused("connection refused"));

    let err = engine
        .execute(Request::get("http://localhost/login"))
        .unwrap_err();

    assert_eq!(err, TransportError::connection_refused("connection refused"));
    let calls = engine.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].outcome.is_err());
    engine.verify().get("/login").unwrap().called_once().unwrap();
}

#[test]
fn reset_forgets_rules_and_calls() {
    let engine = engine();
    engine.on_get("/login").unwrap().do_return("login");
    engine.execute(Request::get("http://localhost/login")).unwrap();

    engine.reset();

    engine.verify().get("/login").unwrap().not_called().unwrap();
    assert_eq!(
        engine.execute(Request::get("http://localhost/login")).unwrap().status,
        404
    );
}

#[test]
fn form_parameters_select_the_rule() {
    let engine = engine();
    engine
        .on_post("/login")
        .unwrap()
        .with_form_parameter("username", "John")
        .with_form_parameter_matching("password", Matcher::regex("[a-z]+").unwrap())
        .do_return("welcome");

    let ok = Request::post("http://localhost/login")
        .with_form(&[("username", "John"), ("password", "secret")]);
    let bad = Request::post("http://localhost/login")
        .with_form(&[("username", "John"), ("password", "S3cret!")]);
    let extra = Request::post("http://localhost/login")
        .with_form(&[("username", "John"), ("password", "secret"), ("remember", "1")]);

    assert_eq!(body(&engine, ok), "welcome");
    assert_eq!(engine.execute(bad).unwrap().status, 404);
    assert_eq!(engine.execute(extra).unwrap().status, 404);
}

#[test]
fn json_body_matching() {
    let engine = engine();
    engine
        .on_post("/users")
        .unwrap()
        .with_body(Matcher::json_path("$.name", serde_json::json!("John")).unwrap())
        .do_return_json(r#"{"id":1}"#)
        .with_status(201);

    let created = engine
        .execute(Request::post("http://localhost/users").with_json(&serde_json::json!({
            "name": "John",
            "age": 30
        })))
        .unwrap();

    assert_eq!(created.status, 201);
    assert_eq!(created.content_type.as_deref(), Some("application/json"));
}

#[test]
fn custom_action_sees_the_request() {
    let engine = engine();
    engine
        .on_get("/echo")
        .unwrap()
        .with_extra_parameters()
        .do_action(Action::custom(|request: &Request| {
            let names: Vec<String> = request
                .query_parameters()
                .into_iter()
                .map(|(name, _)| name)
                .collect();
            Ok(Response::with_body(200, names.join(",").into_bytes(), "text/plain"))
        }));

    assert_eq!(body(&engine, Request::get("http://localhost/echo?a=1&b=2")), "a,b");
}

#[test]
fn debugger_explains_unmatched_url() {
    let debugger = Arc::new(CapturingDebugger::new());
    let engine = engine().with_debugger(debugger.clone());
    engine
        .on_get("http://localhost:8080/login")
        .unwrap()
        .do_return("login");

    engine.debug_on();
    engine.execute(Request::post("https://www.google.com")).unwrap();

    let not_matching = debugger.not_matching();
    for expected in [
        "HTTP method is GET",
        "scheme is \"http\"",
        "host is \"localhost\"",
        "path is \"/login\"",
        "port is <8080>",
    ] {
        assert!(
            not_matching.contains(&expected.to_string()),
            "missing {:?} in {:?}",
            expected,
            not_matching
        );
    }
}

#[test]
fn debugger_reports_parameters() {
    let debugger = Arc::new(CapturingDebugger::new());
    let engine = engine().with_debugger(debugger.clone());
    engine
        .on_get("/login")
        .unwrap()
        .with_parameter_matching("foo", Matcher::starts_with("a"))
        .with_parameter_matching("foo", Matcher::ends_with("b"))
        .do_return("login");
    engine.on_get("/missing?foo=bar").unwrap().do_return("missing");

    engine.debug_on();
    engine.execute(Request::get("http://localhost/login?foo=aabb")).unwrap();
    assert!(debugger.matching().contains(
        &"query parameter foo is a string starting with \"a\" and a string ending with \"b\""
            .to_string()
    ));

    debugger.clear();
    engine.execute(Request::get("http://localhost/missing?abc=1")).unwrap();
    let not_matching = debugger.not_matching();
    assert!(not_matching.contains(&"query parameter foo is missing from the request".to_string()));
    assert!(not_matching
        .contains(&"query parameter abc was not expected to be in the request".to_string()));
}

#[test]
fn debugger_skips_matched_requests_unless_enabled() {
    let debugger = Arc::new(CapturingDebugger::new());
    let engine = engine().with_debugger(debugger.clone());
    engine.on_get("/admin").unwrap().do_return("admin");

    engine.execute(Request::get("http://localhost/login")).unwrap();
    engine.execute(Request::get("http://localhost/admin")).unwrap();

    assert_eq!(debugger.requests(), vec!["http://localhost/login"]);
}

#[test]
fn declarative_stubs_follow_the_same_rules() {
    init_tracing();
    let yaml = r#"
settings:
  default_host: http://localhost
stubs:
  - id: generic
    request:
      method: GET
      url: /items
      extra_parameters: true
    responses:
      - body: { type: text, content: generic }
  - id: specific
    request:
      method: GET
      url: /items
      query:
        id: { type: regex, pattern: "[0-9]+" }
    responses:
      - body: { type: text, content: first }
      - body: { type: text, content: rest }
"#;
    let engine = MockEngine::from_config(&MockConfig::from_yaml(yaml).unwrap()).unwrap();

    assert_eq!(body(&engine, Request::get("http://localhost/items?id=7")), "first");
    assert_eq!(body(&engine, Request::get("http://localhost/items?id=8")), "rest");
    assert_eq!(body(&engine, Request::get("http://localhost/items?id=x")), "generic");
}

#[test]
fn concurrent_requests_are_all_logged() {
    let engine = Arc::new(engine());
    engine
        .on_get("/counter")
        .unwrap()
        .do_return("first")
        .do_return("rest");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                (0..25)
                    .map(|_| body(&engine, Request::get("http://localhost/counter")))
                    .filter(|text| text == "first")
                    .count()
            })
        })
        .collect();

    let firsts: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(firsts, 1);
    assert_eq!(engine.total_requests(), 200);
    engine.verify().get("/counter").unwrap().called(200).unwrap();
}

#[test]
fn rules_registered_concurrently_become_visible() {
    let engine = Arc::new(engine());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                engine
                    .on_get(&format!("/worker/{}", i))
                    .unwrap()
                    .do_return(format!("worker {}", i));
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..4 {
        assert_eq!(
            body(&engine, Request::get(format!("http://localhost/worker/{}", i))),
            format!("worker {}", i)
        );
    }
}
