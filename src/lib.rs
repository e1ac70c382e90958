//! HTTP Stub Engine
//!
//! An in-process stand-in for an HTTP client's network layer. Tests register
//! rules describing requests and the responses (or transport failures) to
//! answer them with, run the code under test against the engine, then verify
//! which requests were made.
//!
//! # Features
//!
//! - **Request Matching**: method, scheme, host, port, path, query and form
//!   parameters, headers, body, reference, custom predicates
//! - **Last Rule Wins**: later registrations override earlier ones
//! - **Response Sequences**: `A, B, C, C, C...` from a single rule
//! - **Simulated Failures**: raise transport errors instead of responding
//! - **Dynamic Templates**: Handlebars bodies rendered from the request
//! - **Verification**: count logged requests by the same conditions
//! - **Debugging**: explain why a request did or did not match each rule
//! - **Declarative Stubs**: load rules from YAML
//!
//! # Example
//!
//! ```
//! use http_stub_engine::{Conditions, MockEngine, Request};
//!
//! let engine = MockEngine::with_host("http://localhost:8080");
//! engine
//!     .on_get("/login")
//!     .unwrap()
//!     .with_parameter("user", "john")
//!     .do_return("first")
//!     .do_return_status(503);
//!
//! let request = Request::get("http://localhost:8080/login?user=john");
//! assert_eq!(engine.execute(request.clone()).unwrap().text().as_deref(), Some("first"));
//! assert_eq!(engine.execute(request).unwrap().status, 503);
//!
//! engine.verify().get("/login?user=john").unwrap().called(2).unwrap();
//! ```

pub mod action;
pub mod condition;
pub mod config;
pub mod debugger;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod params;
pub mod registration;
pub mod registry;
pub mod request;
pub mod rule;
pub mod template;
pub mod url_conditions;
pub mod verify;

pub use action::{Action, Cookie, Response};
pub use condition::Condition;
pub use config::{DebugMode, EngineSettings, MockConfig};
pub use debugger::{CapturingDebugger, Debugger, TracingDebugger};
pub use engine::{Call, MockEngine};
pub use error::{EngineError, TransportError, TransportErrorKind, VerificationError};
pub use matcher::{Matcher, NumberMatcher};
pub use registration::{Conditions, ResponseRegistration, RuleRegistration};
pub use request::Request;
pub use verify::{Verification, VerifyBuilder};
