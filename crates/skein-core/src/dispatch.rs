//! Resolves inbound calls to targets and produces responses.
//!
//! Two call paths share one [`Dispatcher`]:
//! - **path+verb**: `GET /Random/randomInt?min=1&max=6` resolves through the
//!   route table, decodes named arguments and always yields a
//!   [`ResponseEnvelope`] with a status code
//! - **handle**: `/invoke?oid=Random-randomInt-1` resolves through the
//!   [`HandleManager`], decodes positional arguments and returns the encoded
//!   `{"result": ...}` body or raises

use crate::envelope::{Headers, ResponseEnvelope};
use crate::error::reason_phrase;
use crate::handles::{HandleManager, HandleRef};
use crate::marshal::Marshaller;
use crate::registry::{Args, Registry, RouteMatch, Target, Verb};
use crate::{Result, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Split a request target on the first `?` into path and parsed query.
pub fn split_uri(uri: &str) -> (&str, HashMap<String, String>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (uri, HashMap::new()),
    }
}

/// Parse `a=1&b=2`. Segments without `=` are ignored; the last duplicate wins.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|segment| segment.split_once('='))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Ties registry, handles and marshaller together.
pub struct Dispatcher {
    registry: Arc<Registry>,
    handles: Arc<HandleManager>,
    marshaller: Marshaller,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, handles: Arc<HandleManager>) -> Self {
        Self {
            registry,
            handles,
            marshaller: Marshaller::new(),
        }
    }

    pub fn with_marshaller(mut self, marshaller: Marshaller) -> Self {
        self.marshaller = marshaller;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn handles(&self) -> &Arc<HandleManager> {
        &self.handles
    }

    pub fn marshaller(&self) -> &Marshaller {
        &self.marshaller
    }

    // ========================================
    // Path+verb call path
    // ========================================

    /// Dispatch a path+verb call. Never fails: errors become error envelopes.
    pub fn handle(&self, verb: &str, uri: &str, body: &str, headers: &Headers) -> ResponseEnvelope {
        debug!("Dispatching {} {} ({} headers)", verb, uri, headers.len());
        match self.dispatch_route(verb, uri, body) {
            Ok(body) => ResponseEnvelope::ok(body),
            Err(e) => self.error_response(&e),
        }
    }

    fn dispatch_route(&self, verb: &str, uri: &str, body: &str) -> Result<String> {
        let (path, query) = split_uri(uri);
        let verb: Verb = verb.parse()?;

        let target = match self.registry.resolve_route(path, verb) {
            RouteMatch::Found(target) => target,
            RouteMatch::VerbNotSupported => {
                return Err(RpcError::VerbNotSupported {
                    verb: verb.to_string(),
                    path: uri.to_string(),
                })
            }
            RouteMatch::NotFound => return Err(RpcError::RouteNotFound(uri.to_string())),
        };

        let args = self.marshaller.decode_named(&target, body, &query)?;
        let result = invoke_guarded(&target, &args)?;
        self.marshaller.encode_result(&result)
    }

    /// Map an error to its status code and encoded error envelope.
    pub fn error_response(&self, err: &RpcError) -> ResponseEnvelope {
        self.error_response_with_status(err.status_code(), err)
    }

    /// Encode an error envelope under an explicit status code.
    ///
    /// The handle call path reports every failure as a 500 regardless of kind.
    pub fn error_response_with_status(&self, status: u16, err: &RpcError) -> ResponseEnvelope {
        let message = format!("{}: {}", reason_phrase(status), err);
        if status >= 500 {
            error!("{} ({}): {}", reason_phrase(status), status, err);
        } else {
            warn!("{} ({}): {}", reason_phrase(status), status, err);
        }
        ResponseEnvelope::new(status, self.marshaller.encode_error(status, &message, err.kind()))
    }

    // ========================================
    // Handle call path
    // ========================================

    /// Dispatch a handle call with a `{"params": [...]}` body.
    pub fn handle_invoke(&self, handle: &str, body: &str) -> Result<String> {
        debug!("Invoking handle {}", handle);
        let target = self
            .handles
            .resolve(handle)
            .ok_or_else(|| RpcError::HandleNotFound(handle.to_string()))?;

        let args = self.marshaller.decode_positional(&target, body)?;
        let result = invoke_guarded(&target, &args)?;
        self.marshaller.encode_invoke_result(&result)
    }

    /// Issue a fresh handle for a target registered by name.
    pub fn issue_handle(&self, component: &str, method: &str) -> Result<String> {
        let target = self
            .registry
            .resolve_named(component, method)
            .ok_or_else(|| RpcError::RouteNotFound(format!("{}/{}", component, method)))?;
        Ok(self.handles.issue(component, method, target))
    }

    /// Reference to a named target, reusing its latest handle when one exists.
    pub fn handle_ref(&self, host: &str, port: u16, component: &str, method: &str) -> Result<HandleRef> {
        let handle = match self.handles.lookup(component, method) {
            Some(handle) => handle,
            None => self.issue_handle(component, method)?,
        };
        Ok(HandleRef::new(host, port, handle))
    }
}

/// Invoke a target, turning a panic into an invocation error.
fn invoke_guarded(target: &Target, args: &Args) -> Result<Value> {
    catch_unwind(AssertUnwindSafe(|| target.invoke(args))).unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "target panicked".to_string());
        Err(RpcError::Invocation(message))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::ErrorEnvelope;
    use crate::registry::{ComponentDescriptor, MethodDescriptor, ParamSpec, ParamType};
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        let registry = Arc::new(Registry::new());
        registry
            .register_component(
                ComponentDescriptor::new("Math")
                    .base_path("Math")
                    .method(
                        MethodDescriptor::new("add")
                            .param(ParamSpec::named("a", ParamType::Int))
                            .param(ParamSpec::named("b", ParamType::Int))
                            .handler(|args| Ok(json!(args.int(0)? + args.int(1)?))),
                    )
                    .method(
                        MethodDescriptor::new("scale")
                            .verb(Verb::Post)
                            .param(ParamSpec::named("x", ParamType::Double))
                            .param(ParamSpec::named("factor", ParamType::Double))
                            .handler(|args| Ok(json!(args.double(0)? * args.double(1)?))),
                    )
                    .method(MethodDescriptor::new("nothing").handler(|_| Ok(Value::Null)))
                    .method(
                        MethodDescriptor::new("fail")
                            .handler(|_| Err(anyhow::anyhow!("division by zero"))),
                    )
                    .method(MethodDescriptor::new("explode").handler(|_| panic!("kaboom"))),
            )
            .unwrap();
        Dispatcher::new(registry, Arc::new(HandleManager::new()))
    }

    fn envelope(response: &ResponseEnvelope) -> ErrorEnvelope {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn test_parse_query() {
        let query = parse_query("a=1&flag&b=x=y&a=2");
        assert_eq!(query.get("a").map(String::as_str), Some("2"));
        assert_eq!(query.get("b").map(String::as_str), Some("x=y"));
        assert!(!query.contains_key("flag"));
    }

    #[test]
    fn test_split_uri() {
        let (path, query) = split_uri("/Math/add?a=1");
        assert_eq!(path, "/Math/add");
        assert_eq!(query.len(), 1);

        let (path, query) = split_uri("/Math/add");
        assert_eq!(path, "/Math/add");
        assert!(query.is_empty());
    }

    #[test]
    fn test_registered_route_returns_200() {
        let response = dispatcher().handle("GET", "/Math/add?a=2&b=40", "", &Headers::new());
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "42");
    }

    #[test]
    fn test_body_arguments_for_post() {
        let response = dispatcher().handle(
            "POST",
            "/Math/scale?factor=3",
            r#"{"x": 1.5, "factor": 100}"#,
            &Headers::new(),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "4.5");
    }

    #[test]
    fn test_other_verb_returns_405() {
        let response = dispatcher().handle("POST", "/Math/add?a=1&b=1", "", &Headers::new());
        assert_eq!(response.status, 405);
        assert_eq!(envelope(&response).kind, "VerbNotSupported");
    }

    #[test]
    fn test_unregistered_path_returns_400() {
        let response = dispatcher().handle("GET", "/Math/missing", "", &Headers::new());
        assert_eq!(response.status, 400);
        let envelope = envelope(&response);
        assert_eq!(envelope.code, 400);
        assert_eq!(envelope.kind, "RouteNotFound");
        assert!(envelope.message.starts_with("Bad Request: "));
    }

    #[test]
    fn test_unrecognized_verb_returns_400() {
        let response = dispatcher().handle("BREW", "/Math/add", "", &Headers::new());
        assert_eq!(response.status, 400);
        assert_eq!(envelope(&response).kind, "UnrecognizedVerb");
    }

    #[test]
    fn test_decoding_failure_returns_400() {
        let response = dispatcher().handle("GET", "/Math/add?a=one&b=2", "", &Headers::new());
        assert_eq!(response.status, 400);
        assert_eq!(envelope(&response).kind, "ArgumentDecodingError");
    }

    #[test]
    fn test_null_arguments_fail_invocation_with_500() {
        let response = dispatcher().handle("GET", "/Math/add", "", &Headers::new());
        assert_eq!(response.status, 500);
        assert_eq!(envelope(&response).kind, "NullArgument");
    }

    #[test]
    fn test_target_errors_and_panics_return_500() {
        let d = dispatcher();

        let response = d.handle("GET", "/Math/fail", "", &Headers::new());
        assert_eq!(response.status, 500);
        let failed = envelope(&response);
        assert_eq!(failed.kind, "InvocationError");
        assert_eq!(failed.message, "Internal Server Error: division by zero");

        let response = d.handle("GET", "/Math/explode", "", &Headers::new());
        assert_eq!(response.status, 500);
        assert!(envelope(&response).message.contains("kaboom"));
    }

    #[test]
    fn test_null_result_encodes_empty_object() {
        let response = dispatcher().handle("get", "/Math/nothing", "", &Headers::new());
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{}");
    }

    #[test]
    fn test_handle_invoke_roundtrip() {
        let d = dispatcher();
        let handle = d.issue_handle("Math", "add").unwrap();
        let body = d.handle_invoke(&handle, r#"{"params": [20, 22]}"#).unwrap();
        assert_eq!(body, r#"{"result":42}"#);
    }

    #[test]
    fn test_handle_invoke_unknown_handle() {
        let err = dispatcher()
            .handle_invoke("Math-add-99", r#"{"params": []}"#)
            .unwrap_err();
        assert!(matches!(err, RpcError::HandleNotFound(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_handle_ref_reuses_latest_handle() {
        let d = dispatcher();
        let first = d.handle_ref("127.0.0.1", 8080, "Math", "add").unwrap();
        let second = d.handle_ref("127.0.0.1", 8080, "Math", "add").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.handle, "Math-add-1");
        assert!(d.handle_ref("127.0.0.1", 8080, "Math", "missing").is_err());
    }
}
