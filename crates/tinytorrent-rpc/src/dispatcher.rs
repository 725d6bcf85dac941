//! Method registry and request dispatch.
//!
//! # Design
//! - Handlers all share one shape: parsed arguments plus a [`Responder`].
//! - Synchronous, blocking and async handlers are adapted into that shape at
//!   registration, so callers never know which kind ran.
//! - A panic anywhere below `dispatch` becomes an `internal error` envelope.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{RpcError, RpcResult};
use crate::responder::{Responder, render_envelope};

/// Type-erased method handler.
pub type Handler = Arc<dyn Fn(Value, Responder) + Send + Sync>;

struct Request {
    method: String,
    arguments: Value,
    tag: Option<Value>,
}

fn parse_request(payload: &[u8]) -> RpcResult<Request> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(RpcError::new("empty RPC payload"));
    }
    let value: Value = serde_json::from_slice(payload)
        .map_err(|err| RpcError::new("invalid JSON").with_detail(err.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(RpcError::new("expected JSON object"));
    };
    let Some(Value::String(method)) = object.remove("method") else {
        return Err(RpcError::new("missing method"));
    };
    Ok(Request {
        method,
        arguments: object.remove("arguments").unwrap_or(Value::Null),
        tag: object.remove("tag"),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return message;
    }
    payload
        .downcast_ref::<String>()
        .map_or("handler panicked", String::as_str)
}

fn panic_error(method: &str, payload: &(dyn Any + Send)) -> RpcError {
    let message = panic_message(payload);
    warn!(method, panic = message, "rpc handler panicked");
    RpcError::internal(message)
}

/// Routes RPC payloads to registered method handlers.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<&'static str, Handler>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.handlers.keys().collect();
        methods.sort_unstable();
        f.debug_struct("Dispatcher").field("methods", &methods).finish()
    }
}

impl Dispatcher {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw handler, replacing any previous one for `method`.
    pub fn register(&mut self, method: &'static str, handler: Handler) {
        if self.handlers.insert(method, handler).is_some() {
            warn!(method, "rpc handler replaced");
        }
    }

    /// Register a handler that produces its result immediately.
    pub fn register_sync<F>(&mut self, method: &'static str, handler: F)
    where
        F: Fn(&Value) -> RpcResult<Value> + Send + Sync + 'static,
    {
        self.register(
            method,
            Arc::new(move |arguments, responder: Responder| {
                responder.respond(handler(&arguments));
            }),
        );
    }

    /// Register a handler that blocks (filesystem work) and runs on the
    /// blocking pool. Must be dispatched from within a tokio runtime.
    pub fn register_blocking<F>(&mut self, method: &'static str, handler: F)
    where
        F: Fn(Value) -> RpcResult<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            method,
            Arc::new(move |arguments, responder: Responder| {
                let handler = Arc::clone(&handler);
                drop(tokio::task::spawn_blocking(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(arguments)));
                    responder.respond(
                        outcome.unwrap_or_else(|panic| Err(panic_error(method, panic.as_ref()))),
                    );
                }));
            }),
        );
    }

    /// Register an async handler; its future runs as a tokio task.
    pub fn register_async<F, Fut>(&mut self, method: &'static str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Value>> + Send + 'static,
    {
        self.register(
            method,
            Arc::new(move |arguments, responder: Responder| {
                let future = handler(arguments);
                drop(tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(future).catch_unwind().await;
                    responder.respond(
                        outcome.unwrap_or_else(|panic| Err(panic_error(method, panic.as_ref()))),
                    );
                }));
            }),
        );
    }

    /// Whether `method` has a handler.
    #[must_use]
    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&'static str> {
        let mut methods: Vec<_> = self.handlers.keys().copied().collect();
        methods.sort_unstable();
        methods
    }

    /// Parse `payload` and hand it to the matching handler.
    ///
    /// `respond` is called exactly once, synchronously for protocol errors and
    /// sync handlers, later for blocking and async handlers.
    pub fn dispatch(&self, payload: &[u8], respond: impl FnOnce(String) + Send + 'static) {
        let request = match parse_request(payload) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "rejected rpc payload");
                respond(render_envelope(&Err(err), None));
                return;
            }
        };
        let Some(handler) = self.handlers.get(request.method.as_str()) else {
            debug!(method = %request.method, "unsupported rpc method");
            respond(render_envelope(
                &Err(RpcError::new("unsupported method")),
                request.tag.as_ref(),
            ));
            return;
        };

        debug!(method = %request.method, "dispatching rpc");
        let Request {
            method,
            arguments,
            tag,
        } = request;
        let (responder, guard) = Responder::new(method.clone(), tag, respond);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(arguments, responder)));
        if let Err(panic) = outcome {
            guard.fail(panic_error(&method, panic.as_ref()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn call(dispatcher: &Dispatcher, payload: &[u8]) -> Value {
        let (tx, rx) = mpsc::channel();
        dispatcher.dispatch(payload, move |body| tx.send(body).expect("send"));
        let body = rx.recv_timeout(Duration::from_secs(5)).expect("response");
        serde_json::from_str(&body).expect("json")
    }

    async fn call_async(dispatcher: &Dispatcher, payload: &[u8]) -> Value {
        let (tx, rx) = oneshot::channel();
        dispatcher.dispatch(payload, move |body| {
            let _ = tx.send(body);
        });
        let body = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("timely")
            .expect("response");
        serde_json::from_str(&body).expect("json")
    }

    fn sample() -> Dispatcher {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_sync("echo", |arguments| Ok(arguments.clone()));
        dispatcher.register_sync("boom", |_| panic!("kaboom"));
        dispatcher.register_sync("fail", |_| Err(RpcError::new("ids required")));
        dispatcher
    }

    #[test]
    fn malformed_payloads_yield_errors() {
        let dispatcher = sample();
        for (payload, message) in [
            (&b""[..], "empty RPC payload"),
            (b"   ", "empty RPC payload"),
            (b"{not json", "invalid JSON"),
            (b"[1,2]", "expected JSON object"),
            (b"42", "expected JSON object"),
            (b"{}", "missing method"),
            (br#"{"method": 5}"#, "missing method"),
            (br#"{"method": "nope"}"#, "unsupported method"),
        ] {
            let response = call(&dispatcher, payload);
            assert_eq!(response["result"], "error", "payload {payload:?}");
            assert_eq!(response["arguments"]["message"], message);
        }
    }

    #[test]
    fn sync_handlers_echo_tag() {
        let dispatcher = sample();
        let response = call(
            &dispatcher,
            br#"{"method":"echo","arguments":{"x":1},"tag":42}"#,
        );
        assert_eq!(response, json!({"result":"success","arguments":{"x":1},"tag":42}));

        let response = call(&dispatcher, br#"{"method":"fail","tag":"t"}"#);
        assert_eq!(response["arguments"]["message"], "ids required");
        assert_eq!(response["tag"], "t");
    }

    #[test]
    fn panics_become_internal_errors() {
        let dispatcher = sample();
        let response = call(&dispatcher, br#"{"method":"boom"}"#);
        assert_eq!(response["result"], "error");
        assert_eq!(response["arguments"]["message"], "internal error");
        if cfg!(debug_assertions) {
            assert_eq!(response["arguments"]["detail"], "kaboom");
        } else {
            assert!(response["arguments"].get("detail").is_none());
        }
    }

    #[tokio::test]
    async fn async_and_blocking_handlers_resolve_later() {
        let mut dispatcher = sample();
        dispatcher.register_async("later", |arguments| async move {
            tokio::task::yield_now().await;
            Ok(json!({"seen": arguments["n"]}))
        });
        dispatcher.register_blocking("disk", |_| Ok(json!({"bytes": 3})));
        dispatcher.register_blocking("disk-boom", |_| panic!("disk exploded"));

        let response = call_async(&dispatcher, br#"{"method":"later","arguments":{"n":2}}"#).await;
        assert_eq!(response["arguments"]["seen"], 2);
        let response = call_async(&dispatcher, br#"{"method":"disk"}"#).await;
        assert_eq!(response["arguments"]["bytes"], 3);
        let response = call_async(&dispatcher, br#"{"method":"disk-boom"}"#).await;
        assert_eq!(response["arguments"]["message"], "internal error");
    }

    #[test]
    fn registry_lists_methods() {
        let dispatcher = sample();
        assert_eq!(dispatcher.methods(), vec!["boom", "echo", "fail"]);
        assert!(dispatcher.contains("echo"));
        assert!(format!("{dispatcher:?}").contains("echo"));
    }
}
