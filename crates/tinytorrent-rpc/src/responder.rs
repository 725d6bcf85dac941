//! Exactly-once response continuations and envelope rendering.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{RpcError, RpcResult};

/// Body sent when an envelope cannot be serialized.
const FALLBACK_ENVELOPE: &str = r#"{"result":"error","arguments":{"message":"internal error"}}"#;

type Callback = Box<dyn FnOnce(String) + Send>;

/// Render the Transmission-style `{result, arguments, tag?}` envelope.
#[must_use]
pub fn render_envelope(result: &RpcResult<Value>, tag: Option<&Value>) -> String {
    let mut envelope = Map::new();
    match result {
        Ok(arguments) => {
            envelope.insert("result".into(), Value::from("success"));
            let arguments = if arguments.is_null() {
                Value::Object(Map::new())
            } else {
                arguments.clone()
            };
            envelope.insert("arguments".into(), arguments);
        }
        Err(err) => {
            envelope.insert("result".into(), Value::from("error"));
            envelope.insert("arguments".into(), err.to_arguments());
        }
    }
    if let Some(tag) = tag {
        envelope.insert("tag".into(), tag.clone());
    }
    serde_json::to_string(&Value::Object(envelope))
        .unwrap_or_else(|_| FALLBACK_ENVELOPE.to_string())
}

struct Slot {
    method: String,
    tag: Option<Value>,
    callback: Mutex<Option<Callback>>,
}

impl Slot {
    fn take(&self) -> Option<Callback> {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn deliver(&self, result: &RpcResult<Value>) -> bool {
        match self.take() {
            Some(callback) => {
                callback(render_envelope(result, self.tag.as_ref()));
                true
            }
            None => {
                debug!(method = %self.method, "late rpc response dropped");
                false
            }
        }
    }

    fn pending(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Continuation handed to every method handler.
///
/// Consuming [`Responder::respond`] delivers the envelope once. A responder
/// dropped without answering sends an `internal error` envelope so the
/// caller is never left waiting.
pub struct Responder {
    slot: Arc<Slot>,
}

impl Responder {
    pub(crate) fn new(
        method: String,
        tag: Option<Value>,
        callback: impl FnOnce(String) + Send + 'static,
    ) -> (Self, ResponseGuard) {
        let slot = Arc::new(Slot {
            method,
            tag,
            callback: Mutex::new(Some(Box::new(callback))),
        });
        (
            Self {
                slot: Arc::clone(&slot),
            },
            ResponseGuard { slot },
        )
    }

    /// Method this responder answers.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.slot.method
    }

    /// Deliver the handler outcome.
    pub fn respond(self, result: RpcResult<Value>) {
        self.slot.deliver(&result);
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        // A panicking handler is answered by the boundary that caught it.
        if thread::panicking() || !self.slot.pending() {
            return;
        }
        warn!(method = %self.slot.method, "handler finished without responding");
        self.slot
            .deliver(&Err(RpcError::internal("handler dropped its responder")));
    }
}

/// Dispatcher-side handle used to answer when a handler panics.
pub(crate) struct ResponseGuard {
    slot: Arc<Slot>,
}

impl ResponseGuard {
    pub(crate) fn fail(&self, error: RpcError) {
        if self.slot.pending() {
            self.slot.deliver(&Err(error));
        }
    }
}
