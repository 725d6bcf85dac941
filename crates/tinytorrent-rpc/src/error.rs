//! Structured RPC failures.
//!
//! # Design
//! - The message is the stable string clients match on; `detail` and `code`
//!   are optional refinements.
//! - Extra fields let a failing handler still describe what it attempted.
//! - Internal failures carry their detail only in debug builds.

use std::borrow::Cow;
use std::fmt::Display;

use serde_json::{Map, Value};
use thiserror::Error;
use tinytorrent_engine::EngineError;
use tinytorrent_fsops::FsError;

/// Message returned for panics and unexpected engine failures.
pub const INTERNAL_ERROR: &str = "internal error";

/// Result alias used by every method handler.
pub type RpcResult<T> = Result<T, RpcError>;

/// Error reported inside a `{"result":"error"}` envelope.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RpcError {
    message: Cow<'static, str>,
    detail: Option<String>,
    code: Option<i32>,
    fields: Map<String, Value>,
}

impl RpcError {
    /// Error carrying only a message.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            code: None,
            fields: Map::new(),
        }
    }

    /// Generic internal failure; `detail` is kept in debug builds only.
    pub fn internal(detail: impl Display) -> Self {
        let error = Self::new(INTERNAL_ERROR);
        if cfg!(debug_assertions) {
            error.with_detail(detail.to_string())
        } else {
            error
        }
    }

    /// Attach a human-readable detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a numeric error code.
    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach an extra argument returned alongside the message.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Stable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional detail.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Optional numeric code.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// Render the `arguments` object of the error envelope.
    #[must_use]
    pub fn to_arguments(&self) -> Value {
        let mut arguments = self.fields.clone();
        arguments.insert("message".into(), Value::from(self.message.as_ref()));
        if let Some(detail) = &self.detail {
            arguments.insert("detail".into(), Value::from(detail.as_str()));
        }
        if let Some(code) = self.code {
            arguments.insert("code".into(), Value::from(code));
        }
        Value::Object(arguments)
    }
}

impl From<FsError> for RpcError {
    fn from(err: FsError) -> Self {
        let mut error = Self::new(err.to_string());
        if let Some(detail) = err.detail() {
            error = error.with_detail(detail);
        }
        match err.code() {
            Some(code) => error.with_code(code),
            None => error,
        }
    }
}

impl From<EngineError> for RpcError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Stopped => Self::new("engine unavailable"),
            EngineError::NotFound { torrent_id } => {
                Self::new("torrent not found").with_field("id", torrent_id)
            }
            EngineError::Unsupported { operation } => {
                Self::new("unsupported operation").with_detail(operation)
            }
            other @ EngineError::OperationFailed { .. } => {
                tracing::warn!(error = %other, operation = ?other.operation(), "engine call failed");
                Self::internal(describe(&other))
            }
        }
    }
}

fn describe(err: &EngineError) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}
