#![recursion_limit = "256"]
#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]
#![allow(clippy::module_name_repetitions)]

//! Transmission-compatible method dispatch.
//!
//! # Design
//! - [`Dispatcher`] owns the method table and turns raw request bodies into
//!   `{result, arguments, tag}` envelopes.
//! - Handlers never write to the transport; they answer through a
//!   [`Responder`], which may outlive the call that received it.
//! - [`RpcContext`] carries the engine, event bus, preferences and shell seam
//!   shared by every handler.

pub mod args;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod responder;
pub mod shell;

pub use context::{RpcContext, ShutdownHook};
pub use dispatcher::{Dispatcher, Handler};
pub use error::{RpcError, RpcResult};
pub use handlers::{build_dispatcher, register_all};
pub use responder::{Responder, render_envelope};
pub use shell::{HeadlessShell, ShellIntegration, ShellOutcome};
