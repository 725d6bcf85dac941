#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]

//! Logging setup and HTTP tracing layers shared by the workspace.

pub mod context;
pub mod init;
pub mod layers;

pub use context::{GlobalContextGuard, record_listen_port};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use layers::{
    HEADER_REQUEST_ID, HttpTraceLayer, http_trace_layer, propagate_request_id_layer,
    set_request_id_layer,
};
