#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links
)]

//! Application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (environment loading and service wiring),
//! `error.rs` (bootstrap failures).

pub mod bootstrap;
pub mod error;

pub use bootstrap::{BootstrapDependencies, RunningApp, run_app};
pub use error::{AppError, AppResult};
